//! condnum core - shared types for the numeric condition store
//!
//! This crate provides the building blocks used by every other crate in the workspace:
//! - Condition model (`Condition`, `ConditionId`, `Op`)
//! - Create-lock state and its TTL predicate
//! - The matching rules that turn a probe value into range clauses
//! - The error taxonomy surfaced by storage and services

pub mod condition;
pub mod error;
pub mod matching;
pub mod operator;

// Re-export commonly used types
pub use condition::{check_threshold, Condition, ConditionId, CreateLock};
pub use error::{ConditionError, ConditionResult};
pub use matching::{Comparison, MatchClause, Probe};
pub use operator::Op;
