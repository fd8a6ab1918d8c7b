//! condnum HTTP server library
//!
//! Exposes configuration, bootstrap and the REST router for the binary and
//! for tests.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
