//! Comparison operators a condition can carry

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a numeric condition
///
/// The operator names the relation between the observed value and the
/// condition's threshold: `Gt` matches when the observed value is greater than
/// the threshold, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Op {
    /// Observed value > threshold
    Gt,
    /// Observed value >= threshold
    Gte,
    /// Observed value == threshold
    Eq,
    /// Observed value <= threshold
    Lte,
    /// Observed value < threshold
    Lt,
}

impl Op {
    /// All operators in wire-code order
    pub const ALL: [Op; 5] = [Op::Gt, Op::Gte, Op::Eq, Op::Lte, Op::Lt];

    /// Stable numeric code used by relational columns
    pub fn code(self) -> i16 {
        match self {
            Op::Gt => 1,
            Op::Gte => 2,
            Op::Eq => 3,
            Op::Lte => 4,
            Op::Lt => 5,
        }
    }

    /// Inverse of [`Op::code`]; code 0 ("undefined") and anything else out of range yield `None`
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Op::Gt),
            2 => Some(Op::Gte),
            3 => Some(Op::Eq),
            4 => Some(Op::Lte),
            5 => Some(Op::Lt),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Op::Gt => "Gt",
            Op::Gte => "Gte",
            Op::Eq => "Eq",
            Op::Lte => "Lte",
            Op::Lt => "Lt",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Op {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Op::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown operator: {}", s))
    }
}
