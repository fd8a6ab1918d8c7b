//! Condition records, identifiers and create-lock state

use crate::error::{ConditionError, ConditionResult};
use crate::operator::Op;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Width of the hexadecimal id rendering
const ID_WIDTH: usize = 16;

/// Backend-assigned condition identifier
///
/// Internally a 64-bit sequence number. It is rendered as a fixed-width,
/// lowercase hexadecimal string so that lexicographic order of the rendered
/// form equals the numeric order used for pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConditionId(u64);

impl ConditionId {
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    pub const fn seq(self) -> u64 {
        self.0
    }

    /// Signed form used by backends with BIGINT / int64 keys
    ///
    /// `None` when the id lies above `i64::MAX`; no backend ever assigns such
    /// an id, so callers treat it as a reference to nothing.
    pub fn as_i64(self) -> Option<i64> {
        i64::try_from(self.0).ok()
    }

    pub fn from_i64(seq: i64) -> Option<Self> {
        u64::try_from(seq).ok().map(Self)
    }
}

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$x}", self.0, width = ID_WIDTH)
    }
}

impl FromStr for ConditionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let well_formed = s.len() == ID_WIDTH
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(format!("malformed condition id: {:?}", s));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| format!("malformed condition id {:?}: {}", s, e))
    }
}

impl Serialize for ConditionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConditionId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A stored numeric condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: ConditionId,
    /// Attribute name; empty matches any attribute
    pub key: String,
    pub op: Op,
    pub value: f64,
}

impl Condition {
    pub fn new(id: ConditionId, key: impl Into<String>, op: Op, value: f64) -> Self {
        Self {
            id,
            key: key.into(),
            op,
            value,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.key.is_empty()
    }
}

/// Reject thresholds that no ordering can compare
///
/// Every backend calls this before storing a condition, so a NaN threshold
/// fails the same way everywhere instead of depending on how the underlying
/// store orders NaN.
pub fn check_threshold(value: f64) -> ConditionResult<()> {
    if value.is_nan() {
        return Err(ConditionError::internal("condition value must not be NaN"));
    }
    Ok(())
}

/// Advisory create-lock fields attached to a condition
///
/// `count` is a reference count; `time` is the most recent acquisition.
/// A lock only blocks reuse while `count > 0` and `time` is within the TTL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateLock {
    pub time: Option<DateTime<Utc>>,
    pub count: u32,
}

impl CreateLock {
    /// Acquire: bump the count and refresh the acquisition time
    pub fn acquire(&mut self, now: DateTime<Utc>) {
        self.count = self.count.saturating_add(1);
        self.time = Some(now);
    }

    /// Release one reference; releasing an unlocked condition is a no-op
    pub fn release(&mut self) {
        self.count = self.count.saturating_sub(1);
    }

    /// Whether the lock currently blocks a create from reusing the condition
    pub fn is_active(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.time {
            Some(time) if self.count > 0 => time >= expiry_cutoff(now, ttl),
            _ => false,
        }
    }
}

/// Oldest lock time still considered active at `now`
pub fn expiry_cutoff(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(ttl).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
