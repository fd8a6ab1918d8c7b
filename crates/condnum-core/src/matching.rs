//! Matching rules between a probe and stored conditions
//!
//! A probe `(key, value)` matches a stored condition `(k, op, v)` when the
//! condition's key is empty or equal to the probe key, and the condition's
//! threshold `v` satisfies the operator's relation against the probe value.
//! Because the operator describes the *observed* value, the comparison applied
//! to the stored threshold is the mirror image of the operator name:
//!
//! | op    | stored threshold must be |
//! |-------|--------------------------|
//! | `Gt`  | `v <  value`             |
//! | `Gte` | `v <= value`             |
//! | `Eq`  | `v == value`             |
//! | `Lte` | `v >= value`             |
//! | `Lt`  | `v >  value`             |
//!
//! Backends never hard-code this table. They obtain the clauses from
//! [`Probe::clauses`] and either evaluate them in place or render them into
//! their query language.

use crate::condition::Condition;
use crate::operator::Op;

/// Relation the stored threshold must have to the probe value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Less,
    LessOrEqual,
    Equal,
    GreaterOrEqual,
    Greater,
}

impl Comparison {
    /// Evaluate `stored <cmp> probe` with exact IEEE-754 semantics
    pub fn holds(self, stored: f64, probe: f64) -> bool {
        match self {
            Comparison::Less => stored < probe,
            Comparison::LessOrEqual => stored <= probe,
            Comparison::Equal => stored == probe,
            Comparison::GreaterOrEqual => stored >= probe,
            Comparison::Greater => stored > probe,
        }
    }

    /// SQL operator token for this comparison
    pub fn sql(self) -> &'static str {
        match self {
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Equal => "=",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Greater => ">",
        }
    }
}

/// One disjunct of the search predicate: `op == self.op AND value <cmp> probe`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchClause {
    pub op: Op,
    pub comparison: Comparison,
}

impl MatchClause {
    /// Clause for a single operator
    pub fn for_op(op: Op) -> Self {
        let comparison = match op {
            Op::Gt => Comparison::Less,
            Op::Gte => Comparison::LessOrEqual,
            Op::Eq => Comparison::Equal,
            Op::Lte => Comparison::GreaterOrEqual,
            Op::Lt => Comparison::Greater,
        };
        Self { op, comparison }
    }
}

/// An incoming `(key, value)` pair evaluated against stored conditions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe<'a> {
    pub key: &'a str,
    pub value: f64,
}

impl<'a> Probe<'a> {
    pub fn new(key: &'a str, value: f64) -> Self {
        Self { key, value }
    }

    /// Whether any stored condition could match this probe
    ///
    /// A NaN value compares false against every threshold. Stores that order
    /// NaN above all numbers must not be asked, so every backend checks this
    /// before querying.
    pub fn is_satisfiable(&self) -> bool {
        !self.value.is_nan()
    }

    /// The disjunction of operator clauses, one per operator, in code order
    pub fn clauses(&self) -> [MatchClause; 5] {
        Op::ALL.map(MatchClause::for_op)
    }

    /// Whether a stored key is selected by this probe
    pub fn key_matches(&self, stored_key: &str) -> bool {
        stored_key.is_empty() || stored_key == self.key
    }

    /// Whether a stored `(op, value)` pair is selected by this probe's value
    pub fn value_matches(&self, op: Op, stored_value: f64) -> bool {
        MatchClause::for_op(op)
            .comparison
            .holds(stored_value, self.value)
    }

    pub fn matches(&self, condition: &Condition) -> bool {
        self.key_matches(&condition.key) && self.value_matches(condition.op, condition.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionId;

    fn cond(key: &str, op: Op, value: f64) -> Condition {
        Condition::new(ConditionId::new(1), key, op, value)
    }

    #[test]
    fn test_clause_direction_is_mirrored() {
        assert_eq!(MatchClause::for_op(Op::Gt).comparison, Comparison::Less);
        assert_eq!(MatchClause::for_op(Op::Gte).comparison, Comparison::LessOrEqual);
        assert_eq!(MatchClause::for_op(Op::Eq).comparison, Comparison::Equal);
        assert_eq!(MatchClause::for_op(Op::Lte).comparison, Comparison::GreaterOrEqual);
        assert_eq!(MatchClause::for_op(Op::Lt).comparison, Comparison::Greater);
    }

    #[test]
    fn test_gt_threshold_matches_larger_probe() {
        let c = cond("temp", Op::Gt, 10.0);
        assert!(Probe::new("temp", 10.5).matches(&c));
        assert!(!Probe::new("temp", 10.0).matches(&c));
        assert!(!Probe::new("temp", 9.0).matches(&c));
    }

    #[test]
    fn test_boundaries() {
        assert!(Probe::new("k", 5.0).matches(&cond("k", Op::Gte, 5.0)));
        assert!(Probe::new("k", 5.0).matches(&cond("k", Op::Lte, 5.0)));
        assert!(!Probe::new("k", 5.0).matches(&cond("k", Op::Lt, 5.0)));
        assert!(Probe::new("k", 4.999).matches(&cond("k", Op::Lt, 5.0)));
    }

    #[test]
    fn test_equality_is_exact() {
        let c = cond("k", Op::Eq, 0.3);
        assert!(Probe::new("k", 0.3).matches(&c));
        assert!(!Probe::new("k", 0.1 + 0.2).matches(&c));
    }

    #[test]
    fn test_salary_example() {
        let c0 = cond("salary", Op::Gt, 2.7182818);
        let c1 = cond("salary", Op::Gte, 3.1415926);
        let c2 = cond("salary", Op::Eq, 3.0);
        let all = [&c0, &c1, &c2];

        let hits = |v: f64| -> Vec<usize> {
            all.iter()
                .enumerate()
                .filter(|(_, c)| Probe::new("salary", v).matches(c))
                .map(|(i, _)| i)
                .collect()
        };

        assert_eq!(hits(3.0), vec![0, 2]);
        assert_eq!(hits(2.0), Vec::<usize>::new());
        assert_eq!(hits(2.8), vec![0]);
        assert_eq!(hits(3.1415926), vec![0, 1]);
    }

    #[test]
    fn test_wildcard_key() {
        let c = cond("", Op::Lt, 100.0);
        assert!(Probe::new("price", 1.0).matches(&c));
        assert!(Probe::new("anything", 1.0).matches(&c));
        assert!(!Probe::new("price", 1.0).matches(&cond("weight", Op::Lt, 100.0)));
    }

    #[test]
    fn test_nan_never_matches() {
        assert!(!Probe::new("k", f64::NAN).matches(&cond("k", Op::Gte, 1.0)));
        assert!(!Probe::new("k", 1.0).matches(&cond("k", Op::Eq, f64::NAN)));
    }

    #[test]
    fn test_nan_value_is_unsatisfiable() {
        assert!(!Probe::new("k", f64::NAN).is_satisfiable());
        assert!(Probe::new("k", f64::INFINITY).is_satisfiable());
        assert!(Probe::new("k", -0.0).is_satisfiable());
    }

    #[test]
    fn test_clauses_cover_every_operator_once() {
        let clauses = Probe::new("k", 1.0).clauses();
        let ops: Vec<Op> = clauses.iter().map(|c| c.op).collect();
        assert_eq!(ops, Op::ALL.to_vec());
    }
}
