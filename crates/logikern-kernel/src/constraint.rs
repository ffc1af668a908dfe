//! [`Constraint`] – the closed algebra of value restrictions attached to
//! parameters and settings.
//!
//! Evaluation through [`Constraint::test`] is pure and total: it never
//! panics and never reports an error itself.  The caller turns a failed test
//! into a [`KernelError::ConstraintViolation`][logikern_types::KernelError].
//!
//! # Example
//!
//! ```
//! use logikern_kernel::constraint::Constraint;
//!
//! let c = Constraint::all([Constraint::Min(2_i64), Constraint::Max(64)]);
//! assert!(c.test(&2));
//! assert!(!c.test(&1));
//! assert!(!c.test(&65));
//! ```

use std::fmt;
use std::sync::Arc;

/// A named boolean test over `T`.
pub struct Predicate<T> {
    label: Arc<str>,
    test: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> Predicate<T> {
    pub fn new(label: impl Into<String>, test: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            label: Arc::from(label.into()),
            test: Arc::new(test),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn test(&self, value: &T) -> bool {
        (self.test)(value)
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self {
            label: Arc::clone(&self.label),
            test: Arc::clone(&self.test),
        }
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.label).finish()
    }
}

/// Restriction on the values a variable may take.
///
/// Bounds are inclusive.  Build conjunctions and disjunctions with
/// [`Constraint::all`] and [`Constraint::any`], which collapse trivial cases.
#[derive(Clone, Debug)]
pub enum Constraint<T> {
    /// Accepts every value.
    Always,
    /// Rejects every value.
    Never,
    Predicate(Predicate<T>),
    /// Accepts only the listed values.
    Selection(Vec<T>),
    Range { min: T, max: T },
    Min(T),
    Max(T),
    /// Conjunction.
    All(Vec<Constraint<T>>),
    /// Disjunction.
    Any(Vec<Constraint<T>>),
}

impl<T> Default for Constraint<T> {
    fn default() -> Self {
        Constraint::Always
    }
}

impl<T> Constraint<T> {
    pub fn range(min: T, max: T) -> Self {
        Constraint::Range { min, max }
    }

    pub fn selection(values: impl IntoIterator<Item = T>) -> Self {
        Constraint::Selection(values.into_iter().collect())
    }

    pub fn predicate(
        label: impl Into<String>,
        test: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Constraint::Predicate(Predicate::new(label, test))
    }

    /// Conjunction of `constraints`: no members yields [`Constraint::Always`],
    /// a single member yields that member.
    pub fn all(constraints: impl IntoIterator<Item = Constraint<T>>) -> Self {
        let mut members: Vec<_> = constraints.into_iter().collect();
        match members.len() {
            0 => Constraint::Always,
            1 => members.remove(0),
            _ => Constraint::All(members),
        }
    }

    /// Disjunction of `constraints`: no members yields [`Constraint::Never`],
    /// a single member yields that member.
    pub fn any(constraints: impl IntoIterator<Item = Constraint<T>>) -> Self {
        let mut members: Vec<_> = constraints.into_iter().collect();
        match members.len() {
            0 => Constraint::Never,
            1 => members.remove(0),
            _ => Constraint::Any(members),
        }
    }

    /// `self` and `other` must both hold.
    pub fn and(self, other: Constraint<T>) -> Self {
        match (self, other) {
            (Constraint::Always, c) | (c, Constraint::Always) => c,
            (Constraint::All(mut lhs), Constraint::All(rhs)) => {
                lhs.extend(rhs);
                Constraint::All(lhs)
            }
            (Constraint::All(mut lhs), c) => {
                lhs.push(c);
                Constraint::All(lhs)
            }
            (lhs, rhs) => Constraint::All(vec![lhs, rhs]),
        }
    }

    /// Either `self` or `other` must hold.
    pub fn or(self, other: Constraint<T>) -> Self {
        match (self, other) {
            (Constraint::Never, c) | (c, Constraint::Never) => c,
            (Constraint::Any(mut lhs), Constraint::Any(rhs)) => {
                lhs.extend(rhs);
                Constraint::Any(lhs)
            }
            (Constraint::Any(mut lhs), c) => {
                lhs.push(c);
                Constraint::Any(lhs)
            }
            (lhs, rhs) => Constraint::Any(vec![lhs, rhs]),
        }
    }
}

impl<T: PartialOrd> Constraint<T> {
    /// Return `true` when `value` satisfies this constraint.
    pub fn test(&self, value: &T) -> bool {
        match self {
            Constraint::Always => true,
            Constraint::Never => false,
            Constraint::Predicate(p) => p.test(value),
            Constraint::Selection(values) => values.iter().any(|v| v == value),
            Constraint::Range { min, max } => min <= value && value <= max,
            Constraint::Min(min) => min <= value,
            Constraint::Max(max) => value <= max,
            Constraint::All(members) => members.iter().all(|c| c.test(value)),
            Constraint::Any(members) => members.iter().any(|c| c.test(value)),
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Constraint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Debug>(
            f: &mut fmt::Formatter<'_>,
            members: &[Constraint<T>],
            sep: &str,
        ) -> fmt::Result {
            f.write_str("(")?;
            for (i, c) in members.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{c}")?;
            }
            f.write_str(")")
        }

        match self {
            Constraint::Always => f.write_str("always"),
            Constraint::Never => f.write_str("never"),
            Constraint::Predicate(p) => f.write_str(p.label()),
            Constraint::Selection(values) => write!(f, "one of {values:?}"),
            Constraint::Range { min, max } => write!(f, "in [{min:?}, {max:?}]"),
            Constraint::Min(min) => write!(f, ">= {min:?}"),
            Constraint::Max(max) => write!(f, "<= {max:?}"),
            Constraint::All(members) => join(f, members, " and "),
            Constraint::Any(members) => join(f, members, " or "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_matches_inclusive_bounds() {
        let c = Constraint::range(-3_i64, 5);
        for v in -10..=10 {
            assert_eq!(c.test(&v), (-3..=5).contains(&v), "value {v}");
        }
    }

    #[test]
    fn inverted_range_rejects_everything() {
        let c = Constraint::range(5_i64, 1);
        assert!((-10..=10).all(|v| !c.test(&v)));
    }

    #[test]
    fn min_and_max_are_inclusive() {
        assert!(Constraint::Min(2_i64).test(&2));
        assert!(!Constraint::Min(2_i64).test(&1));
        assert!(Constraint::Max(8_u32).test(&8));
        assert!(!Constraint::Max(8_u32).test(&9));
    }

    #[test]
    fn selection_accepts_listed_values_only() {
        let c = Constraint::selection(["rom".to_string(), "ram".to_string()]);
        assert!(c.test(&"ram".to_string()));
        assert!(!c.test(&"flash".to_string()));
    }

    #[test]
    fn predicate_runs_closure() {
        let even = Constraint::predicate("even", |v: &i64| v % 2 == 0);
        assert!(even.test(&4));
        assert!(!even.test(&3));
        assert_eq!(even.to_string(), "even");
    }

    #[test]
    fn all_and_any_flatten_trivial_cases() {
        assert!(matches!(Constraint::<i64>::all([]), Constraint::Always));
        assert!(matches!(Constraint::<i64>::any([]), Constraint::Never));
        assert!(matches!(
            Constraint::all([Constraint::Min(1_i64)]),
            Constraint::Min(1)
        ));
        assert!(matches!(
            Constraint::any([Constraint::Max(1_i64)]),
            Constraint::Max(1)
        ));
        assert!(matches!(
            Constraint::all([Constraint::Min(1_i64), Constraint::Max(3)]),
            Constraint::All(ref m) if m.len() == 2
        ));
    }

    #[test]
    fn conjunction_and_disjunction_semantics() {
        let both = Constraint::all([Constraint::Min(0_i64), Constraint::Max(10)]);
        assert!(both.test(&5));
        assert!(!both.test(&11));

        let either = Constraint::any([Constraint::Max(0_i64), Constraint::Min(10)]);
        assert!(either.test(&-1));
        assert!(either.test(&12));
        assert!(!either.test(&5));
    }

    #[test]
    fn and_absorbs_always_and_extends_conjunctions() {
        let c = Constraint::Always.and(Constraint::Min(1_i64));
        assert!(matches!(c, Constraint::Min(1)));

        let c = Constraint::Min(1_i64)
            .and(Constraint::Max(4))
            .and(Constraint::predicate("odd", |v: &i64| v % 2 == 1));
        assert!(matches!(c, Constraint::All(ref m) if m.len() == 3));
        assert!(c.test(&3));
        assert!(!c.test(&2));
    }

    #[test]
    fn or_absorbs_never() {
        let c = Constraint::Never.or(Constraint::Max(1_i64));
        assert!(matches!(c, Constraint::Max(1)));
    }

    #[test]
    fn always_and_never() {
        assert!(Constraint::<bool>::Always.test(&false));
        assert!(!Constraint::<bool>::Never.test(&true));
    }

    #[test]
    fn display_renders_nested_constraints() {
        let c = Constraint::all([Constraint::Min(2_i64), Constraint::Max(8)]);
        assert_eq!(c.to_string(), "(>= 2 and <= 8)");
        assert_eq!(Constraint::range(1_i64, 4).to_string(), "in [1, 4]");
    }
}
