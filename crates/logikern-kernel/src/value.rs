//! Type-erased storage for parameter, setting and field values.
//!
//! Values are stored as [`AnyValue`] keyed by variable name.  Reads always go
//! through a typed handle ([`Parameter`][crate::variable::Parameter],
//! [`Setting`][crate::variable::Setting], [`Field`][crate::variable::Field]),
//! which downcasts to its own `T`, so callers never cast by hand.

use std::any::{Any, type_name};
use std::fmt;

/// Bound shared by every value a kernel variable can hold.
pub trait VariableValue: Any + Clone + fmt::Debug + PartialEq + Send + Sync {}

impl<T> VariableValue for T where T: Any + Clone + fmt::Debug + PartialEq + Send + Sync {}

/// Values that can carry a [`Constraint`][crate::constraint::Constraint]
/// (parameters and settings).
pub trait ConfigValue: VariableValue + PartialOrd {}

impl<T> ConfigValue for T where T: VariableValue + PartialOrd {}

trait ErasedValue: Any + Send + Sync {
    fn clone_box(&self) -> Box<dyn ErasedValue>;
    fn eq_erased(&self, other: &dyn ErasedValue) -> bool;
    fn fmt_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: VariableValue> ErasedValue for T {
    fn clone_box(&self) -> Box<dyn ErasedValue> {
        Box::new(self.clone())
    }

    fn eq_erased(&self, other: &dyn ErasedValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn fmt_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A boxed, clonable, comparable value of any [`VariableValue`] type.
///
/// # Example
///
/// ```
/// use logikern_kernel::value::AnyValue;
///
/// let v = AnyValue::new(4_i64);
/// assert!(v.is::<i64>());
/// assert_eq!(v.downcast_ref::<i64>(), Some(&4));
/// assert_eq!(v.downcast_ref::<bool>(), None);
/// ```
pub struct AnyValue(Box<dyn ErasedValue>);

impl AnyValue {
    pub fn new<T: VariableValue>(value: T) -> Self {
        AnyValue(Box::new(value))
    }

    /// `true` when the boxed value is exactly a `T`.
    pub fn is<T: VariableValue>(&self) -> bool {
        self.0.as_any().is::<T>()
    }

    pub fn downcast_ref<T: VariableValue>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: VariableValue>(&mut self) -> Option<&mut T> {
        self.0.as_any_mut().downcast_mut::<T>()
    }

    /// Rust type name of the boxed value, used in error messages.
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }
}

impl Clone for AnyValue {
    fn clone(&self) -> Self {
        AnyValue(self.0.clone_box())
    }
}

impl PartialEq for AnyValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_erased(other.0.as_ref())
    }
}

impl fmt::Debug for AnyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_erased(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_matches_only_exact_type() {
        let v = AnyValue::new(7_i64);
        assert_eq!(v.downcast_ref::<i64>(), Some(&7));
        assert!(v.downcast_ref::<i32>().is_none());
        assert!(!v.is::<u64>());
    }

    #[test]
    fn clone_is_deep() {
        let mut a = AnyValue::new(vec![1_u8, 2, 3]);
        let b = a.clone();
        a.downcast_mut::<Vec<u8>>().unwrap().push(4);
        assert_eq!(b.downcast_ref::<Vec<u8>>().unwrap().len(), 3);
        assert_eq!(a.downcast_ref::<Vec<u8>>().unwrap().len(), 4);
    }

    #[test]
    fn equality_requires_same_type_and_value() {
        assert_eq!(AnyValue::new(1_i64), AnyValue::new(1_i64));
        assert_ne!(AnyValue::new(1_i64), AnyValue::new(2_i64));
        assert_ne!(AnyValue::new(1_i64), AnyValue::new(1_i32));
    }

    #[test]
    fn debug_shows_inner_value() {
        let v = AnyValue::new(String::from("rom"));
        assert_eq!(format!("{v:?}"), "\"rom\"");
        assert!(v.type_name().contains("String"));
    }
}
