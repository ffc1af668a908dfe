use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Four-valued logic level carried by every input and output channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Nothing drives the channel.
    #[default]
    Unset,
    False,
    True,
    /// Two drivers disagree.
    Conflict,
}

impl Signal {
    /// Map a boolean onto [`Signal::True`] / [`Signal::False`].
    pub fn from_bool(value: bool) -> Self {
        if value { Signal::True } else { Signal::False }
    }

    /// Return the boolean level, or `None` for [`Signal::Unset`] and
    /// [`Signal::Conflict`].
    pub fn to_bool(self) -> Option<bool> {
        match self {
            Signal::True => Some(true),
            Signal::False => Some(false),
            Signal::Unset | Signal::Conflict => None,
        }
    }

    /// `true` for every value except [`Signal::Unset`].
    pub fn is_set(self) -> bool {
        self != Signal::Unset
    }

    pub fn is_conflict(self) -> bool {
        self == Signal::Conflict
    }

    /// Combine two drivers of the same channel.
    ///
    /// An unset side yields the other side; equal levels are kept; anything
    /// else (differing levels or an existing conflict) is a conflict.
    pub fn merge(self, other: Signal) -> Signal {
        match (self, other) {
            (Signal::Unset, b) => b,
            (a, Signal::Unset) => a,
            (Signal::Conflict, _) | (_, Signal::Conflict) => Signal::Conflict,
            (a, b) if a == b => a,
            _ => Signal::Conflict,
        }
    }

    /// Character used by [`fmt::Display`]: `-`, `0`, `1` or `X`.
    pub fn as_char(self) -> char {
        match self {
            Signal::Unset => '-',
            Signal::False => '0',
            Signal::True => '1',
            Signal::Conflict => 'X',
        }
    }

    /// Inverse of [`Signal::as_char`].
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '-' => Some(Signal::Unset),
            '0' => Some(Signal::False),
            '1' => Some(Signal::True),
            'X' | 'x' => Some(Signal::Conflict),
            _ => None,
        }
    }
}

impl std::ops::Not for Signal {
    type Output = Signal;

    /// Inverts a driven level; unset and conflict pass through.
    fn not(self) -> Signal {
        match self {
            Signal::True => Signal::False,
            Signal::False => Signal::True,
            other => other,
        }
    }
}

impl From<bool> for Signal {
    fn from(value: bool) -> Self {
        Signal::from_bool(value)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Namespaced identifier used for kernel ids, tags and property keys
/// (e.g. `"logic:and"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Portion before the first `:`, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.0.split_once(':').map(|(ns, _)| ns)
    }

    /// Portion after the first `:`, or the whole id when un-namespaced.
    pub fn local_name(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(_, name)| name)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The closed set of variable kinds a kernel can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VariableKind {
    /// Configuration-time, fixed for a variant.
    Parameter,
    /// Instance-time, fixed for an instance.
    Setting,
    /// Hidden state carried between ticks.
    Field,
    Input,
    Output,
    /// Resolved channel count of a vector input or output.
    VectorSize,
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VariableKind::Parameter => "parameter",
            VariableKind::Setting => "setting",
            VariableKind::Field => "field",
            VariableKind::Input => "input",
            VariableKind::Output => "output",
            VariableKind::VectorSize => "vector size",
        };
        f.write_str(label)
    }
}

/// Every recoverable failure of the kernel pipeline.
///
/// Each variant names the variable it concerns so callers can point a user
/// at the offending value.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelError {
    #[error("unknown {kind} '{name}'")]
    UnknownVariable { kind: VariableKind, name: String },

    #[error("variable '{name}' is already declared")]
    DuplicateVariable { name: String },

    #[error("'{name}' is a {actual}, expected a {expected}")]
    WrongKind {
        name: String,
        expected: VariableKind,
        actual: VariableKind,
    },

    #[error("'{name}' expects a value of type {expected}, got {actual}")]
    InvalidType {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("value {value} for '{name}' violates constraint {constraint}")]
    ConstraintViolation {
        name: String,
        value: String,
        constraint: String,
    },

    #[error("'{name}' has no value")]
    UninitializedVariable { name: String },

    #[error("missing {kind} values: {}", missing.join(", "))]
    Incomplete {
        kind: VariableKind,
        missing: Vec<String>,
    },

    #[error("vector '{name}' has no resolved size")]
    MissingVectorSize { name: String },

    #[error("vector '{name}' cannot have size {size}")]
    InvalidVectorSize { name: String, size: i64 },

    #[error("'{name}' has {expected} channel(s), got {actual}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("channel {index} of '{name}' is out of range (size {size})")]
    IndexOutOfRange {
        name: String,
        index: usize,
        size: usize,
    },

    #[error("'{name}' was assigned more than once during initialization")]
    AlreadyAssigned { name: String },

    #[error("{stage} hook failed: {message}")]
    Hook { stage: String, message: String },

    #[error("no kernel registered as '{id}'")]
    UnknownKernel { id: String },
}

impl KernelError {
    /// Build a [`KernelError::Hook`] from inside a kernel hook.
    pub fn hook(stage: impl Into<String>, message: impl Into<String>) -> Self {
        KernelError::Hook {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Name of the first variable this error refers to, if any.
    pub fn variable(&self) -> Option<&str> {
        match self {
            KernelError::UnknownVariable { name, .. }
            | KernelError::DuplicateVariable { name }
            | KernelError::WrongKind { name, .. }
            | KernelError::InvalidType { name, .. }
            | KernelError::ConstraintViolation { name, .. }
            | KernelError::UninitializedVariable { name }
            | KernelError::MissingVectorSize { name }
            | KernelError::InvalidVectorSize { name, .. }
            | KernelError::ShapeMismatch { name, .. }
            | KernelError::IndexOutOfRange { name, .. }
            | KernelError::AlreadyAssigned { name } => Some(name),
            KernelError::Incomplete { missing, .. } => missing.first().map(String::as_str),
            KernelError::Hook { .. } | KernelError::UnknownKernel { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Signal; 4] = [Signal::Unset, Signal::False, Signal::True, Signal::Conflict];

    #[test]
    fn merge_with_unset_is_identity() {
        for s in ALL {
            assert_eq!(Signal::Unset.merge(s), s);
            assert_eq!(s.merge(Signal::Unset), s);
        }
    }

    #[test]
    fn merge_equal_levels_keeps_level() {
        assert_eq!(Signal::True.merge(Signal::True), Signal::True);
        assert_eq!(Signal::False.merge(Signal::False), Signal::False);
    }

    #[test]
    fn merge_differing_levels_conflicts() {
        assert_eq!(Signal::True.merge(Signal::False), Signal::Conflict);
        assert_eq!(Signal::False.merge(Signal::True), Signal::Conflict);
    }

    #[test]
    fn conflict_absorbs_set_levels() {
        assert_eq!(Signal::Conflict.merge(Signal::True), Signal::Conflict);
        assert_eq!(Signal::False.merge(Signal::Conflict), Signal::Conflict);
        assert_eq!(Signal::Conflict.merge(Signal::Conflict), Signal::Conflict);
    }

    #[test]
    fn merge_is_commutative() {
        for a in ALL {
            for b in ALL {
                assert_eq!(a.merge(b), b.merge(a), "{a} / {b}");
            }
        }
    }

    #[test]
    fn not_inverts_only_driven_levels() {
        assert_eq!(!Signal::True, Signal::False);
        assert_eq!(!Signal::False, Signal::True);
        assert_eq!(!Signal::Unset, Signal::Unset);
        assert_eq!(!Signal::Conflict, Signal::Conflict);
    }

    #[test]
    fn char_roundtrip() {
        for s in ALL {
            assert_eq!(Signal::from_char(s.as_char()), Some(s));
        }
        assert_eq!(Signal::from_char('?'), None);
        assert_eq!(Signal::True.to_string(), "1");
    }

    #[test]
    fn bool_conversions() {
        assert_eq!(Signal::from(true), Signal::True);
        assert_eq!(Signal::False.to_bool(), Some(false));
        assert_eq!(Signal::Conflict.to_bool(), None);
        assert!(!Signal::Unset.is_set());
    }

    #[test]
    fn signal_serialization_roundtrip() {
        let signals = vec![Signal::True, Signal::Unset, Signal::Conflict];
        let json = serde_json::to_string(&signals).unwrap();
        let back: Vec<Signal> = serde_json::from_str(&json).unwrap();
        assert_eq!(signals, back);
    }

    #[test]
    fn id_namespace_split() {
        let id = Id::new("logic:and");
        assert_eq!(id.namespace(), Some("logic"));
        assert_eq!(id.local_name(), "and");

        let bare = Id::from("clock");
        assert_eq!(bare.namespace(), None);
        assert_eq!(bare.local_name(), "clock");
    }

    #[test]
    fn kernel_error_display_names_variable() {
        let err = KernelError::ConstraintViolation {
            name: "count".to_string(),
            value: "1".to_string(),
            constraint: ">= 2".to_string(),
        };
        assert!(err.to_string().contains("count"));
        assert_eq!(err.variable(), Some("count"));

        let incomplete = KernelError::Incomplete {
            kind: VariableKind::Setting,
            missing: vec!["a".into(), "b".into()],
        };
        assert_eq!(incomplete.to_string(), "missing setting values: a, b");
    }

    #[test]
    fn kernel_error_serialization_roundtrip() {
        let err = KernelError::MissingVectorSize {
            name: "inputs".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: KernelError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
