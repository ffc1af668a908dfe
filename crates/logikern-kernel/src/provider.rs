//! Provider / Patch / Storage – the three access tiers over one variable
//! kind.
//!
//! * [`PartialProvider`] – read access to whatever values are present.
//! * [`Patch`] – a mutable, validated, possibly incomplete set of values.
//! * [`Storage`] – an immutable, complete snapshot built from a patch.
//!
//! Every mutation of a patch is validated against the declaration of the
//! variable (type, constraint) and is all-or-nothing: a rejected call leaves
//! the patch exactly as it was.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use logikern_kernel::constraint::Constraint;
//! use logikern_kernel::kernel::Kernel;
//! use logikern_kernel::provider::{ParameterPatch, PartialProvider};
//! use logikern_kernel::variable::Parameter;
//!
//! let mut builder = Kernel::builder("demo:counter");
//! let width = builder.declare(Parameter::new("width", 4_i64).constrained(Constraint::Min(1)));
//! let kernel = builder.build().unwrap();
//!
//! let mut patch = ParameterPatch::new(Arc::clone(kernel.variables().parameters()));
//! assert!(!patch.is_complete());
//! assert!(patch.set(&width, 0).is_err());
//! patch.set(&width, 8).unwrap();
//! let storage = patch.create_storage().unwrap();
//! assert_eq!(*storage.get(&width), 8);
//! ```

use std::any::type_name;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use logikern_types::{KernelError, Signal};

use crate::schema::{
    FieldKind, InputKind, Kind, KindSchema, OutputKind, ParameterKind, SettingKind, VectorSizeKind,
};
use crate::value::{AnyValue, VariableValue};
use crate::variable::{ElementVariable, ScalarVariable, SignalVariable, ValueVariable, VectorVariable};

// ────────────────────────────────────────────────────────────────────────────
// Provider traits
// ────────────────────────────────────────────────────────────────────────────

/// Read access to the values of kind `K` that are currently present.
pub trait PartialProvider<K: Kind> {
    /// Schema the values are judged against.
    fn schema(&self) -> &KindSchema<K>;

    fn value(&self, name: &str) -> Option<&K::Slot>;

    fn has_value(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    /// Declared names without a value, in declaration order.
    fn missing(&self) -> Vec<String> {
        self.schema()
            .names()
            .filter(|name| !self.has_value(name))
            .map(str::to_string)
            .collect()
    }

    fn is_complete(&self) -> bool {
        self.schema().names().all(|name| self.has_value(name))
    }

    /// Every present `(name, value)` pair, in declaration order.
    fn present(&self) -> Vec<(&str, &K::Slot)> {
        self.schema()
            .names()
            .filter_map(|name| self.value(name).map(|slot| (name, slot)))
            .collect()
    }
}

/// Total read access: every declared name has a value.
pub trait Provider<K: Kind>: PartialProvider<K> {
    /// Value of `name`.
    ///
    /// # Panics
    ///
    /// When `name` is not declared in the provider's schema.
    fn slot(&self, name: &str) -> &K::Slot {
        match self.value(name) {
            Some(slot) => slot,
            None => panic!("{} '{name}' is not declared", K::KIND),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Patch
// ────────────────────────────────────────────────────────────────────────────

/// Mutable, possibly incomplete set of validated values of kind `K`.
pub struct Patch<K: Kind> {
    schema: Arc<KindSchema<K>>,
    values: BTreeMap<String, K::Slot>,
}

impl<K: Kind> Patch<K> {
    /// Empty patch over `schema`.
    pub fn new(schema: Arc<KindSchema<K>>) -> Self {
        Self {
            schema,
            values: BTreeMap::new(),
        }
    }

    /// Patch holding `values` without re-validating them.  Callers guarantee
    /// every name is declared in `schema` and every value passes its
    /// validator.
    pub(crate) fn from_trusted(schema: Arc<KindSchema<K>>, values: BTreeMap<String, K::Slot>) -> Self {
        Self { schema, values }
    }

    pub fn schema_handle(&self) -> &Arc<KindSchema<K>> {
        &self.schema
    }

    /// Assign a raw value.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownVariable`] for an undeclared name, or whatever
    /// the declaration's validator rejects.  The patch is unchanged on error.
    pub fn set_value(&mut self, name: &str, slot: K::Slot) -> Result<(), KernelError> {
        self.schema.validate(name, &slot)?;
        self.values.insert(name.to_string(), slot);
        Ok(())
    }

    /// Remove the value of `name`, returning it if it was present.
    pub fn unset(&mut self, name: &str) -> Option<K::Slot> {
        self.values.remove(name)
    }

    /// Copy every value present in `other` into this patch.
    ///
    /// # Errors
    ///
    /// Fails without modifying the patch when any value is unknown to this
    /// patch's schema or invalid for it.
    pub fn apply_patch<P>(&mut self, other: &P) -> Result<(), KernelError>
    where
        P: PartialProvider<K> + ?Sized,
    {
        let staged = other
            .present()
            .into_iter()
            .map(|(name, slot)| (name.to_string(), slot.clone()))
            .collect();
        self.commit(staged)
    }

    /// Assign a batch of raw values by name.
    ///
    /// # Errors
    ///
    /// Fails without modifying the patch when any name is undeclared or any
    /// value is invalid.
    pub fn update<I, S>(&mut self, values: I) -> Result<(), KernelError>
    where
        I: IntoIterator<Item = (S, K::Slot)>,
        S: Into<String>,
    {
        let staged = values.into_iter().map(|(name, slot)| (name.into(), slot)).collect();
        self.commit(staged)
    }

    fn commit(&mut self, staged: Vec<(String, K::Slot)>) -> Result<(), KernelError> {
        for (name, slot) in &staged {
            self.schema.validate(name, slot)?;
        }
        self.values.extend(staged);
        Ok(())
    }

    /// Freeze a copy of this patch.
    ///
    /// # Errors
    ///
    /// [`KernelError::Incomplete`] listing every declared name without a
    /// value.
    pub fn create_storage(&self) -> Result<Storage<K>, KernelError> {
        self.clone().into_storage()
    }

    /// Freeze this patch without copying.
    ///
    /// # Errors
    ///
    /// Same as [`Patch::create_storage`].
    pub fn into_storage(self) -> Result<Storage<K>, KernelError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(KernelError::Incomplete {
                kind: K::KIND,
                missing,
            });
        }
        Ok(Storage {
            schema: self.schema,
            values: Arc::new(self.values),
        })
    }

    /// Number of values present.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Kind> PartialProvider<K> for Patch<K> {
    fn schema(&self) -> &KindSchema<K> {
        &self.schema
    }

    fn value(&self, name: &str) -> Option<&K::Slot> {
        self.values.get(name)
    }
}

impl<K: Kind> Clone for Patch<K> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            values: self.values.clone(),
        }
    }
}

impl<K: Kind> PartialEq for Patch<K> {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl<K: Kind> fmt::Debug for Patch<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patch")
            .field("kind", &K::KIND)
            .field("values", &self.values)
            .finish()
    }
}

// ── Typed value access ──────────────────────────────────────────────────────

impl<K: Kind<Slot = AnyValue>> Patch<K> {
    /// Assign `value` to the variable behind `variable`.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownVariable`] when the handle is not declared in
    /// this patch's schema, [`KernelError::ConstraintViolation`] when the
    /// value breaks the declaration's constraint.  The previous value is kept
    /// on error.
    pub fn set<V>(&mut self, variable: &V, value: V::Value) -> Result<(), KernelError>
    where
        V: ValueVariable<Kind = K>,
    {
        self.set_value(variable.name(), AnyValue::new(value))
    }

    /// Current value of `variable`.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownVariable`] for an undeclared handle,
    /// [`KernelError::UninitializedVariable`] when no value is present.
    pub fn get<V>(&self, variable: &V) -> Result<&V::Value, KernelError>
    where
        V: ValueVariable<Kind = K>,
    {
        let name = variable.name();
        if !self.schema.contains(name) {
            return Err(KernelError::UnknownVariable {
                kind: K::KIND,
                name: name.to_string(),
            });
        }
        match self.values.get(name) {
            Some(slot) => Ok(downcast(name, slot)),
            None => Err(KernelError::UninitializedVariable {
                name: name.to_string(),
            }),
        }
    }

    pub fn contains<V>(&self, variable: &V) -> bool
    where
        V: ValueVariable<Kind = K>,
    {
        self.values.contains_key(variable.name())
    }

    /// Mutable access for the update hook; the value must be present.
    pub(crate) fn value_mut<V>(&mut self, variable: &V) -> &mut V::Value
    where
        V: ValueVariable<Kind = K>,
    {
        let name = variable.name();
        match self.values.get_mut(name) {
            Some(slot) => downcast_mut(name, slot),
            None => panic!("{} '{name}' is not declared", K::KIND),
        }
    }
}

// ── Signal access ───────────────────────────────────────────────────────────

impl<K: Kind<Slot = Vec<Signal>>> Patch<K> {
    /// Channels of `name`, if present.
    pub fn channels(&self, name: &str) -> Option<&[Signal]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// # Panics
    ///
    /// When the variable has no value in this patch.
    pub fn signal<V>(&self, variable: &V) -> Signal
    where
        V: ScalarVariable<Kind = K>,
    {
        self.signals(variable)[0]
    }

    /// # Panics
    ///
    /// When the variable has no value in this patch.
    pub fn signals<V>(&self, variable: &V) -> &[Signal]
    where
        V: SignalVariable<Kind = K> + ?Sized,
    {
        expect_channels::<K>(self.channels(variable.name()), variable.name())
    }

    /// # Panics
    ///
    /// When the vector has no value in this patch or the index is out of
    /// range.
    pub fn signal_at<E>(&self, element: &E) -> Signal
    where
        E: ElementVariable<Kind = K>,
    {
        let signals = expect_channels::<K>(self.channels(element.vector_name()), element.vector_name());
        channel_at(signals, element.vector_name(), element.index())
    }

    /// Replace all channels of `name`.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownVariable`] for an undeclared name,
    /// [`KernelError::ShapeMismatch`] when a value is already present and
    /// `signals` has a different length.
    pub fn set_channels(&mut self, name: &str, signals: &[Signal]) -> Result<(), KernelError> {
        if let Some(current) = self.values.get(name) {
            check_width(name, current.len(), signals.len())?;
        }
        self.set_value(name, signals.to_vec())
    }

    pub fn set_signal<V>(&mut self, variable: &V, signal: Signal) -> Result<(), KernelError>
    where
        V: ScalarVariable<Kind = K>,
    {
        self.set_channels(variable.name(), &[signal])
    }

    pub fn set_signals<V>(&mut self, variable: &V, signals: &[Signal]) -> Result<(), KernelError>
    where
        V: SignalVariable<Kind = K> + ?Sized,
    {
        self.set_channels(variable.name(), signals)
    }

    /// Assign one channel of a vector whose value is already present.
    ///
    /// # Errors
    ///
    /// [`KernelError::UninitializedVariable`] when the vector has no value,
    /// [`KernelError::IndexOutOfRange`] for a bad index.
    pub fn set_signal_at<E>(&mut self, element: &E, signal: Signal) -> Result<(), KernelError>
    where
        E: ElementVariable<Kind = K>,
    {
        let channel = self.channel_mut(element.vector_name(), element.index())?;
        *channel = signal;
        Ok(())
    }

    /// Merge `signals` into the current channels of `name` with
    /// [`Signal::merge`].
    ///
    /// # Errors
    ///
    /// As for [`Patch::set_channels`]; a missing value is treated as all
    /// unset.
    pub fn merge_channels(&mut self, name: &str, signals: &[Signal]) -> Result<(), KernelError> {
        let merged: Vec<Signal> = match self.values.get(name) {
            Some(current) => {
                check_width(name, current.len(), signals.len())?;
                current.iter().zip(signals).map(|(a, b)| a.merge(*b)).collect()
            }
            None => signals.to_vec(),
        };
        self.set_value(name, merged)
    }

    pub fn merge_signal<V>(&mut self, variable: &V, signal: Signal) -> Result<(), KernelError>
    where
        V: ScalarVariable<Kind = K>,
    {
        self.merge_channels(variable.name(), &[signal])
    }

    pub fn merge_signals<V>(&mut self, variable: &V, signals: &[Signal]) -> Result<(), KernelError>
    where
        V: SignalVariable<Kind = K> + ?Sized,
    {
        self.merge_channels(variable.name(), signals)
    }

    pub fn merge_signal_at<E>(&mut self, element: &E, signal: Signal) -> Result<(), KernelError>
    where
        E: ElementVariable<Kind = K>,
    {
        let channel = self.channel_mut(element.vector_name(), element.index())?;
        *channel = channel.merge(signal);
        Ok(())
    }

    /// Set every present channel to [`Signal::Unset`], keeping widths.
    pub fn reset(&mut self) {
        for signals in self.values.values_mut() {
            signals.fill(Signal::Unset);
        }
    }

    fn channel_mut(&mut self, name: &str, index: usize) -> Result<&mut Signal, KernelError> {
        if !self.schema.contains(name) {
            return Err(KernelError::UnknownVariable {
                kind: K::KIND,
                name: name.to_string(),
            });
        }
        let signals = self
            .values
            .get_mut(name)
            .ok_or_else(|| KernelError::UninitializedVariable {
                name: name.to_string(),
            })?;
        let size = signals.len();
        signals.get_mut(index).ok_or_else(|| KernelError::IndexOutOfRange {
            name: name.to_string(),
            index,
            size,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Storage
// ────────────────────────────────────────────────────────────────────────────

/// Immutable, complete snapshot of the values of kind `K`.
///
/// Cloning shares the underlying map.
pub struct Storage<K: Kind> {
    schema: Arc<KindSchema<K>>,
    values: Arc<BTreeMap<String, K::Slot>>,
}

impl<K: Kind> Storage<K> {
    /// Storage for an empty schema.
    pub fn empty() -> Self {
        Self {
            schema: Arc::new(KindSchema::empty()),
            values: Arc::new(BTreeMap::new()),
        }
    }

    pub fn schema_handle(&self) -> &Arc<KindSchema<K>> {
        &self.schema
    }

    /// Another handle to the same values.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// A patch pre-filled with every value of this storage.
    pub fn mutable_copy(&self) -> Patch<K> {
        Patch {
            schema: Arc::clone(&self.schema),
            values: (*self.values).clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Kind> PartialProvider<K> for Storage<K> {
    fn schema(&self) -> &KindSchema<K> {
        &self.schema
    }

    fn value(&self, name: &str) -> Option<&K::Slot> {
        self.values.get(name)
    }

    fn is_complete(&self) -> bool {
        true
    }

    fn missing(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<K: Kind> Provider<K> for Storage<K> {}

impl<K: Kind> Clone for Storage<K> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            values: Arc::clone(&self.values),
        }
    }
}

impl<K: Kind> PartialEq for Storage<K> {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl<K: Kind> fmt::Debug for Storage<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("kind", &K::KIND)
            .field("values", &self.values)
            .finish()
    }
}

impl<K: Kind<Slot = AnyValue>> Storage<K> {
    /// Value of `variable`.
    ///
    /// # Panics
    ///
    /// When the handle is not declared in this storage's schema or its type
    /// differs from the declaration.
    pub fn get<V>(&self, variable: &V) -> &V::Value
    where
        V: ValueVariable<Kind = K>,
    {
        let name = variable.name();
        downcast(name, self.slot(name))
    }

    /// Like [`Storage::get`] but `None` for an undeclared handle.
    pub fn try_get<V>(&self, variable: &V) -> Option<&V::Value>
    where
        V: ValueVariable<Kind = K>,
    {
        self.values
            .get(variable.name())
            .and_then(AnyValue::downcast_ref::<V::Value>)
    }
}

impl<K: Kind<Slot = Vec<Signal>>> Storage<K> {
    pub fn channels(&self, name: &str) -> Option<&[Signal]> {
        self.values.get(name).map(Vec::as_slice)
    }

    pub fn signal<V>(&self, variable: &V) -> Signal
    where
        V: ScalarVariable<Kind = K>,
    {
        self.signals(variable)[0]
    }

    pub fn signals<V>(&self, variable: &V) -> &[Signal]
    where
        V: SignalVariable<Kind = K> + ?Sized,
    {
        expect_channels::<K>(self.channels(variable.name()), variable.name())
    }

    pub fn signal_at<E>(&self, element: &E) -> Signal
    where
        E: ElementVariable<Kind = K>,
    {
        let signals = expect_channels::<K>(self.channels(element.vector_name()), element.vector_name());
        channel_at(signals, element.vector_name(), element.index())
    }
}

impl Storage<VectorSizeKind> {
    /// Resolved width of the vector called `name`.
    pub fn size(&self, name: &str) -> Option<usize> {
        self.values.get(name).copied()
    }

    /// Resolved width of `variable`.
    ///
    /// # Panics
    ///
    /// When `variable` is not a vector of this variant.
    pub fn size_of<V>(&self, variable: &V) -> usize
    where
        V: VectorVariable + ?Sized,
    {
        *self.slot(variable.name())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Aliases
// ────────────────────────────────────────────────────────────────────────────

pub type ParameterPatch = Patch<ParameterKind>;
pub type ParameterStorage = Storage<ParameterKind>;
pub type SettingPatch = Patch<SettingKind>;
pub type SettingStorage = Storage<SettingKind>;
pub type FieldPatch = Patch<FieldKind>;
pub type FieldStorage = Storage<FieldKind>;
/// Mutable per-tick field values of a [`KernelState`][crate::state::KernelState].
pub type FieldState = Patch<FieldKind>;
pub type InputState = Patch<InputKind>;
pub type OutputPatch = Patch<OutputKind>;
pub type OutputStorage = Storage<OutputKind>;
pub type OutputState = Patch<OutputKind>;
pub type VectorSizePatch = Patch<VectorSizeKind>;
pub type VectorSizeStorage = Storage<VectorSizeKind>;

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

pub(crate) fn downcast<'a, T: VariableValue>(name: &str, slot: &'a AnyValue) -> &'a T {
    let actual = slot.type_name();
    match slot.downcast_ref::<T>() {
        Some(value) => value,
        None => panic!("'{name}' holds a {actual}, not a {}", type_name::<T>()),
    }
}

fn downcast_mut<'a, T: VariableValue>(name: &str, slot: &'a mut AnyValue) -> &'a mut T {
    let actual = slot.type_name();
    match slot.downcast_mut::<T>() {
        Some(value) => value,
        None => panic!("'{name}' holds a {actual}, not a {}", type_name::<T>()),
    }
}

fn expect_channels<'a, K: Kind>(signals: Option<&'a [Signal]>, name: &str) -> &'a [Signal] {
    match signals {
        Some(signals) => signals,
        None => panic!("{} '{name}' has no value", K::KIND),
    }
}

fn channel_at(signals: &[Signal], name: &str, index: usize) -> Signal {
    match signals.get(index) {
        Some(signal) => *signal,
        None => panic!("channel {index} of '{name}' is out of range (size {})", signals.len()),
    }
}

pub(crate) fn check_width(name: &str, expected: usize, actual: usize) -> Result<(), KernelError> {
    if expected == actual {
        Ok(())
    } else {
        Err(KernelError::ShapeMismatch {
            name: name.to_string(),
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use crate::schema::VariableSet;
    use crate::variable::{Declare, Field, Parameter, ScalarInput, Setting, VectorInput};

    struct Fixture {
        set: VariableSet,
        count: Parameter<i64>,
        label: Parameter<String>,
        delay: Setting<u32>,
        ticks: Field<u64>,
        enable: ScalarInput,
        data: VectorInput,
    }

    fn fixture() -> Fixture {
        let count = Parameter::new("count", 2_i64).constrained(Constraint::Min(2));
        let label = Parameter::new("label", String::from("x"));
        let delay = Setting::new("delay", 1_u32).constrained(Constraint::range(1, 10));
        let ticks = Field::new("ticks", 0_u64);
        let enable = ScalarInput::new("enable");
        let data = VectorInput::new("data", 3);
        let mut set = VariableSet::new();
        count.register(&mut set).unwrap();
        label.register(&mut set).unwrap();
        delay.register(&mut set).unwrap();
        ticks.register(&mut set).unwrap();
        enable.register(&mut set).unwrap();
        data.register(&mut set).unwrap();
        Fixture {
            set,
            count,
            label,
            delay,
            ticks,
            enable,
            data,
        }
    }

    #[test]
    fn rejected_set_keeps_previous_value() {
        let f = fixture();
        let mut patch = ParameterPatch::new(Arc::clone(f.set.parameters()));
        patch.set(&f.count, 4).unwrap();
        let err = patch.set(&f.count, 1).unwrap_err();
        assert!(matches!(err, KernelError::ConstraintViolation { .. }));
        assert_eq!(patch.get(&f.count), Ok(&4));
    }

    #[test]
    fn get_distinguishes_unknown_and_unset() {
        let f = fixture();
        let patch = SettingPatch::new(Arc::clone(f.set.settings()));
        assert!(matches!(
            patch.get(&f.delay),
            Err(KernelError::UninitializedVariable { .. })
        ));
        let stranger = Setting::new("stranger", 0_u32);
        assert!(matches!(
            patch.get(&stranger),
            Err(KernelError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn raw_set_checks_type() {
        let f = fixture();
        let mut patch = ParameterPatch::new(Arc::clone(f.set.parameters()));
        let err = patch.set_value("count", AnyValue::new("five")).unwrap_err();
        assert!(matches!(err, KernelError::InvalidType { .. }));
        assert!(patch.is_empty());
    }

    #[test]
    fn update_is_all_or_nothing() {
        let f = fixture();
        let mut patch = ParameterPatch::new(Arc::clone(f.set.parameters()));
        let err = patch
            .update([
                ("count", AnyValue::new(3_i64)),
                ("ghost", AnyValue::new(1_i64)),
            ])
            .unwrap_err();
        assert!(matches!(err, KernelError::UnknownVariable { ref name, .. } if name == "ghost"));
        assert!(!patch.contains(&f.count));

        patch
            .update([
                ("count", AnyValue::new(3_i64)),
                ("label", AnyValue::new(String::from("y"))),
            ])
            .unwrap();
        assert_eq!(patch.get(&f.label).unwrap(), "y");
    }

    #[test]
    fn apply_patch_copies_present_values_only() {
        let f = fixture();
        let schema = Arc::clone(f.set.parameters());
        let mut source = ParameterPatch::new(Arc::clone(&schema));
        source.set(&f.count, 6).unwrap();

        let mut target = ParameterPatch::new(schema);
        target.set(&f.label, String::from("kept")).unwrap();
        target.apply_patch(&source).unwrap();
        assert_eq!(target.get(&f.count), Ok(&6));
        assert_eq!(target.get(&f.label).unwrap(), "kept");
    }

    #[test]
    fn apply_patch_rejects_foreign_names_without_mutation() {
        let f = fixture();
        let mut wide = ParameterPatch::new(Arc::clone(f.set.parameters()));
        wide.set(&f.count, 3).unwrap();
        wide.set(&f.label, String::from("z")).unwrap();

        let narrow_schema = Arc::new(f.set.parameters().without(["label"]));
        let mut narrow = ParameterPatch::new(narrow_schema);
        assert!(narrow.apply_patch(&wide).is_err());
        assert!(narrow.is_empty());
    }

    #[test]
    fn incomplete_patch_lists_every_missing_name() {
        let f = fixture();
        let patch = ParameterPatch::new(Arc::clone(f.set.parameters()));
        assert_eq!(
            patch.create_storage().unwrap_err(),
            KernelError::Incomplete {
                kind: logikern_types::VariableKind::Parameter,
                missing: vec!["count".into(), "label".into()],
            }
        );
    }

    #[test]
    fn complete_patch_round_trips_through_storage() {
        let f = fixture();
        let mut patch = ParameterPatch::new(Arc::clone(f.set.parameters()));
        patch.set(&f.count, 9).unwrap();
        patch.set(&f.label, String::from("q")).unwrap();
        let storage = patch.create_storage().unwrap();
        assert_eq!(*storage.get(&f.count), 9);
        assert_eq!(storage.get(&f.label), "q");
        assert_eq!(storage.mutable_copy(), patch);
        assert_eq!(storage.copy(), storage);
        assert!(storage.is_complete());
    }

    #[test]
    fn unset_removes_value() {
        let f = fixture();
        let mut patch = FieldPatch::new(Arc::clone(f.set.fields()));
        patch.set(&f.ticks, 5).unwrap();
        assert!(patch.unset("ticks").is_some());
        assert_eq!(patch.missing(), vec!["ticks".to_string()]);
    }

    #[test]
    #[should_panic(expected = "not declared")]
    fn storage_slot_panics_on_undeclared_name() {
        let f = fixture();
        let mut patch = FieldPatch::new(Arc::clone(f.set.fields()));
        patch.set(&f.ticks, 1).unwrap();
        let storage = patch.into_storage().unwrap();
        let _ = storage.slot("ghost");
    }

    #[test]
    fn signal_patch_merges_channels() {
        let f = fixture();
        let mut inputs = InputState::new(Arc::clone(f.set.inputs()));
        inputs.set_signal(&f.enable, Signal::Unset).unwrap();
        inputs.set_signals(&f.data, &[Signal::Unset; 3]).unwrap();

        inputs.merge_signal(&f.enable, Signal::True).unwrap();
        inputs.merge_signal(&f.enable, Signal::False).unwrap();
        assert_eq!(inputs.signal(&f.enable), Signal::Conflict);

        inputs
            .merge_signals(&f.data, &[Signal::True, Signal::Unset, Signal::False])
            .unwrap();
        inputs.merge_signal_at(&f.data.element(1), Signal::True).unwrap();
        assert_eq!(inputs.signals(&f.data), &[Signal::True, Signal::True, Signal::False]);
        assert_eq!(inputs.signal_at(&f.data.element(2)), Signal::False);

        inputs.reset();
        assert_eq!(inputs.signals(&f.data), &[Signal::Unset; 3]);
    }

    #[test]
    fn signal_writes_keep_width() {
        let f = fixture();
        let mut inputs = InputState::new(Arc::clone(f.set.inputs()));
        inputs.set_signals(&f.data, &[Signal::False; 3]).unwrap();
        assert!(matches!(
            inputs.set_signals(&f.data, &[Signal::True; 2]),
            Err(KernelError::ShapeMismatch { expected: 3, actual: 2, .. })
        ));
        assert!(matches!(
            inputs.set_signal_at(&f.data.element(3), Signal::True),
            Err(KernelError::IndexOutOfRange { index: 3, size: 3, .. })
        ));
        assert_eq!(inputs.signals(&f.data), &[Signal::False; 3]);
    }
}
