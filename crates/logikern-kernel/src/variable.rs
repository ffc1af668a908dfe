//! Variable handles – the typed capability tokens of a kernel.
//!
//! A handle is created once, declared on a [`KernelBuilder`][crate::kernel::KernelBuilder]
//! (or, for conditional inputs and outputs, on a
//! [`ConfigurationContext`][crate::context::ConfigurationContext]) and then
//! captured by the kernel's hooks to read and write values with static types.
//! Handles are cheap to clone; every clone refers to the same declaration.
//!
//! | Handle | Kind | Value |
//! |---|---|---|
//! | [`Parameter<T>`] | parameter | `T`, constrained |
//! | [`Setting<T>`] | setting | `T`, constrained |
//! | [`Field<T>`] | field | `T` |
//! | [`ScalarInput`] / [`VectorInput`] | input | [`Signal`] channels |
//! | [`ScalarOutput`] / [`VectorOutput`] | output | [`Signal`] channels |

use std::fmt;
use std::sync::Arc;

use logikern_types::{KernelError, Signal, VariableKind};

use crate::constraint::Constraint;
use crate::context::{InitScope, SettingScope};
use crate::schema::{
    FieldInit, FieldKind, InputKind, Kind, OutputKind, OutputSpec, ParameterKind, SchemaEntry,
    SettingKind, VariableSet,
};
use crate::value::{AnyValue, ConfigValue, VariableValue};

// ────────────────────────────────────────────────────────────────────────────
// Handle traits
// ────────────────────────────────────────────────────────────────────────────

/// A handle whose value is stored as an [`AnyValue`] (parameters, settings
/// and fields).
pub trait ValueVariable {
    type Value: VariableValue;
    type Kind: Kind<Slot = AnyValue>;

    fn name(&self) -> &str;

    /// Check `value` against everything the declaration knows beyond its
    /// static type.
    fn check(&self, value: &Self::Value) -> Result<(), KernelError>;
}

/// A handle over [`Signal`] channels (inputs and outputs).
pub trait SignalVariable {
    type Kind: Kind<Slot = Vec<Signal>>;

    fn name(&self) -> &str;
}

/// A single-channel input or output.
pub trait ScalarVariable: SignalVariable {}

/// A multi-channel input or output whose width is fixed per variant.
pub trait VectorVariable: SignalVariable {
    fn size(&self) -> &VectorSize;
}

/// One channel of a vector input or output.
pub trait ElementVariable {
    type Kind: Kind<Slot = Vec<Signal>>;

    fn vector_name(&self) -> &str;
    fn index(&self) -> usize;
}

/// Anything that can be declared on a kernel.
pub trait Declare: Clone {
    const KIND: VariableKind;

    fn name(&self) -> &str;

    /// Add this declaration to `set`, failing on a name collision.
    fn register(&self, set: &mut VariableSet) -> Result<(), KernelError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Parameter
// ────────────────────────────────────────────────────────────────────────────

struct ParameterDef<T> {
    name: Arc<str>,
    initializer: Arc<dyn Fn() -> T + Send + Sync>,
    constraint: Constraint<T>,
}

/// Configuration-time variable, fixed for the lifetime of a variant.
///
/// # Example
///
/// ```
/// use logikern_kernel::constraint::Constraint;
/// use logikern_kernel::variable::Parameter;
///
/// let count = Parameter::new("count", 2_i64).constrained(Constraint::Min(2));
/// assert!(count.is_valid_value(&5));
/// assert!(!count.is_valid_value(&1));
/// ```
pub struct Parameter<T> {
    def: Arc<ParameterDef<T>>,
}

impl<T: ConfigValue> Parameter<T> {
    /// Declare a parameter whose default is `default`.
    pub fn new(name: impl Into<String>, default: T) -> Self {
        Self::with_initializer(name, move || default.clone())
    }

    /// Declare a parameter whose default is produced by `initializer`.
    pub fn with_initializer(
        name: impl Into<String>,
        initializer: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            def: Arc::new(ParameterDef {
                name: Arc::from(name.into()),
                initializer: Arc::new(initializer),
                constraint: Constraint::Always,
            }),
        }
    }

    /// Return a copy of this declaration restricted by `constraint`.
    pub fn constrained(self, constraint: Constraint<T>) -> Self {
        Self {
            def: Arc::new(ParameterDef {
                name: Arc::clone(&self.def.name),
                initializer: Arc::clone(&self.def.initializer),
                constraint,
            }),
        }
    }

    pub fn constraint(&self) -> &Constraint<T> {
        &self.def.constraint
    }

    pub fn default_value(&self) -> T {
        (self.def.initializer)()
    }

    pub fn is_valid_type(&self, value: &AnyValue) -> bool {
        value.is::<T>()
    }

    pub fn is_valid_value(&self, value: &T) -> bool {
        self.def.constraint.test(value)
    }

    pub fn is_valid_type_and_value(&self, value: &AnyValue) -> bool {
        value.downcast_ref::<T>().is_some_and(|v| self.is_valid_value(v))
    }

    pub(crate) fn schema_entry(&self) -> SchemaEntry<ParameterKind> {
        let handle = self.clone();
        let init = self.clone();
        SchemaEntry::<ParameterKind>::new(
            Arc::clone(&self.def.name),
            std::any::type_name::<T>(),
            Arc::new(move |value: &AnyValue| check_config(&handle.def.name, &handle.def.constraint, value)),
            Arc::new(move || AnyValue::new(init.default_value())),
        )
    }
}

impl<T> Parameter<T> {
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

impl<T> Clone for Parameter<T> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Parameter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.def.name)
            .field("constraint", &self.def.constraint)
            .finish()
    }
}

impl<T: ConfigValue> ValueVariable for Parameter<T> {
    type Value = T;
    type Kind = ParameterKind;

    fn name(&self) -> &str {
        &self.def.name
    }

    fn check(&self, value: &T) -> Result<(), KernelError> {
        check_constraint(&self.def.name, &self.def.constraint, value)
    }
}

impl<T: ConfigValue> Declare for Parameter<T> {
    const KIND: VariableKind = VariableKind::Parameter;

    fn name(&self) -> &str {
        &self.def.name
    }

    fn register(&self, set: &mut VariableSet) -> Result<(), KernelError> {
        set.insert_parameter(self.schema_entry())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Setting
// ────────────────────────────────────────────────────────────────────────────

type SettingInitializer<T> = Arc<dyn Fn(&SettingScope<'_>) -> T + Send + Sync>;

struct SettingDef<T> {
    name: Arc<str>,
    initializer: SettingInitializer<T>,
    constraint: Constraint<T>,
}

/// Instance-time variable, fixed for the lifetime of an instance.
///
/// The initializer may read parameters and vector sizes.
pub struct Setting<T> {
    def: Arc<SettingDef<T>>,
}

impl<T: ConfigValue> Setting<T> {
    pub fn new(name: impl Into<String>, default: T) -> Self {
        Self::computed(name, move |_| default.clone())
    }

    /// Declare a setting whose default is derived from parameters and vector
    /// sizes.
    pub fn computed(
        name: impl Into<String>,
        initializer: impl Fn(&SettingScope<'_>) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            def: Arc::new(SettingDef {
                name: Arc::from(name.into()),
                initializer: Arc::new(initializer),
                constraint: Constraint::Always,
            }),
        }
    }

    pub fn constrained(self, constraint: Constraint<T>) -> Self {
        Self {
            def: Arc::new(SettingDef {
                name: Arc::clone(&self.def.name),
                initializer: Arc::clone(&self.def.initializer),
                constraint,
            }),
        }
    }

    pub fn constraint(&self) -> &Constraint<T> {
        &self.def.constraint
    }

    pub fn is_valid_type(&self, value: &AnyValue) -> bool {
        value.is::<T>()
    }

    pub fn is_valid_value(&self, value: &T) -> bool {
        self.def.constraint.test(value)
    }

    pub fn is_valid_type_and_value(&self, value: &AnyValue) -> bool {
        value.downcast_ref::<T>().is_some_and(|v| self.is_valid_value(v))
    }

    pub(crate) fn schema_entry(&self) -> SchemaEntry<SettingKind> {
        let handle = self.clone();
        let init = Arc::clone(&self.def.initializer);
        SchemaEntry::<SettingKind>::new(
            Arc::clone(&self.def.name),
            std::any::type_name::<T>(),
            Arc::new(move |value: &AnyValue| check_config(&handle.def.name, &handle.def.constraint, value)),
            Arc::new(move |scope: &SettingScope<'_>| AnyValue::new(init(scope))),
        )
    }
}

impl<T> Setting<T> {
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

impl<T> Clone for Setting<T> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setting")
            .field("name", &self.def.name)
            .field("constraint", &self.def.constraint)
            .finish()
    }
}

impl<T: ConfigValue> ValueVariable for Setting<T> {
    type Value = T;
    type Kind = SettingKind;

    fn name(&self) -> &str {
        &self.def.name
    }

    fn check(&self, value: &T) -> Result<(), KernelError> {
        check_constraint(&self.def.name, &self.def.constraint, value)
    }
}

impl<T: ConfigValue> Declare for Setting<T> {
    const KIND: VariableKind = VariableKind::Setting;

    fn name(&self) -> &str {
        &self.def.name
    }

    fn register(&self, set: &mut VariableSet) -> Result<(), KernelError> {
        set.insert_setting(self.schema_entry())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Field
// ────────────────────────────────────────────────────────────────────────────

type FieldInitializer<T> = Arc<dyn Fn(&InitScope<'_>) -> T + Send + Sync>;

struct FieldDef<T> {
    name: Arc<str>,
    initializer: Option<FieldInitializer<T>>,
}

/// Hidden per-tick state.
///
/// A field without an initializer must be assigned by the kernel's
/// initialization hook.
pub struct Field<T> {
    def: Arc<FieldDef<T>>,
}

impl<T: VariableValue> Field<T> {
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        Self::computed(name, move |_| initial.clone())
    }

    /// Declare a field whose initial value is derived from parameters,
    /// settings and vector sizes.
    pub fn computed(
        name: impl Into<String>,
        initializer: impl Fn(&InitScope<'_>) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            def: Arc::new(FieldDef {
                name: Arc::from(name.into()),
                initializer: Some(Arc::new(initializer)),
            }),
        }
    }

    /// Declare a field that the initialization hook must assign.
    pub fn uninitialized(name: impl Into<String>) -> Self {
        Self {
            def: Arc::new(FieldDef {
                name: Arc::from(name.into()),
                initializer: None,
            }),
        }
    }

    pub fn is_valid_type(&self, value: &AnyValue) -> bool {
        value.is::<T>()
    }

    pub(crate) fn schema_entry(&self) -> SchemaEntry<FieldKind> {
        let name = Arc::clone(&self.def.name);
        let init: FieldInit = match &self.def.initializer {
            Some(f) => {
                let f = Arc::clone(f);
                Some(Arc::new(move |scope: &InitScope<'_>| AnyValue::new(f(scope))))
            }
            None => None,
        };
        SchemaEntry::<FieldKind>::new(
            Arc::clone(&self.def.name),
            std::any::type_name::<T>(),
            Arc::new(move |value: &AnyValue| check_type::<T>(&name, value)),
            init,
        )
    }
}

impl<T> Field<T> {
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
        }
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.def.name)
            .field("initialized", &self.def.initializer.is_some())
            .finish()
    }
}

impl<T: VariableValue> ValueVariable for Field<T> {
    type Value = T;
    type Kind = FieldKind;

    fn name(&self) -> &str {
        &self.def.name
    }

    fn check(&self, _value: &T) -> Result<(), KernelError> {
        Ok(())
    }
}

impl<T: VariableValue> Declare for Field<T> {
    const KIND: VariableKind = VariableKind::Field;

    fn name(&self) -> &str {
        &self.def.name
    }

    fn register(&self, set: &mut VariableSet) -> Result<(), KernelError> {
        set.insert_field(self.schema_entry())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Vector sizes and shapes
// ────────────────────────────────────────────────────────────────────────────

/// How the width of a vector input or output is decided.
#[derive(Clone, Debug)]
pub enum VectorSize {
    /// A constant width.
    Value(usize),
    /// The value of an integer parameter; negative values are rejected.
    FromParameter(Parameter<i64>),
    /// Assigned by the kernel's configuration hook.
    Deferred,
}

impl From<usize> for VectorSize {
    fn from(value: usize) -> Self {
        VectorSize::Value(value)
    }
}

impl From<Parameter<i64>> for VectorSize {
    fn from(value: Parameter<i64>) -> Self {
        VectorSize::FromParameter(value)
    }
}

impl From<&Parameter<i64>> for VectorSize {
    fn from(value: &Parameter<i64>) -> Self {
        VectorSize::FromParameter(value.clone())
    }
}

/// Channel layout of an input or output.
#[derive(Clone, Debug)]
pub enum Shape {
    Scalar,
    Vector(VectorSize),
}

impl Shape {
    pub fn is_vector(&self) -> bool {
        matches!(self, Shape::Vector(_))
    }
}

/// Initial value of an output.
#[derive(Clone)]
pub enum OutputInitializer {
    /// Every channel starts at the same signal.
    Uniform(Signal),
    /// Channel `i` starts at `f(scope, i)`.
    PerIndex(Arc<dyn Fn(&InitScope<'_>, usize) -> Signal + Send + Sync>),
    /// The whole vector is produced at once from the scope and the width.
    Whole(Arc<dyn Fn(&InitScope<'_>, usize) -> Vec<Signal> + Send + Sync>),
}

impl OutputInitializer {
    pub fn per_index(f: impl Fn(&InitScope<'_>, usize) -> Signal + Send + Sync + 'static) -> Self {
        OutputInitializer::PerIndex(Arc::new(f))
    }

    pub fn whole(f: impl Fn(&InitScope<'_>, usize) -> Vec<Signal> + Send + Sync + 'static) -> Self {
        OutputInitializer::Whole(Arc::new(f))
    }

    /// Produce the initial channels of an output of width `size`.
    pub(crate) fn evaluate(
        &self,
        name: &str,
        scope: &InitScope<'_>,
        size: usize,
    ) -> Result<Vec<Signal>, KernelError> {
        match self {
            OutputInitializer::Uniform(signal) => Ok(vec![*signal; size]),
            OutputInitializer::PerIndex(f) => Ok((0..size).map(|i| f(scope, i)).collect()),
            OutputInitializer::Whole(f) => {
                let signals = f(scope, size);
                if signals.len() == size {
                    Ok(signals)
                } else {
                    Err(KernelError::ShapeMismatch {
                        name: name.to_string(),
                        expected: size,
                        actual: signals.len(),
                    })
                }
            }
        }
    }
}

impl Default for OutputInitializer {
    fn default() -> Self {
        OutputInitializer::Uniform(Signal::Unset)
    }
}

impl fmt::Debug for OutputInitializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputInitializer::Uniform(s) => f.debug_tuple("Uniform").field(s).finish(),
            OutputInitializer::PerIndex(_) => f.write_str("PerIndex(..)"),
            OutputInitializer::Whole(_) => f.write_str("Whole(..)"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Inputs
// ────────────────────────────────────────────────────────────────────────────

/// Single-channel input.
#[derive(Clone, Debug)]
pub struct ScalarInput {
    name: Arc<str>,
}

impl ScalarInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SignalVariable for ScalarInput {
    type Kind = InputKind;

    fn name(&self) -> &str {
        &self.name
    }
}

impl ScalarVariable for ScalarInput {}

impl Declare for ScalarInput {
    const KIND: VariableKind = VariableKind::Input;

    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, set: &mut VariableSet) -> Result<(), KernelError> {
        set.insert_input(signal_entry(&self.name, Shape::Scalar))
    }
}

/// Multi-channel input.
#[derive(Clone, Debug)]
pub struct VectorInput {
    name: Arc<str>,
    size: VectorSize,
}

impl VectorInput {
    pub fn new(name: impl Into<String>, size: impl Into<VectorSize>) -> Self {
        Self {
            name: Arc::from(name.into()),
            size: size.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// View of channel `index`.
    pub fn element(&self, index: usize) -> InputElement {
        InputElement {
            vector: Arc::clone(&self.name),
            index,
        }
    }
}

impl SignalVariable for VectorInput {
    type Kind = InputKind;

    fn name(&self) -> &str {
        &self.name
    }
}

impl VectorVariable for VectorInput {
    fn size(&self) -> &VectorSize {
        &self.size
    }
}

impl Declare for VectorInput {
    const KIND: VariableKind = VariableKind::Input;

    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, set: &mut VariableSet) -> Result<(), KernelError> {
        set.insert_input(signal_entry(&self.name, Shape::Vector(self.size.clone())))
    }
}

/// One channel of a [`VectorInput`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputElement {
    vector: Arc<str>,
    index: usize,
}

impl ElementVariable for InputElement {
    type Kind = InputKind;

    fn vector_name(&self) -> &str {
        &self.vector
    }

    fn index(&self) -> usize {
        self.index
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Outputs
// ────────────────────────────────────────────────────────────────────────────

/// Single-channel output.
#[derive(Clone, Debug)]
pub struct ScalarOutput {
    name: Arc<str>,
    initializer: OutputInitializer,
}

impl ScalarOutput {
    /// Declare an output that starts [`Signal::Unset`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            initializer: OutputInitializer::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start the output at `signal`.
    pub fn initially(self, signal: Signal) -> Self {
        Self {
            initializer: OutputInitializer::Uniform(signal),
            ..self
        }
    }

    /// Start the output at a value computed from the initialization scope.
    pub fn initialized_with(
        self,
        f: impl Fn(&InitScope<'_>) -> Signal + Send + Sync + 'static,
    ) -> Self {
        Self {
            initializer: OutputInitializer::per_index(move |scope, _| f(scope)),
            ..self
        }
    }
}

impl SignalVariable for ScalarOutput {
    type Kind = OutputKind;

    fn name(&self) -> &str {
        &self.name
    }
}

impl ScalarVariable for ScalarOutput {}

impl Declare for ScalarOutput {
    const KIND: VariableKind = VariableKind::Output;

    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, set: &mut VariableSet) -> Result<(), KernelError> {
        set.insert_output(output_entry(&self.name, Shape::Scalar, self.initializer.clone()))
    }
}

/// Multi-channel output.
#[derive(Clone, Debug)]
pub struct VectorOutput {
    name: Arc<str>,
    size: VectorSize,
    initializer: OutputInitializer,
}

impl VectorOutput {
    pub fn new(name: impl Into<String>, size: impl Into<VectorSize>) -> Self {
        Self {
            name: Arc::from(name.into()),
            size: size.into(),
            initializer: OutputInitializer::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initialized(self, initializer: OutputInitializer) -> Self {
        Self {
            initializer,
            ..self
        }
    }

    /// View of channel `index`.
    pub fn element(&self, index: usize) -> OutputElement {
        OutputElement {
            vector: Arc::clone(&self.name),
            index,
        }
    }
}

impl SignalVariable for VectorOutput {
    type Kind = OutputKind;

    fn name(&self) -> &str {
        &self.name
    }
}

impl VectorVariable for VectorOutput {
    fn size(&self) -> &VectorSize {
        &self.size
    }
}

impl Declare for VectorOutput {
    const KIND: VariableKind = VariableKind::Output;

    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, set: &mut VariableSet) -> Result<(), KernelError> {
        set.insert_output(output_entry(
            &self.name,
            Shape::Vector(self.size.clone()),
            self.initializer.clone(),
        ))
    }
}

/// One channel of a [`VectorOutput`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputElement {
    vector: Arc<str>,
    index: usize,
}

impl ElementVariable for OutputElement {
    type Kind = OutputKind;

    fn vector_name(&self) -> &str {
        &self.vector
    }

    fn index(&self) -> usize {
        self.index
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

fn check_type<T: VariableValue>(name: &str, value: &AnyValue) -> Result<(), KernelError> {
    if value.is::<T>() {
        Ok(())
    } else {
        Err(KernelError::InvalidType {
            name: name.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            actual: value.type_name().to_string(),
        })
    }
}

fn check_constraint<T: ConfigValue>(
    name: &str,
    constraint: &Constraint<T>,
    value: &T,
) -> Result<(), KernelError> {
    if constraint.test(value) {
        Ok(())
    } else {
        Err(KernelError::ConstraintViolation {
            name: name.to_string(),
            value: format!("{value:?}"),
            constraint: constraint.to_string(),
        })
    }
}

fn check_config<T: ConfigValue>(
    name: &str,
    constraint: &Constraint<T>,
    value: &AnyValue,
) -> Result<(), KernelError> {
    check_type::<T>(name, value)?;
    match value.downcast_ref::<T>() {
        Some(v) => check_constraint(name, constraint, v),
        None => Ok(()),
    }
}

fn signal_entry(name: &Arc<str>, shape: Shape) -> SchemaEntry<InputKind> {
    SchemaEntry::<InputKind>::new(
        Arc::clone(name),
        std::any::type_name::<Signal>(),
        Arc::new(|_: &Vec<Signal>| -> Result<(), KernelError> { Ok(()) }),
        shape,
    )
}

fn output_entry(
    name: &Arc<str>,
    shape: Shape,
    initializer: OutputInitializer,
) -> SchemaEntry<OutputKind> {
    SchemaEntry::<OutputKind>::new(
        Arc::clone(name),
        std::any::type_name::<Signal>(),
        Arc::new(|_: &Vec<Signal>| -> Result<(), KernelError> { Ok(()) }),
        OutputSpec { shape, initializer },
    )
}
