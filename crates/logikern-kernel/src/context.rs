//! Hook contexts – the views a kernel's hooks get onto the variables of the
//! stage they run in.
//!
//! | Context | Reads | Writes |
//! |---|---|---|
//! | [`SettingScope`] | parameters, vector sizes | – |
//! | [`InitScope`] | parameters, settings, vector sizes | – |
//! | [`ConfigurationContext`] | parameters, vector sizes | declarations, vector sizes |
//! | [`InitializationContext`] | parameters, settings, vector sizes | fields, outputs (once each) |
//! | [`UpdateContext`] | parameters, settings, vector sizes, fields, inputs | fields, outputs |
//!
//! Reads through a handle that is not declared for the stage are programmer
//! errors and panic; writes made during configuration and initialization
//! return [`KernelError`].

use std::collections::{BTreeMap, BTreeSet};

use logikern_types::{Id, KernelError, Signal, VariableKind};

use crate::provider::{
    FieldPatch, FieldState, InputState, OutputPatch, OutputState, ParameterStorage,
    PartialProvider, SettingStorage, VectorSizeStorage,
};
use crate::schema::{InputKind, OutputKind, VariableSet};
use crate::value::{ConfigValue, VariableValue};
use crate::variable::{
    Declare, ElementVariable, Field, Parameter, ScalarVariable, Setting, SignalVariable,
    VectorVariable,
};

// ────────────────────────────────────────────────────────────────────────────
// Initializer scopes
// ────────────────────────────────────────────────────────────────────────────

/// What a setting initializer may read.
#[derive(Clone, Copy)]
pub struct SettingScope<'a> {
    parameters: &'a ParameterStorage,
    sizes: &'a VectorSizeStorage,
}

impl<'a> SettingScope<'a> {
    pub(crate) fn new(parameters: &'a ParameterStorage, sizes: &'a VectorSizeStorage) -> Self {
        Self { parameters, sizes }
    }

    pub fn parameter<T: ConfigValue>(&self, parameter: &Parameter<T>) -> &'a T {
        self.parameters.get(parameter)
    }

    pub fn vector_size<V: VectorVariable + ?Sized>(&self, vector: &V) -> usize {
        self.sizes.size_of(vector)
    }
}

/// What a field or output initializer may read.
#[derive(Clone, Copy)]
pub struct InitScope<'a> {
    parameters: &'a ParameterStorage,
    settings: &'a SettingStorage,
    sizes: &'a VectorSizeStorage,
}

impl<'a> InitScope<'a> {
    pub(crate) fn new(
        parameters: &'a ParameterStorage,
        settings: &'a SettingStorage,
        sizes: &'a VectorSizeStorage,
    ) -> Self {
        Self {
            parameters,
            settings,
            sizes,
        }
    }

    pub fn parameter<T: ConfigValue>(&self, parameter: &Parameter<T>) -> &'a T {
        self.parameters.get(parameter)
    }

    pub fn setting<T: ConfigValue>(&self, setting: &Setting<T>) -> &'a T {
        self.settings.get(setting)
    }

    pub fn vector_size<V: VectorVariable + ?Sized>(&self, vector: &V) -> usize {
        self.sizes.size_of(vector)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ConfigurationContext
// ────────────────────────────────────────────────────────────────────────────

/// Passed to a kernel's configuration hook while a variant is built.
///
/// The hook may add or drop inputs, outputs, settings and fields depending
/// on parameter values, and must assign the size of every
/// [`VectorSize::Deferred`][crate::variable::VectorSize::Deferred] vector.
pub struct ConfigurationContext<'a> {
    kernel_id: &'a Id,
    parameters: &'a ParameterStorage,
    variables: VariableSet,
    sizes: BTreeMap<String, usize>,
}

impl<'a> ConfigurationContext<'a> {
    pub(crate) fn new(
        kernel_id: &'a Id,
        parameters: &'a ParameterStorage,
        variables: VariableSet,
        sizes: BTreeMap<String, usize>,
    ) -> Self {
        Self {
            kernel_id,
            parameters,
            variables,
            sizes,
        }
    }

    pub fn kernel_id(&self) -> &Id {
        self.kernel_id
    }

    pub fn parameter<T: ConfigValue>(&self, parameter: &Parameter<T>) -> &'a T {
        self.parameters.get(parameter)
    }

    /// Declare a conditional setting, field, input or output.
    ///
    /// # Errors
    ///
    /// [`KernelError::WrongKind`] for a parameter (parameters are already
    /// resolved), [`KernelError::DuplicateVariable`] on a name collision.
    pub fn declare<D: Declare>(&mut self, variable: D) -> Result<D, KernelError> {
        if D::KIND == VariableKind::Parameter {
            return Err(KernelError::WrongKind {
                name: variable.name().to_string(),
                expected: VariableKind::Input,
                actual: VariableKind::Parameter,
            });
        }
        variable.register(&mut self.variables)?;
        Ok(variable)
    }

    /// Drop a statically declared setting, field, input or output from this
    /// variant.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownVariable`] for an undeclared name,
    /// [`KernelError::WrongKind`] for a parameter.
    pub fn exclude(&mut self, name: &str) -> Result<VariableKind, KernelError> {
        let kind = self.variables.remove(name)?;
        self.sizes.remove(name);
        Ok(kind)
    }

    /// Fix the width of `vector` for this variant.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownVariable`] when `vector` is not a declared
    /// vector input or output.
    pub fn set_vector_size<V: VectorVariable + ?Sized>(
        &mut self,
        vector: &V,
        size: usize,
    ) -> Result<(), KernelError> {
        let name = vector.name();
        if !self.variables.vectors().iter().any(|(n, _)| *n == name) {
            return Err(KernelError::UnknownVariable {
                kind: VariableKind::VectorSize,
                name: name.to_string(),
            });
        }
        self.sizes.insert(name.to_string(), size);
        Ok(())
    }

    /// Width of `vector` if already known.  Constant and parameter-driven
    /// sizes are resolved before the hook runs.
    pub fn vector_size<V: VectorVariable + ?Sized>(&self, vector: &V) -> Option<usize> {
        self.sizes.get(vector.name()).copied()
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.variables.contains(name)
    }

    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }

    pub(crate) fn into_parts(self) -> (VariableSet, BTreeMap<String, usize>) {
        (self.variables, self.sizes)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// InitializationContext
// ────────────────────────────────────────────────────────────────────────────

/// Passed to a kernel's initialization hook while an instance is built.
///
/// Fields and outputs arrive pre-filled from their initializers.  The hook
/// may assign each of them at most once.
pub struct InitializationContext<'a> {
    scope: InitScope<'a>,
    fields: FieldPatch,
    outputs: OutputPatch,
    assigned: BTreeSet<String>,
}

impl<'a> InitializationContext<'a> {
    pub(crate) fn new(scope: InitScope<'a>, fields: FieldPatch, outputs: OutputPatch) -> Self {
        Self {
            scope,
            fields,
            outputs,
            assigned: BTreeSet::new(),
        }
    }

    pub fn scope(&self) -> InitScope<'a> {
        self.scope
    }

    pub fn parameter<T: ConfigValue>(&self, parameter: &Parameter<T>) -> &'a T {
        self.scope.parameter(parameter)
    }

    pub fn setting<T: ConfigValue>(&self, setting: &Setting<T>) -> &'a T {
        self.scope.setting(setting)
    }

    pub fn vector_size<V: VectorVariable + ?Sized>(&self, vector: &V) -> usize {
        self.scope.vector_size(vector)
    }

    /// # Errors
    ///
    /// [`KernelError::AlreadyAssigned`] on a second assignment,
    /// [`KernelError::UnknownVariable`] for a field this variant does not
    /// declare.
    pub fn set_field<T: VariableValue>(&mut self, field: &Field<T>, value: T) -> Result<(), KernelError> {
        let name = field.name();
        self.ensure_unassigned(name)?;
        self.fields.set(field, value)?;
        self.assigned.insert(name.to_string());
        Ok(())
    }

    /// # Errors
    ///
    /// As for [`InitializationContext::set_outputs`].
    pub fn set_output<V>(&mut self, output: &V, signal: Signal) -> Result<(), KernelError>
    where
        V: ScalarVariable<Kind = OutputKind>,
    {
        self.set_outputs(output, &[signal])
    }

    /// # Errors
    ///
    /// [`KernelError::AlreadyAssigned`] on a second assignment,
    /// [`KernelError::ShapeMismatch`] when the width differs from the
    /// resolved size.
    pub fn set_outputs<V>(&mut self, output: &V, signals: &[Signal]) -> Result<(), KernelError>
    where
        V: SignalVariable<Kind = OutputKind> + ?Sized,
    {
        let name = output.name();
        self.ensure_unassigned(name)?;
        let element_prefix = format!("{name}[");
        if self.assigned.iter().any(|key| key.starts_with(&element_prefix)) {
            return Err(KernelError::AlreadyAssigned {
                name: name.to_string(),
            });
        }
        self.outputs.set_signals(output, signals)?;
        self.assigned.insert(name.to_string());
        Ok(())
    }

    /// # Errors
    ///
    /// [`KernelError::AlreadyAssigned`] when the channel (or the whole
    /// vector) was assigned before, [`KernelError::IndexOutOfRange`] for a bad
    /// index.
    pub fn set_output_at<E>(&mut self, element: &E, signal: Signal) -> Result<(), KernelError>
    where
        E: ElementVariable<Kind = OutputKind>,
    {
        let name = element.vector_name();
        self.ensure_unassigned(name)?;
        let key = format!("{name}[{}]", element.index());
        if self.assigned.contains(&key) {
            return Err(KernelError::AlreadyAssigned { name: key });
        }
        self.outputs.set_signal_at(element, signal)?;
        self.assigned.insert(key);
        Ok(())
    }

    fn ensure_unassigned(&self, name: &str) -> Result<(), KernelError> {
        if self.assigned.contains(name) {
            Err(KernelError::AlreadyAssigned {
                name: name.to_string(),
            })
        } else {
            Ok(())
        }
    }

    pub(crate) fn into_parts(self) -> (FieldPatch, OutputPatch) {
        (self.fields, self.outputs)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// UpdateContext
// ────────────────────────────────────────────────────────────────────────────

/// Passed to a kernel's update hook on every tick.
///
/// All accessors panic on an undeclared handle or a width mismatch; the
/// update hook has no error channel.
pub struct UpdateContext<'a> {
    parameters: &'a ParameterStorage,
    settings: &'a SettingStorage,
    sizes: &'a VectorSizeStorage,
    fields: &'a mut FieldState,
    inputs: &'a InputState,
    outputs: &'a mut OutputState,
}

impl<'a> UpdateContext<'a> {
    pub(crate) fn new(
        parameters: &'a ParameterStorage,
        settings: &'a SettingStorage,
        sizes: &'a VectorSizeStorage,
        fields: &'a mut FieldState,
        inputs: &'a InputState,
        outputs: &'a mut OutputState,
    ) -> Self {
        Self {
            parameters,
            settings,
            sizes,
            fields,
            inputs,
            outputs,
        }
    }

    pub fn parameter<T: ConfigValue>(&self, parameter: &Parameter<T>) -> &'a T {
        self.parameters.get(parameter)
    }

    pub fn setting<T: ConfigValue>(&self, setting: &Setting<T>) -> &'a T {
        self.settings.get(setting)
    }

    pub fn vector_size<V: VectorVariable + ?Sized>(&self, vector: &V) -> usize {
        self.sizes.size_of(vector)
    }

    pub fn field<T: VariableValue>(&self, field: &Field<T>) -> &T {
        contract(self.fields.get(field))
    }

    pub fn field_mut<T: VariableValue>(&mut self, field: &Field<T>) -> &mut T {
        self.fields.value_mut(field)
    }

    pub fn set_field<T: VariableValue>(&mut self, field: &Field<T>, value: T) {
        contract(self.fields.set(field, value));
    }

    pub fn input<V>(&self, input: &V) -> Signal
    where
        V: ScalarVariable<Kind = InputKind>,
    {
        self.inputs.signal(input)
    }

    pub fn inputs<V>(&self, input: &V) -> &[Signal]
    where
        V: SignalVariable<Kind = InputKind> + ?Sized,
    {
        self.inputs.signals(input)
    }

    pub fn input_at<E>(&self, element: &E) -> Signal
    where
        E: ElementVariable<Kind = InputKind>,
    {
        self.inputs.signal_at(element)
    }

    /// `true` when the variant declares an input called `name`.  Useful for
    /// conditionally declared inputs.
    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.schema().contains(name)
    }

    /// Current (previous tick's) value of a scalar output.
    pub fn output<V>(&self, output: &V) -> Signal
    where
        V: ScalarVariable<Kind = OutputKind>,
    {
        self.outputs.signal(output)
    }

    pub fn set_output<V>(&mut self, output: &V, signal: Signal)
    where
        V: ScalarVariable<Kind = OutputKind>,
    {
        contract(self.outputs.set_signal(output, signal));
    }

    pub fn set_outputs<V>(&mut self, output: &V, signals: &[Signal])
    where
        V: SignalVariable<Kind = OutputKind> + ?Sized,
    {
        contract(self.outputs.set_signals(output, signals));
    }

    pub fn set_output_at<E>(&mut self, element: &E, signal: Signal)
    where
        E: ElementVariable<Kind = OutputKind>,
    {
        contract(self.outputs.set_signal_at(element, signal));
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.schema().contains(name)
    }
}

fn contract<T>(result: Result<T, KernelError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("kernel update broke its declaration: {err}"),
    }
}
