//! [`KernelState`] – the mutable per-tick values of one simulated component.
//!
//! A driver runs each tick the same way:
//!
//! 1. [`KernelState::reset_inputs`], then merge every driven value with the
//!    `drive_*` methods ([`Signal::merge`] resolves multiple drivers),
//! 2. [`KernelState::update`],
//! 3. read the outputs.
//!
//! Cloning a state is a checkpoint: the clone shares the instance but owns
//! its own copies of the field, input and output values.

use std::collections::BTreeMap;

use logikern_types::{KernelError, Signal};

use crate::context::UpdateContext;
use crate::instance::KernelInstance;
use crate::kernel::{Kernel, KernelStage};
use crate::provider::{FieldState, InputState, OutputState, PartialProvider};
use crate::schema::{InputKind, OutputKind};
use crate::value::VariableValue;
use crate::variable::{ElementVariable, Field, ScalarVariable, Shape, SignalVariable};
use crate::variant::KernelVariant;

#[derive(Clone, Debug)]
pub struct KernelState {
    instance: KernelInstance,
    fields: FieldState,
    inputs: InputState,
    outputs: OutputState,
    ticks: u64,
}

impl KernelState {
    pub(crate) fn new(instance: KernelInstance) -> Self {
        let fields = instance.initial_fields().mutable_copy();
        let outputs = instance.initial_outputs().mutable_copy();
        let inputs = unset_inputs(instance.variant());
        Self {
            instance,
            fields,
            inputs,
            outputs,
            ticks: 0,
        }
    }

    pub fn instance(&self) -> &KernelInstance {
        &self.instance
    }

    pub fn variant(&self) -> &KernelVariant {
        self.instance.variant()
    }

    pub fn kernel(&self) -> &Kernel {
        self.instance.kernel()
    }

    pub fn stage(&self) -> KernelStage {
        KernelStage::Running
    }

    /// Number of updates since creation or the last [`KernelState::reset`].
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn fields(&self) -> &FieldState {
        &self.fields
    }

    pub fn inputs(&self) -> &InputState {
        &self.inputs
    }

    pub fn outputs(&self) -> &OutputState {
        &self.outputs
    }

    /// # Panics
    ///
    /// When `field` is not declared by this state's variant.
    pub fn field<T: VariableValue>(&self, field: &Field<T>) -> &T {
        match self.fields.get(field) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    // ── Inputs ──────────────────────────────────────────────────────────────

    /// Set every input channel back to [`Signal::Unset`].
    pub fn reset_inputs(&mut self) {
        self.inputs.reset();
    }

    /// Merge `signal` into a scalar input.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownVariable`] when the variant does not declare the
    /// input.
    pub fn drive_input<V>(&mut self, input: &V, signal: Signal) -> Result<(), KernelError>
    where
        V: ScalarVariable<Kind = InputKind>,
    {
        self.inputs.merge_signal(input, signal)
    }

    /// Merge `signals` into an input.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownVariable`] or [`KernelError::ShapeMismatch`].
    pub fn drive_inputs<V>(&mut self, input: &V, signals: &[Signal]) -> Result<(), KernelError>
    where
        V: SignalVariable<Kind = InputKind> + ?Sized,
    {
        self.inputs.merge_signals(input, signals)
    }

    /// Merge `signal` into one channel of a vector input.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownVariable`] or [`KernelError::IndexOutOfRange`].
    pub fn drive_input_at<E>(&mut self, element: &E, signal: Signal) -> Result<(), KernelError>
    where
        E: ElementVariable<Kind = InputKind>,
    {
        self.inputs.merge_signal_at(element, signal)
    }

    /// Merge `signals` into the input called `name`, for drivers that only
    /// know names.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownVariable`] or [`KernelError::ShapeMismatch`].
    pub fn drive(&mut self, name: &str, signals: &[Signal]) -> Result<(), KernelError> {
        self.inputs.merge_channels(name, signals)
    }

    // ── Update ──────────────────────────────────────────────────────────────

    /// Run the kernel's update hook once.
    ///
    /// # Panics
    ///
    /// When the hook breaks its own declaration (undeclared handle or width
    /// mismatch).
    pub fn update(&mut self) {
        let kernel = self.instance.kernel().clone();
        kernel.update_kernel(self);
    }

    pub(crate) fn apply_update(&mut self, hook: impl FnOnce(&mut UpdateContext<'_>)) {
        let instance = &self.instance;
        let variant = instance.variant();
        let mut ctx = UpdateContext::new(
            variant.parameters(),
            instance.settings(),
            variant.sizes(),
            &mut self.fields,
            &self.inputs,
            &mut self.outputs,
        );
        hook(&mut ctx);
        self.ticks += 1;
    }

    // ── Outputs ─────────────────────────────────────────────────────────────

    pub fn output<V>(&self, output: &V) -> Signal
    where
        V: ScalarVariable<Kind = OutputKind>,
    {
        self.outputs.signal(output)
    }

    pub fn outputs_of<V>(&self, output: &V) -> &[Signal]
    where
        V: SignalVariable<Kind = OutputKind> + ?Sized,
    {
        self.outputs.signals(output)
    }

    pub fn output_at<E>(&self, element: &E) -> Signal
    where
        E: ElementVariable<Kind = OutputKind>,
    {
        self.outputs.signal_at(element)
    }

    /// Channels of the output called `name`, if declared.
    pub fn output_channels(&self, name: &str) -> Option<&[Signal]> {
        self.outputs.channels(name)
    }

    /// Every output by name, in declaration order.
    pub fn output_snapshot(&self) -> BTreeMap<String, Vec<Signal>> {
        self.outputs
            .present()
            .into_iter()
            .map(|(name, signals)| (name.to_string(), signals.clone()))
            .collect()
    }

    /// Return to the instance's initial fields and outputs with all inputs
    /// unset.
    pub fn reset(&mut self) {
        self.fields = self.instance.initial_fields().mutable_copy();
        self.outputs = self.instance.initial_outputs().mutable_copy();
        self.inputs.reset();
        self.ticks = 0;
    }
}

fn unset_inputs(variant: &KernelVariant) -> InputState {
    let schema = variant.variables().inputs();
    let values = schema
        .entries()
        .iter()
        .map(|entry| {
            let width = match entry.init() {
                Shape::Scalar => 1,
                Shape::Vector(_) => variant.sizes().size(entry.name()).unwrap_or(0),
            };
            (entry.name().to_string(), vec![Signal::Unset; width])
        })
        .collect();
    InputState::from_trusted(std::sync::Arc::clone(schema), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::KernelTemplateExt;
    use crate::variable::{Parameter, ScalarInput, ScalarOutput, VectorInput, VectorOutput};

    /// Counts rising edges of `clk` and mirrors `data` inverted onto `out`.
    fn edge_counter() -> (Kernel, ScalarInput, VectorInput, VectorOutput, Field<u32>) {
        let mut builder = Kernel::builder("test:edges");
        let width = builder.declare(Parameter::new("width", 2_i64));
        let clk = builder.declare(ScalarInput::new("clk"));
        let data = builder.declare(VectorInput::new("data", &width));
        let out = builder.declare(VectorOutput::new("out", &width));
        let last = builder.declare(Field::new("last", Signal::Unset));
        let edges = builder.declare(Field::new("edges", 0_u32));
        let (c, d, o, e) = (clk.clone(), data.clone(), out.clone(), edges.clone());
        builder.on_update(move |ctx| {
            let level = ctx.input(&c);
            if *ctx.field(&last) == Signal::False && level == Signal::True {
                *ctx.field_mut(&e) += 1;
            }
            ctx.set_field(&last, level);
            let inverted: Vec<Signal> = ctx.inputs(&d).iter().map(|s| !*s).collect();
            ctx.set_outputs(&o, &inverted);
        });
        (builder.build().unwrap(), clk, data, out, edges)
    }

    #[test]
    fn inputs_start_unset_with_resolved_width() {
        let (kernel, clk, data, _, _) = edge_counter();
        let state = kernel.default_variant().unwrap().default_instance().unwrap().create_state();
        assert_eq!(state.inputs().signal(&clk), Signal::Unset);
        assert_eq!(state.inputs().signals(&data), &[Signal::Unset; 2]);
        assert_eq!(state.stage(), KernelStage::Running);
    }

    #[test]
    fn update_reads_inputs_and_writes_outputs() {
        let (kernel, clk, data, out, edges) = edge_counter();
        let mut state = kernel.default_variant().unwrap().default_instance().unwrap().create_state();
        for level in [Signal::False, Signal::True, Signal::False, Signal::True] {
            state.reset_inputs();
            state.drive_input(&clk, level).unwrap();
            state.drive_inputs(&data, &[Signal::True, Signal::False]).unwrap();
            state.update();
        }
        assert_eq!(*state.field(&edges), 2);
        assert_eq!(state.outputs_of(&out), &[Signal::False, Signal::True]);
        assert_eq!(state.output_at(&out.element(1)), Signal::True);
        assert_eq!(state.ticks(), 4);
    }

    #[test]
    fn multiple_drivers_merge() {
        let (kernel, clk, data, _, _) = edge_counter();
        let mut state = kernel.default_variant().unwrap().default_instance().unwrap().create_state();
        state.drive_input(&clk, Signal::True).unwrap();
        state.drive_input(&clk, Signal::False).unwrap();
        assert_eq!(state.inputs().signal(&clk), Signal::Conflict);
        state.drive_input_at(&data.element(0), Signal::True).unwrap();
        state.drive("data", &[Signal::True, Signal::True]).unwrap();
        assert_eq!(state.inputs().signals(&data), &[Signal::True, Signal::True]);
        assert!(matches!(
            state.drive("data", &[Signal::True]),
            Err(KernelError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            state.drive("ghost", &[Signal::True]),
            Err(KernelError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn clone_is_an_independent_checkpoint() {
        let (kernel, clk, _, _, edges) = edge_counter();
        let mut state = kernel.default_variant().unwrap().default_instance().unwrap().create_state();
        for level in [Signal::False, Signal::True] {
            state.reset_inputs();
            state.drive_input(&clk, level).unwrap();
            state.update();
        }
        let checkpoint = state.clone();
        for level in [Signal::False, Signal::True] {
            state.reset_inputs();
            state.drive_input(&clk, level).unwrap();
            state.update();
        }
        assert_eq!(*state.field(&edges), 2);
        assert_eq!(*checkpoint.field(&edges), 1);
        assert_eq!(checkpoint.ticks(), 2);
    }

    #[test]
    fn reset_restores_initial_values() {
        let (kernel, clk, _, out, edges) = edge_counter();
        let mut state = kernel.default_variant().unwrap().default_instance().unwrap().create_state();
        state.drive_input(&clk, Signal::False).unwrap();
        state.update();
        state.reset_inputs();
        state.drive_input(&clk, Signal::True).unwrap();
        state.update();
        state.reset();
        assert_eq!(*state.field(&edges), 0);
        assert_eq!(state.outputs_of(&out), &[Signal::Unset; 2]);
        assert_eq!(state.inputs().signal(&clk), Signal::Unset);
        assert_eq!(state.ticks(), 0);
    }

    #[test]
    #[should_panic(expected = "kernel update broke its declaration")]
    fn wrong_width_write_panics() {
        let mut builder = Kernel::builder("test:bad-width");
        let out = builder.declare(VectorOutput::new("out", 2));
        builder.on_update(move |ctx| ctx.set_outputs(&out, &[Signal::True]));
        let kernel = builder.build().unwrap();
        let mut state = kernel.default_variant().unwrap().default_instance().unwrap().create_state();
        state.update();
    }

    #[test]
    fn output_snapshot_lists_every_output() {
        let mut builder = Kernel::builder("test:snapshot");
        builder.declare(ScalarOutput::new("a").initially(Signal::True));
        builder.declare(VectorOutput::new("b", 2));
        let kernel = builder.build().unwrap();
        let state = kernel.default_variant().unwrap().default_instance().unwrap().create_state();
        let snapshot = state.output_snapshot();
        assert_eq!(snapshot["a"], vec![Signal::True]);
        assert_eq!(snapshot["b"], vec![Signal::Unset, Signal::Unset]);
        assert_eq!(state.output_channels("a"), Some(&[Signal::True][..]));
    }
}
