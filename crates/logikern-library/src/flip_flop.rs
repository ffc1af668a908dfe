//! [`d_flip_flop`] – a rising-edge triggered register.

use logikern_kernel::prelude::*;

use crate::bits::{from_word, mask};

pub const D_FLIP_FLOP: &str = "logic:d_flip_flop";

/// Handles of the [`d_flip_flop`] kernel.
#[derive(Clone, Debug)]
pub struct FlipFlopKernel {
    pub kernel: Kernel,
    pub width: Parameter<i64>,
    /// Word `q` holds before the first capture.
    pub initial: Setting<u64>,
    /// Level of `clk` seen on the previous update.
    pub last_clock: Field<Signal>,
    pub d: VectorInput,
    pub clk: ScalarInput,
    /// Clear: while high, `q` is forced to zero on every update.
    pub reset: ScalarInput,
    pub q: VectorOutput,
}

/// Captures `d` into `q` when `clk` goes from `0` to `1`.
///
/// A transition out of an undriven or conflicting clock is not an edge.
///
/// # Errors
///
/// Propagates [`KernelBuilder::build`] failures.
pub fn d_flip_flop() -> Result<FlipFlopKernel, KernelError> {
    let mut builder = Kernel::builder(D_FLIP_FLOP);
    builder.tag(crate::SEQUENTIAL_TAG).property(crate::SYMBOL_PROPERTY, "D");
    let width = builder.declare(Parameter::new("width", 1_i64).constrained(Constraint::range(1, 64)));
    let initial = builder.declare(Setting::new("initial", 0_u64));
    let last_clock = builder.declare(Field::new("last_clock", Signal::Unset));
    let d = builder.declare(VectorInput::new("d", &width));
    let clk = builder.declare(ScalarInput::new("clk"));
    let reset = builder.declare(ScalarInput::new("reset"));
    let q = builder.declare(VectorOutput::new("q", &width).initialized({
        let initial = initial.clone();
        OutputInitializer::whole(move |scope, width| from_word(*scope.setting(&initial) & mask(width), width))
    }));

    let (last, d_in, c, r, q_out) = (last_clock.clone(), d.clone(), clk.clone(), reset.clone(), q.clone());
    builder.on_update(move |ctx| {
        let clock = ctx.input(&c);
        let rising = *ctx.field(&last) == Signal::False && clock == Signal::True;
        ctx.set_field(&last, clock);
        if ctx.input(&r) == Signal::True {
            let width = ctx.vector_size(&q_out);
            ctx.set_outputs(&q_out, &from_word(0, width));
        } else if rising {
            let captured = ctx.inputs(&d_in).to_vec();
            ctx.set_outputs(&q_out, &captured);
        }
    });

    Ok(FlipFlopKernel {
        kernel: builder.build()?,
        width,
        initial,
        last_clock,
        d,
        clk,
        reset,
        q,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use logikern_types::Signal::{False as F, True as T, Unset as U};

    fn register(width: i64, initial: u64) -> (FlipFlopKernel, KernelState) {
        let ff = d_flip_flop().unwrap();
        let state = ff
            .kernel
            .create_variant(|p| p.set(&ff.width, width))
            .unwrap()
            .create_instance(&[], |s| s.set(&ff.initial, initial))
            .unwrap()
            .create_state();
        (ff, state)
    }

    fn tick(ff: &FlipFlopKernel, state: &mut KernelState, clk: Signal, d: &[Signal]) {
        state.reset_inputs();
        state.drive_input(&ff.clk, clk).unwrap();
        state.drive_inputs(&ff.d, d).unwrap();
        state.update();
    }

    #[test]
    fn starts_from_initial_word() {
        let (ff, state) = register(3, 0b101);
        assert_eq!(state.outputs_of(&ff.q), &[T, F, T]);
    }

    #[test]
    fn captures_on_rising_edge_only() {
        let (ff, mut state) = register(2, 0);
        tick(&ff, &mut state, F, &[T, T]);
        assert_eq!(state.outputs_of(&ff.q), &[F, F]);
        tick(&ff, &mut state, T, &[T, F]);
        assert_eq!(state.outputs_of(&ff.q), &[T, F]);
        tick(&ff, &mut state, T, &[F, T]);
        assert_eq!(state.outputs_of(&ff.q), &[T, F]);
        tick(&ff, &mut state, F, &[F, T]);
        assert_eq!(state.outputs_of(&ff.q), &[T, F]);
        tick(&ff, &mut state, T, &[F, T]);
        assert_eq!(state.outputs_of(&ff.q), &[F, T]);
    }

    #[test]
    fn undriven_clock_is_not_an_edge() {
        let (ff, mut state) = register(1, 0);
        tick(&ff, &mut state, U, &[T]);
        tick(&ff, &mut state, T, &[T]);
        assert_eq!(state.outputs_of(&ff.q), &[F]);
        assert_eq!(*state.field(&ff.last_clock), T);
    }

    #[test]
    fn reset_clears_register() {
        let (ff, mut state) = register(2, 0b11);
        state.drive_input(&ff.reset, T).unwrap();
        state.update();
        assert_eq!(state.outputs_of(&ff.q), &[F, F]);
    }
}
