//! [`buffer`] and [`not`] – channel-wise unary kernels.

use logikern_kernel::prelude::*;

pub const BUFFER: &str = "logic:buffer";
pub const NOT: &str = "logic:not";

/// Handles of a unary kernel.
#[derive(Clone, Debug)]
pub struct UnaryKernel {
    pub kernel: Kernel,
    /// Number of channels on `in` and `out`.
    pub width: Parameter<i64>,
    pub input: VectorInput,
    pub out: VectorOutput,
}

/// Copies `in` to `out`, undriven channels included.
///
/// # Errors
///
/// Only if the declarations are inconsistent.
pub fn buffer() -> Result<UnaryKernel, KernelError> {
    unary(BUFFER, "1", false)
}

/// Inverts every driven channel of `in`.
///
/// # Errors
///
/// Only if the declarations are inconsistent.
pub fn not() -> Result<UnaryKernel, KernelError> {
    unary(NOT, "1o", true)
}

fn unary(id: &str, symbol: &str, invert: bool) -> Result<UnaryKernel, KernelError> {
    let mut builder = Kernel::builder(id);
    builder.tag(crate::GATE_TAG).property(crate::SYMBOL_PROPERTY, symbol);
    let width = builder.declare(Parameter::new("width", 1_i64).constrained(Constraint::Min(1)));
    let input = builder.declare(VectorInput::new("in", &width));
    let out = builder.declare(VectorOutput::new("out", &width));

    let (i, o) = (input.clone(), out.clone());
    builder.on_update(move |ctx| {
        let signals: Vec<Signal> = ctx
            .inputs(&i)
            .iter()
            .map(|s| if invert { !*s } else { *s })
            .collect();
        ctx.set_outputs(&o, &signals);
    });

    Ok(UnaryKernel {
        kernel: builder.build()?,
        width,
        input,
        out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(unary: &UnaryKernel, signals: &[Signal]) -> Vec<Signal> {
        let width = signals.len() as i64;
        let mut state = unary
            .kernel
            .create_variant(|p| p.set(&unary.width, width))
            .unwrap()
            .default_instance()
            .unwrap()
            .create_state();
        state.drive_inputs(&unary.input, signals).unwrap();
        state.update();
        state.outputs_of(&unary.out).to_vec()
    }

    #[test]
    fn buffer_passes_every_level() {
        let levels = [Signal::True, Signal::False, Signal::Unset, Signal::Conflict];
        assert_eq!(run(&buffer().unwrap(), &levels), levels.to_vec());
    }

    #[test]
    fn not_inverts_driven_levels_only() {
        let levels = [Signal::True, Signal::False, Signal::Unset, Signal::Conflict];
        assert_eq!(
            run(&not().unwrap(), &levels),
            vec![Signal::False, Signal::True, Signal::Unset, Signal::Conflict]
        );
    }

    #[test]
    fn zero_width_is_rejected() {
        let b = buffer().unwrap();
        assert!(b.kernel.create_variant(|p| p.set(&b.width, 0)).is_err());
    }
}
