//! The n-input [`gate`] family and its fixed-arity specializations.
//!
//! A gate with `inputs = n` and `width = w` has a single packed input `in`
//! of `n * w` channels: input `k` occupies channels `k*w .. (k+1)*w`.  Bit
//! `b` of `out` reduces bit `b` of every input.
//!
//! Evaluation is four-valued.  A dominant level decides the result even if
//! other inputs are undriven (`0` for AND, `1` for OR); otherwise any
//! conflict yields a conflict and any undriven input yields unset.

use std::fmt;
use std::sync::Arc;

use logikern_kernel::prelude::*;

/// Boolean reduction performed by a [`gate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateOp {
    And,
    Or,
    Nand,
    Nor,
    Xor,
    Xnor,
}

impl GateOp {
    pub const ALL: [GateOp; 6] = [
        GateOp::And,
        GateOp::Or,
        GateOp::Nand,
        GateOp::Nor,
        GateOp::Xor,
        GateOp::Xnor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GateOp::And => "and",
            GateOp::Or => "or",
            GateOp::Nand => "nand",
            GateOp::Nor => "nor",
            GateOp::Xor => "xor",
            GateOp::Xnor => "xnor",
        }
    }

    /// Registry id of the n-input kernel, e.g. `logic:nand`.
    pub fn id(self) -> Id {
        Id::new(format!("logic:{}", self.name()))
    }

    /// Registry id of the specialization with `inputs` inputs, e.g.
    /// `logic:nand2`.
    pub fn fixed_id(self, inputs: u32) -> Id {
        Id::new(format!("logic:{}{inputs}", self.name()))
    }

    fn symbol(self) -> &'static str {
        match self {
            GateOp::And => "&",
            GateOp::Or => ">=1",
            GateOp::Nand => "&o",
            GateOp::Nor => ">=1o",
            GateOp::Xor => "=1",
            GateOp::Xnor => "=1o",
        }
    }

    fn inverted(self) -> bool {
        matches!(self, GateOp::Nand | GateOp::Nor | GateOp::Xnor)
    }

    /// Reduce `signals` to one level.
    pub fn evaluate(self, signals: &[Signal]) -> Signal {
        let dominant = match self {
            GateOp::And | GateOp::Nand => Some(Signal::False),
            GateOp::Or | GateOp::Nor => Some(Signal::True),
            GateOp::Xor | GateOp::Xnor => None,
        };
        let base = match dominant {
            Some(level) if signals.contains(&level) => level,
            _ if signals.contains(&Signal::Conflict) => Signal::Conflict,
            _ if signals.contains(&Signal::Unset) => Signal::Unset,
            _ => {
                let high = signals.iter().filter(|s| **s == Signal::True).count();
                match self {
                    GateOp::And | GateOp::Nand => Signal::from_bool(high == signals.len()),
                    GateOp::Or | GateOp::Nor => Signal::from_bool(high > 0),
                    GateOp::Xor | GateOp::Xnor => Signal::from_bool(high % 2 == 1),
                }
            }
        };
        if self.inverted() { !base } else { base }
    }
}

impl fmt::Display for GateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Upper bound of the `inputs` parameter.
pub const MAX_INPUTS: i64 = 64;
/// Upper bound of the `width` parameter.
pub const MAX_WIDTH: i64 = 64;

/// Handles of a [`gate`] kernel.
#[derive(Clone, Debug)]
pub struct GateKernel {
    pub kernel: Kernel,
    pub op: GateOp,
    /// Number of inputs, 2 to [`MAX_INPUTS`].
    pub inputs: Parameter<i64>,
    /// Bits per input and of `out`, 1 to [`MAX_WIDTH`].
    pub width: Parameter<i64>,
    /// Packed inputs; sized `inputs * width` when the variant is configured.
    pub input: VectorInput,
    pub out: VectorOutput,
}

impl GateKernel {
    /// Element `bit` of input `index` within the packed `in` vector.
    pub fn input_bit(&self, width: usize, index: usize, bit: usize) -> InputElement {
        self.input.element(index * width + bit)
    }
}

/// Declare the n-input gate computing `op`.
///
/// # Errors
///
/// Propagates [`KernelBuilder::build`] failures.
pub fn gate(op: GateOp) -> Result<GateKernel, KernelError> {
    let mut builder = Kernel::builder(op.id());
    builder.tag(crate::GATE_TAG).property(crate::SYMBOL_PROPERTY, op.symbol());
    let inputs = builder
        .declare(Parameter::new("inputs", 2_i64).constrained(Constraint::range(2, MAX_INPUTS)));
    let width = builder
        .declare(Parameter::new("width", 1_i64).constrained(Constraint::range(1, MAX_WIDTH)));
    let input = builder.declare(VectorInput::new("in", VectorSize::Deferred));
    let out = builder.declare(VectorOutput::new("out", &width));

    let (n, w, i) = (inputs.clone(), width.clone(), input.clone());
    builder.on_configuration(move |ctx| {
        let count = *ctx.parameter(&n);
        let packed = count
            .checked_mul(*ctx.parameter(&w))
            .ok_or(KernelError::InvalidVectorSize {
                name: "in".to_string(),
                size: count,
            })?;
        ctx.set_vector_size(&i, crate::channel_count("in", packed)?)
    });

    let (i, o) = (input.clone(), out.clone());
    builder.on_update(move |ctx| {
        let bits = ctx.vector_size(&o);
        let packed = ctx.inputs(&i);
        let reduced: Vec<Signal> = (0..bits)
            .map(|bit| {
                let column: Vec<Signal> = packed.iter().skip(bit).step_by(bits).copied().collect();
                op.evaluate(&column)
            })
            .collect();
        ctx.set_outputs(&o, &reduced);
    });

    Ok(GateKernel {
        kernel: builder.build()?,
        op,
        inputs,
        width,
        input,
        out,
    })
}

/// `op` with the number of inputs bound to `inputs`, registered as
/// [`GateOp::fixed_id`].  Only `width` remains configurable.
///
/// # Errors
///
/// [`KernelError::ConstraintViolation`] when `inputs` is outside 2 to
/// [`MAX_INPUTS`].
pub fn fixed_gate(op: GateOp, inputs: u32) -> Result<SpecializedKernel, KernelError> {
    let base = gate(op)?;
    let special = SpecializedKernel::from_template(Arc::new(base.kernel), |patch| {
        patch.set(&base.inputs, i64::from(inputs))
    })?;
    Ok(special.with_id(op.fixed_id(inputs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use logikern_types::Signal::{Conflict as X, False as F, True as T, Unset as U};

    #[test]
    fn truth_tables() {
        let cases = [
            (GateOp::And, [F, F, F, T]),
            (GateOp::Or, [F, T, T, T]),
            (GateOp::Nand, [T, T, T, F]),
            (GateOp::Nor, [T, F, F, F]),
            (GateOp::Xor, [F, T, T, F]),
            (GateOp::Xnor, [T, F, F, T]),
        ];
        let rows = [[F, F], [F, T], [T, F], [T, T]];
        for (op, expected) in cases {
            for (row, out) in rows.iter().zip(expected) {
                assert_eq!(op.evaluate(row), out, "{op} {row:?}");
            }
        }
    }

    #[test]
    fn dominant_level_beats_undriven_inputs() {
        assert_eq!(GateOp::And.evaluate(&[F, U]), F);
        assert_eq!(GateOp::Nand.evaluate(&[X, F]), T);
        assert_eq!(GateOp::Or.evaluate(&[U, T]), T);
        assert_eq!(GateOp::And.evaluate(&[T, U]), U);
        assert_eq!(GateOp::Or.evaluate(&[F, X, U]), X);
        assert_eq!(GateOp::Xor.evaluate(&[T, U]), U);
    }

    #[test]
    fn packed_input_sized_from_parameters() {
        let g = gate(GateOp::And).unwrap();
        let variant = g
            .kernel
            .create_variant(|p| {
                p.set(&g.inputs, 3)?;
                p.set(&g.width, 2)
            })
            .unwrap();
        assert_eq!(variant.vector_size(&g.input), 6);
        assert_eq!(variant.vector_size(&g.out), 2);
    }

    #[test]
    fn wide_gate_reduces_per_bit() {
        let g = gate(GateOp::Or).unwrap();
        let mut state = g
            .kernel
            .create_variant(|p| p.set(&g.width, 2))
            .unwrap()
            .default_instance()
            .unwrap()
            .create_state();
        // input 0 = 01, input 1 = ?0 (bit 0 first)
        state.drive_inputs(&g.input, &[T, F, F, U]).unwrap();
        state.update();
        assert_eq!(state.outputs_of(&g.out), &[T, U]);

        state.drive_input_at(&g.input_bit(2, 1, 1), T).unwrap();
        state.update();
        assert_eq!(state.outputs_of(&g.out), &[T, T]);
    }

    #[test]
    fn single_input_gate_is_rejected() {
        let g = gate(GateOp::Xor).unwrap();
        assert!(matches!(
            g.kernel.create_variant(|p| p.set(&g.inputs, 1)),
            Err(KernelError::ConstraintViolation { ref name, .. }) if name == "inputs"
        ));
    }

    #[test]
    fn oversized_gate_is_rejected_without_overflow() {
        let g = gate(GateOp::And).unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            g.kernel.create_variant(|p| {
                p.set(&g.inputs, i64::MAX)?;
                p.set(&g.width, 3)
            })
        }));
        assert!(matches!(
            result.expect("variant creation must not panic"),
            Err(KernelError::ConstraintViolation { ref name, .. }) if name == "inputs"
        ));
        assert!(matches!(
            g.kernel.create_variant(|p| p.set(&g.width, MAX_WIDTH + 1)),
            Err(KernelError::ConstraintViolation { ref name, .. }) if name == "width"
        ));
    }

    #[test]
    fn largest_gate_is_sized() {
        let g = gate(GateOp::Xor).unwrap();
        let variant = g
            .kernel
            .create_variant(|p| {
                p.set(&g.inputs, MAX_INPUTS)?;
                p.set(&g.width, MAX_WIDTH)
            })
            .unwrap();
        assert_eq!(variant.vector_size(&g.input), 64 * 64);
    }

    #[test]
    fn fixed_gate_hides_input_count() {
        let and2 = fixed_gate(GateOp::And, 2).unwrap();
        assert_eq!(and2.id().as_str(), "logic:and2");
        assert!(and2.has_tag(crate::GATE_TAG));
        assert!(
            and2.variables()
                .infos()
                .iter()
                .all(|info| info.name != "inputs")
        );
        let variant = and2.default_variant().unwrap();
        assert_eq!(variant.template_id().as_str(), "logic:and2");
        assert_eq!(variant.sizes().size("in"), Some(2));
    }

    #[test]
    fn fixed_gate_rejects_invalid_arity() {
        assert!(matches!(
            fixed_gate(GateOp::Nor, 1),
            Err(KernelError::ConstraintViolation { .. })
        ));
    }
}
