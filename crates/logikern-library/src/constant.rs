//! [`constant`] – a source driving a fixed word.

use logikern_kernel::prelude::*;

use crate::bits::{from_word, mask, word_bit};

pub const CONSTANT: &str = "logic:constant";

/// Handles of the [`constant`] kernel.
#[derive(Clone, Debug)]
pub struct ConstantKernel {
    pub kernel: Kernel,
    /// Bus width, 1 to 64.
    pub width: Parameter<i64>,
    /// Word driven on `out`; bits above `width` are ignored.
    pub value: Setting<u64>,
    pub out: VectorOutput,
}

/// Drives the `value` setting onto `out` from the first tick on.
///
/// # Errors
///
/// Propagates [`KernelBuilder::build`] failures.
pub fn constant() -> Result<ConstantKernel, KernelError> {
    let mut builder = Kernel::builder(CONSTANT);
    builder.tag(crate::SOURCE_TAG).property(crate::SYMBOL_PROPERTY, "K");
    let width = builder.declare(Parameter::new("width", 1_i64).constrained(Constraint::range(1, 64)));
    let value = builder.declare(Setting::new("value", 0_u64));
    let out = builder.declare(VectorOutput::new("out", &width).initialized({
        let value = value.clone();
        OutputInitializer::per_index(move |scope, bit| word_bit(*scope.setting(&value), bit))
    }));

    let (v, o) = (value.clone(), out.clone());
    builder.on_update(move |ctx| {
        let width = ctx.vector_size(&o);
        let word = *ctx.setting(&v) & mask(width);
        ctx.set_outputs(&o, &from_word(word, width));
    });

    Ok(ConstantKernel {
        kernel: builder.build()?,
        width,
        value,
        out,
    })
}
