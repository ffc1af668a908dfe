//! [`memory`] – word-addressed RAM, and [`rom`], its read-only
//! specialization.
//!
//! `data_out` always shows the cell selected by `address`.  A writable
//! memory stores `data_in` into that cell on a rising edge of `clk` while
//! `write_enable` is high; the output reflects the write on the same update.
//! A read-only variant does not declare `data_in`, `clk` or `write_enable`
//! at all.

use std::sync::Arc;

use logikern_kernel::prelude::*;

use crate::bits::{from_word, mask, to_word};

pub const MEMORY: &str = "logic:memory";
pub const ROM: &str = "logic:rom";

/// Handles of the [`memory`] kernel.
#[derive(Clone, Debug)]
pub struct MemoryKernel {
    pub kernel: Kernel,
    /// Width of `address`; the memory has `2^address_bits` cells.
    pub address_bits: Parameter<i64>,
    /// Width of a cell.
    pub data_bits: Parameter<i64>,
    pub read_only: Parameter<bool>,
    /// Initial cell values from address 0 up; missing cells start at 0.
    pub contents: Setting<Vec<u64>>,
    pub cells: Field<Vec<u64>>,
    pub last_clock: Field<Signal>,
    pub address: VectorInput,
    /// Declared only when `read_only` is false, as are `clk` and
    /// `write_enable`.
    pub data_in: VectorInput,
    pub clk: ScalarInput,
    pub write_enable: ScalarInput,
    pub data_out: VectorOutput,
}

/// Declare the memory kernel.
///
/// # Errors
///
/// Propagates [`KernelBuilder::build`] failures.
pub fn memory() -> Result<MemoryKernel, KernelError> {
    let mut builder = Kernel::builder(MEMORY);
    builder
        .tag(crate::SEQUENTIAL_TAG)
        .tag(crate::MEMORY_TAG)
        .property(crate::SYMBOL_PROPERTY, "RAM");
    let address_bits =
        builder.declare(Parameter::new("address_bits", 4_i64).constrained(Constraint::range(1, 16)));
    let data_bits = builder.declare(Parameter::new("data_bits", 8_i64).constrained(Constraint::range(1, 64)));
    let read_only = builder.declare(Parameter::new("read_only", false));
    let contents = builder.declare(Setting::new("contents", Vec::<u64>::new()));
    let cells = builder.declare(Field::<Vec<u64>>::uninitialized("cells"));
    let last_clock = builder.declare(Field::new("last_clock", Signal::Unset));
    let address = builder.declare(VectorInput::new("address", &address_bits));
    let data_out = builder.declare(VectorOutput::new("data_out", &data_bits));

    let data_in = VectorInput::new("data_in", &data_bits);
    let clk = ScalarInput::new("clk");
    let write_enable = ScalarInput::new("write_enable");

    let (ro, d, c, we) = (read_only.clone(), data_in.clone(), clk.clone(), write_enable.clone());
    builder.on_configuration(move |ctx| {
        if !*ctx.parameter(&ro) {
            ctx.declare(d.clone())?;
            ctx.declare(c.clone())?;
            ctx.declare(we.clone())?;
        }
        Ok(())
    });

    let (ab, words, cell_field, out) = (address_bits.clone(), contents.clone(), cells.clone(), data_out.clone());
    builder.on_initialization(move |ctx| {
        let capacity = 1_usize << crate::channel_count("address", *ctx.parameter(&ab))?;
        let width = ctx.vector_size(&out);
        let initial = ctx.setting(&words);
        let fits = initial.len() <= capacity && initial.iter().all(|w| w & !mask(width) == 0);
        if !fits {
            return Err(KernelError::ConstraintViolation {
                name: words.name().to_string(),
                value: format!("{} word(s)", initial.len()),
                constraint: format!("at most {capacity} words of {width} bit(s)"),
            });
        }
        let mut memory = initial.clone();
        memory.resize(capacity, 0);
        ctx.set_field(&cell_field, memory)
    });

    let (a, d, c, we, cell_field, last, out) = (
        address.clone(),
        data_in.clone(),
        clk.clone(),
        write_enable.clone(),
        cells.clone(),
        last_clock.clone(),
        data_out.clone(),
    );
    builder.on_update(move |ctx| {
        let width = ctx.vector_size(&out);
        let selected = to_word(ctx.inputs(&a)).map(|word| word as usize);

        if ctx.has_input(c.name()) {
            let clock = ctx.input(&c);
            let rising = *ctx.field(&last) == Signal::False && clock == Signal::True;
            ctx.set_field(&last, clock);
            if rising && ctx.input(&we) == Signal::True {
                // Writes with an undriven address or data word are dropped.
                if let (Some(index), Some(word)) = (selected, to_word(ctx.inputs(&d))) {
                    ctx.field_mut(&cell_field)[index] = word;
                }
            }
        }

        let signals = match selected {
            Some(index) => from_word(ctx.field(&cell_field)[index], width),
            None if ctx.inputs(&a).contains(&Signal::Conflict) => vec![Signal::Conflict; width],
            None => vec![Signal::Unset; width],
        };
        ctx.set_outputs(&out, &signals);
    });

    Ok(MemoryKernel {
        kernel: builder.build()?,
        address_bits,
        data_bits,
        read_only,
        contents,
        cells,
        last_clock,
        address,
        data_in,
        clk,
        write_enable,
        data_out,
    })
}

/// [`memory`] with `read_only` bound to `true`, registered as [`ROM`].
///
/// # Errors
///
/// Propagates [`KernelBuilder::build`] failures.
pub fn rom() -> Result<SpecializedKernel, KernelError> {
    let base = memory()?;
    let special = SpecializedKernel::from_template(Arc::new(base.kernel), |patch| {
        patch.set(&base.read_only, true)
    })?;
    Ok(special.with_id(ROM).with_property(crate::SYMBOL_PROPERTY, "ROM"))
}
