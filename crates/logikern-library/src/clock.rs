//! [`clock`] – a free-running square wave.

use logikern_kernel::prelude::*;

pub const CLOCK: &str = "logic:clock";

/// Handles of the [`clock`] kernel.
#[derive(Clone, Debug)]
pub struct ClockKernel {
    pub kernel: Kernel,
    /// Ticks per period spent high.
    pub ticks_high: Setting<u64>,
    /// Ticks per period spent low.
    pub ticks_low: Setting<u64>,
    /// Ticks elapsed since the state was created.
    pub ticks: Field<u64>,
    pub out: ScalarOutput,
}

/// High for `ticks_high` updates, then low for `ticks_low`, starting high.
/// `out` is unset until the first update.
///
/// # Errors
///
/// Propagates [`KernelBuilder::build`] failures.
pub fn clock() -> Result<ClockKernel, KernelError> {
    let mut builder = Kernel::builder(CLOCK);
    builder.tag(crate::SOURCE_TAG).property(crate::SYMBOL_PROPERTY, "CLK");
    let ticks_high = builder.declare(Setting::new("ticks_high", 1_u64).constrained(Constraint::Min(1)));
    let ticks_low = builder.declare(Setting::new("ticks_low", 1_u64).constrained(Constraint::Min(1)));
    let ticks = builder.declare(Field::new("ticks", 0_u64));
    let out = builder.declare(ScalarOutput::new("out"));

    let (h, l, t, o) = (ticks_high.clone(), ticks_low.clone(), ticks.clone(), out.clone());
    builder.on_update(move |ctx| {
        let high = *ctx.setting(&h);
        // Both phases are at least 1, so the period never saturates to 0.
        let period = high.saturating_add(*ctx.setting(&l));
        let phase = *ctx.field(&t) % period;
        ctx.set_output(&o, Signal::from_bool(phase < high));
        let ticks = ctx.field_mut(&t);
        *ticks = ticks.wrapping_add(1);
    });

    Ok(ClockKernel {
        kernel: builder.build()?,
        ticks_high,
        ticks_low,
        ticks,
        out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waveform(high: u64, low: u64, ticks: usize) -> Vec<Signal> {
        let clk = clock().unwrap();
        let mut state = clk
            .kernel
            .default_variant()
            .unwrap()
            .create_instance(&[], |s| {
                s.set(&clk.ticks_high, high)?;
                s.set(&clk.ticks_low, low)
            })
            .unwrap()
            .create_state();
        (0..ticks)
            .map(|_| {
                state.update();
                state.output(&clk.out)
            })
            .collect()
    }

    #[test]
    fn symmetric_clock_alternates() {
        use logikern_types::Signal::{False as F, True as T};
        assert_eq!(waveform(1, 1, 4), vec![T, F, T, F]);
    }

    #[test]
    fn duty_cycle_follows_settings() {
        use logikern_types::Signal::{False as F, True as T};
        assert_eq!(waveform(2, 1, 6), vec![T, T, F, T, T, F]);
        assert_eq!(waveform(1, 3, 5), vec![T, F, F, F, T]);
    }

    #[test]
    fn counts_ticks_in_field() {
        let clk = clock().unwrap();
        let mut state = clk
            .kernel
            .default_variant()
            .unwrap()
            .default_instance()
            .unwrap()
            .create_state();
        assert_eq!(state.output(&clk.out), Signal::Unset);
        state.update();
        state.update();
        assert_eq!(*state.field(&clk.ticks), 2);
    }

    #[test]
    fn longest_phases_do_not_overflow() {
        use logikern_types::Signal::{False as F, True as T};
        assert_eq!(waveform(u64::MAX, 1, 3), vec![T, T, T]);
        assert_eq!(waveform(1, u64::MAX, 3), vec![T, F, F]);
        assert_eq!(waveform(u64::MAX, u64::MAX, 2), vec![T, T]);
    }

    #[test]
    fn zero_length_phase_is_rejected() {
        let clk = clock().unwrap();
        let variant = clk.kernel.default_variant().unwrap();
        assert!(matches!(
            variant.create_instance(&[], |s| s.set(&clk.ticks_low, 0)),
            Err(KernelError::ConstraintViolation { ref name, .. }) if name == "ticks_low"
        ));
    }
}
