//! `ComponentRunner` driving library kernels.

use logikern_kernel::prelude::*;
use logikern_library::KernelRegistry;
use logikern_library::clock::clock;
use logikern_library::flip_flop::d_flip_flop;
use logikern_runtime::{ComponentRunner, RunnerError, RuntimeConfig};
use logikern_types::Signal::{Conflict as X, False as F, True as T, Unset as U};

fn config(history_capacity: usize, tick_budget: u64) -> RuntimeConfig {
    RuntimeConfig {
        history_capacity,
        tick_budget,
        ..RuntimeConfig::default()
    }
}

#[test]
fn clock_waveform_is_recorded() {
    let clk = clock().unwrap();
    let instance = clk
        .kernel
        .default_variant()
        .unwrap()
        .create_instance(&[], |s| {
            s.set(&clk.ticks_high, 2)?;
            s.set(&clk.ticks_low, 1)
        })
        .unwrap();
    let mut runner = ComponentRunner::for_instance(&instance, &config(16, 100));
    runner.run(4);
    assert_eq!(runner.trace_of("out", 0), vec![T, T, F, T]);
    assert_eq!(runner.last().unwrap().tick, 4);
}

#[test]
fn history_is_bounded() {
    let clk = clock().unwrap();
    let instance = clk.kernel.default_variant().unwrap().default_instance().unwrap();
    let mut runner = ComponentRunner::for_instance(&instance, &config(3, 100));
    runner.run(10);
    let ticks: Vec<u64> = runner.history().map(|r| r.tick).collect();
    assert_eq!(ticks, vec![8, 9, 10]);
}

#[test]
fn inputs_are_cleared_between_ticks() {
    let registry = KernelRegistry::standard().unwrap();
    let instance = registry
        .default_variant("logic:buffer")
        .unwrap()
        .default_instance()
        .unwrap();
    let mut runner = ComponentRunner::for_instance(&instance, &RuntimeConfig::default());

    runner.drive("in", &[T]).unwrap();
    assert_eq!(runner.tick().output("out"), Some(&[T][..]));
    assert_eq!(runner.tick().output("out"), Some(&[U][..]));
}

#[test]
fn disagreeing_drivers_conflict() {
    let registry = KernelRegistry::standard().unwrap();
    let instance = registry
        .default_variant("logic:buffer")
        .unwrap()
        .default_instance()
        .unwrap();
    let mut runner = ComponentRunner::for_instance(&instance, &RuntimeConfig::default());
    runner.drive_all([("in", &[T][..]), ("in", &[F][..])]).unwrap();
    assert_eq!(runner.tick().output("out"), Some(&[X][..]));
    assert!(matches!(
        runner.drive("missing", &[T]),
        Err(KernelError::UnknownVariable { .. })
    ));
}

#[test]
fn run_until_drives_stimulus() {
    let ff = d_flip_flop().unwrap();
    let instance = ff.kernel.default_variant().unwrap().default_instance().unwrap();
    let mut runner = ComponentRunner::for_instance(&instance, &config(16, 10));

    let spent = runner
        .run_until(
            |tick, runner| {
                runner.drive("d", &[T])?;
                runner.drive("clk", &[Signal::from_bool(tick % 2 == 1)])
            },
            |record| record.output("q") == Some(&[T][..]),
        )
        .unwrap();
    // clk: 0 (tick 1), 1 (tick 2) -> captured on the second tick
    assert_eq!(spent, 2);
}

#[test]
fn run_until_reports_exhausted_budget() {
    let ff = d_flip_flop().unwrap();
    let instance = ff.kernel.default_variant().unwrap().default_instance().unwrap();
    let mut runner = ComponentRunner::for_instance(&instance, &config(16, 5));
    let result = runner.run_until(|_, _| Ok(()), |record| record.output("q") == Some(&[T][..]));
    assert_eq!(result, Err(RunnerError::BudgetExhausted { budget: 5 }));
    assert_eq!(runner.ticks(), 5);
}

#[test]
fn restore_rewinds_state_and_history() {
    let clk = clock().unwrap();
    let instance = clk.kernel.default_variant().unwrap().default_instance().unwrap();
    let mut runner = ComponentRunner::for_instance(&instance, &config(16, 100));
    runner.run(3);
    let checkpoint = runner.checkpoint();
    assert_eq!(checkpoint.tick(), 3);

    runner.run(2);
    let after_checkpoint = runner.trace_of("out", 0);
    runner.restore(&checkpoint);
    assert_eq!(runner.ticks(), 3);
    assert_eq!(*runner.state().field(&clk.ticks), 3);
    assert_eq!(runner.history().count(), 3);

    runner.run(2);
    assert_eq!(runner.trace_of("out", 0), after_checkpoint);
}

#[test]
fn reset_returns_to_initial_values() {
    let clk = clock().unwrap();
    let instance = clk.kernel.default_variant().unwrap().default_instance().unwrap();
    let mut runner = ComponentRunner::for_instance(&instance, &RuntimeConfig::default());
    runner.run(5);
    runner.reset();
    assert_eq!(runner.ticks(), 0);
    assert!(runner.last().is_none());
    assert_eq!(runner.state().output(&clk.out), U);
}
