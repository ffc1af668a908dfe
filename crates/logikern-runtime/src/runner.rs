//! [`ComponentRunner`] – drives one kernel state tick by tick.
//!
//! The runner implements the driver side of the update contract for a
//! single component:
//!
//! 1. inputs start every tick unset; values driven before [`ComponentRunner::tick`]
//!    are merged with [`Signal::merge`], so two drivers of one channel
//!    disagreeing produce a conflict,
//! 2. the kernel's update hook runs once,
//! 3. the outputs are snapshotted into a bounded history.
//!
//! Checkpoints are plain state clones: restoring one rewinds fields, inputs
//! and outputs and drops the history recorded after it.

use std::collections::{BTreeMap, VecDeque};

use logikern_kernel::{KernelInstance, KernelState};
use logikern_types::{KernelError, Signal};
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::config::RuntimeConfig;

/// Failures of a [`ComponentRunner`] run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error("condition not reached within {budget} tick(s)")]
    BudgetExhausted { budget: u64 },
}

/// Outputs observed after one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickRecord {
    /// 1-based index of the tick within the state's lifetime.
    pub tick: u64,
    pub outputs: BTreeMap<String, Vec<Signal>>,
}

impl TickRecord {
    pub fn output(&self, name: &str) -> Option<&[Signal]> {
        self.outputs.get(name).map(Vec::as_slice)
    }
}

/// Saved runner position; see [`ComponentRunner::checkpoint`].
#[derive(Debug, Clone)]
pub struct Checkpoint {
    state: KernelState,
}

impl Checkpoint {
    pub fn tick(&self) -> u64 {
        self.state.ticks()
    }
}

/// Owns the [`KernelState`] of one component and ticks it.
#[derive(Debug)]
pub struct ComponentRunner {
    state: KernelState,
    history: VecDeque<TickRecord>,
    capacity: usize,
    tick_budget: u64,
}

impl ComponentRunner {
    /// Runner over `state` using the history capacity and tick budget of
    /// `config`.
    pub fn new(state: KernelState, config: &RuntimeConfig) -> Self {
        Self {
            state,
            history: VecDeque::with_capacity(config.history_capacity),
            capacity: config.history_capacity,
            tick_budget: config.tick_budget,
        }
    }

    /// Runner over a fresh state of `instance`.
    pub fn for_instance(instance: &KernelInstance, config: &RuntimeConfig) -> Self {
        Self::new(instance.create_state(), config)
    }

    pub fn state(&self) -> &KernelState {
        &self.state
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.state.ticks()
    }

    pub fn tick_budget(&self) -> u64 {
        self.tick_budget
    }

    /// Merge `signals` into the input `name` for the next tick.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownVariable`] or [`KernelError::ShapeMismatch`].
    pub fn drive(&mut self, name: &str, signals: &[Signal]) -> Result<(), KernelError> {
        self.state.drive(name, signals)
    }

    /// [`ComponentRunner::drive`] for every entry of `inputs`.  Nothing is
    /// applied past the first failing entry.
    ///
    /// # Errors
    ///
    /// As for [`ComponentRunner::drive`].
    pub fn drive_all<'a, I>(&mut self, inputs: I) -> Result<(), KernelError>
    where
        I: IntoIterator<Item = (&'a str, &'a [Signal])>,
    {
        inputs
            .into_iter()
            .try_for_each(|(name, signals)| self.state.drive(name, signals))
    }

    /// Run one update, record the outputs and clear the inputs.
    pub fn tick(&mut self) -> &TickRecord {
        self.state.update();
        let record = TickRecord {
            tick: self.state.ticks(),
            outputs: self.state.output_snapshot(),
        };
        self.state.reset_inputs();
        trace!(tick = record.tick, "tick");
        self.record(record)
    }

    /// Run `ticks` updates with no inputs driven.  Returns the last record,
    /// or `None` when `ticks` is zero.
    pub fn run(&mut self, ticks: u64) -> Option<&TickRecord> {
        for _ in 0..ticks {
            self.tick();
        }
        debug!(ticks, total = self.state.ticks(), "run finished");
        if ticks == 0 { None } else { self.history.back() }
    }

    /// Tick until `done` holds for a record, calling `stimulus` before each
    /// tick to drive inputs.  Returns the number of ticks spent.
    ///
    /// # Errors
    ///
    /// [`RunnerError::BudgetExhausted`] after the tick budget, or whatever
    /// `stimulus` reports.
    #[instrument(level = "debug", skip_all, fields(budget = self.tick_budget))]
    pub fn run_until<S, P>(&mut self, mut stimulus: S, mut done: P) -> Result<u64, RunnerError>
    where
        S: FnMut(u64, &mut ComponentRunner) -> Result<(), KernelError>,
        P: FnMut(&TickRecord) -> bool,
    {
        for spent in 1..=self.tick_budget {
            stimulus(self.state.ticks(), self)?;
            if done(self.tick()) {
                debug!(ticks = spent, "condition reached");
                return Ok(spent);
            }
        }
        warn!(budget = self.tick_budget, "tick budget exhausted");
        Err(RunnerError::BudgetExhausted {
            budget: self.tick_budget,
        })
    }

    /// Recorded ticks, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickRecord> {
        self.history.iter()
    }

    pub fn last(&self) -> Option<&TickRecord> {
        self.history.back()
    }

    /// Level sequence of channel `index` of output `name` across the
    /// recorded ticks.
    pub fn trace_of(&self, name: &str, index: usize) -> Vec<Signal> {
        self.history
            .iter()
            .map(|record| {
                record
                    .output(name)
                    .and_then(|channels| channels.get(index).copied())
                    .unwrap_or_default()
            })
            .collect()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            state: self.state.clone(),
        }
    }

    /// Rewind to `checkpoint`, dropping history recorded after it.
    pub fn restore(&mut self, checkpoint: &Checkpoint) {
        self.state = checkpoint.state.clone();
        let tick = checkpoint.tick();
        while self.history.back().is_some_and(|record| record.tick > tick) {
            self.history.pop_back();
        }
        debug!(tick, "restored checkpoint");
    }

    /// Return to the instance's initial values and drop the history.
    pub fn reset(&mut self) {
        self.state.reset();
        self.history.clear();
    }

    pub fn into_state(self) -> KernelState {
        self.state
    }

    fn record(&mut self, record: TickRecord) -> &TickRecord {
        if self.capacity == 0 {
            self.history.clear();
        } else if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(record);
        // Capacity 0 keeps only the latest record so the caller has
        // something to look at.
        &self.history[self.history.len() - 1]
    }
}
