//! `logikern-runtime` – Hosting kernels outside a full simulator
//!
//! # Modules
//!
//! - [`runner`] – [`ComponentRunner`], a single-component tick harness with
//!   bounded output history and checkpoints.
//! - [`config`] – [`RuntimeConfig`], loaded from TOML with `LOGIKERN_*`
//!   environment overrides.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing], the
//!   `tracing` subscriber and optional OTLP exporter.
//!
//! # Example
//!
//! ```
//! use logikern_kernel::prelude::*;
//! use logikern_runtime::{ComponentRunner, RuntimeConfig};
//!
//! let mut builder = Kernel::builder("demo:toggle");
//! let out = builder.declare(ScalarOutput::new("out").initially(Signal::False));
//! builder.on_update(move |ctx| {
//!     let next = !ctx.output(&out);
//!     ctx.set_output(&out, next);
//! });
//! let instance = builder
//!     .build()
//!     .unwrap()
//!     .default_variant()
//!     .unwrap()
//!     .default_instance()
//!     .unwrap();
//!
//! let mut runner = ComponentRunner::for_instance(&instance, &RuntimeConfig::default());
//! runner.run(3);
//! assert_eq!(runner.trace_of("out", 0), vec![Signal::True, Signal::False, Signal::True]);
//! ```

pub mod config;
pub mod runner;
pub mod telemetry;

pub use config::{ConfigError, LogFormat, RuntimeConfig};
pub use runner::{Checkpoint, ComponentRunner, RunnerError, TickRecord};
