//! `logikern-library` – Standard logic kernels
//!
//! Every kernel constructor returns a handle struct: the [`Kernel`] plus the
//! typed handles needed to configure it and to drive or read its state.
//! [`KernelRegistry::standard`] collects all of them by id.
//!
//! | id                       | constructor                          |
//! |--------------------------|--------------------------------------|
//! | `logic:constant`         | [`constant::constant`]               |
//! | `logic:buffer`, `logic:not` | [`buffer::buffer`], [`buffer::not`] |
//! | `logic:and` … `logic:xnor` | [`gate::gate`]                     |
//! | `logic:and2` … `logic:xnor2` | [`gate::fixed_gate`]             |
//! | `logic:clock`            | [`clock::clock`]                     |
//! | `logic:d_flip_flop`      | [`flip_flop::d_flip_flop`]           |
//! | `logic:memory`, `logic:rom` | [`memory::memory`], [`memory::rom`] |
//!
//! # Example
//!
//! ```
//! use logikern_kernel::prelude::*;
//! use logikern_library::gate::{gate, GateOp};
//!
//! let xor = gate(GateOp::Xor).unwrap();
//! let mut state = xor
//!     .kernel
//!     .default_variant()
//!     .unwrap()
//!     .default_instance()
//!     .unwrap()
//!     .create_state();
//! state.drive_inputs(&xor.input, &[Signal::True, Signal::False]).unwrap();
//! state.update();
//! assert_eq!(state.outputs_of(&xor.out), &[Signal::True]);
//! ```
//!
//! [`Kernel`]: logikern_kernel::Kernel

pub mod bits;
pub mod buffer;
pub mod clock;
pub mod constant;
pub mod flip_flop;
pub mod gate;
pub mod memory;
pub mod registry;

pub use registry::KernelRegistry;

use logikern_types::KernelError;

/// Combinational gates, `buffer` and `not` included.
pub const GATE_TAG: &str = "logic:gate";
/// Kernels without inputs.
pub const SOURCE_TAG: &str = "logic:source";
/// Kernels whose outputs depend on earlier updates.
pub const SEQUENTIAL_TAG: &str = "logic:sequential";
pub const MEMORY_TAG: &str = "logic:memory";
/// Property holding the IEC-style symbol drawn inside the component box.
pub const SYMBOL_PROPERTY: &str = "ui:symbol";

/// Convert an integer parameter feeding a vector width.
pub(crate) fn channel_count(name: &str, value: i64) -> Result<usize, KernelError> {
    usize::try_from(value).map_err(|_| KernelError::InvalidVectorSize {
        name: name.to_string(),
        size: value,
    })
}
