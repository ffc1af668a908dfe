//! `logikern-kernel` – Staged kernel configuration
//!
//! A *kernel* is the computational unit behind a simulated component: a
//! gate, a flip-flop, a memory.  It is declared once and then narrowed, stage
//! by stage, into the mutable state a simulator ticks.
//!
//! ```text
//! Kernel ──create_variant──▶ KernelVariant ──create_instance──▶ KernelInstance ──create_state──▶ KernelState
//!  (declared)               (parameters, sizes)                (settings, initial values)       (fields, inputs, outputs)
//! ```
//!
//! # Modules
//!
//! - [`value`] – [`AnyValue`][value::AnyValue], the type-erased box every
//!   parameter, setting and field value is stored in.
//! - [`constraint`] – [`Constraint`][constraint::Constraint], the closed
//!   algebra of value restrictions.
//! - [`variable`] – typed variable handles ([`Parameter`][variable::Parameter],
//!   [`Setting`][variable::Setting], [`Field`][variable::Field], inputs and
//!   outputs).
//! - [`schema`] – per-kind schemas and the [`VariableSet`][schema::VariableSet]
//!   of a kernel.
//! - [`provider`] – [`Patch`][provider::Patch] and
//!   [`Storage`][provider::Storage], the mutable and frozen value sets.
//! - [`context`] – the views hooks get onto their stage.
//! - [`kernel`] – [`Kernel`][kernel::Kernel] and its builder.
//! - [`variant`], [`instance`], [`state`] – the three resolved stages.
//! - [`composition`] – [`KernelTemplate`][composition::KernelTemplate],
//!   wrapped and specialized kernels.
//!
//! # Example
//!
//! ```
//! use logikern_kernel::prelude::*;
//!
//! let mut builder = Kernel::builder("demo:toggle");
//! let out = builder.declare(ScalarOutput::new("out").initially(Signal::False));
//! builder.on_update(move |ctx| {
//!     let next = !ctx.output(&out);
//!     ctx.set_output(&out, next);
//! });
//! let kernel = builder.build().unwrap();
//!
//! let mut state = kernel
//!     .default_variant()
//!     .unwrap()
//!     .default_instance()
//!     .unwrap()
//!     .create_state();
//! state.update();
//! assert_eq!(state.output_channels("out"), Some(&[Signal::True][..]));
//! ```

pub mod composition;
pub mod constraint;
pub mod context;
pub mod instance;
pub mod kernel;
pub mod provider;
pub mod schema;
pub mod state;
pub mod value;
pub mod variable;
pub mod variant;

pub use composition::{KernelTemplate, KernelTemplateExt, SpecializedKernel, WrappedKernel};
pub use constraint::Constraint;
pub use instance::KernelInstance;
pub use kernel::{Kernel, KernelBuilder, KernelStage};
pub use state::KernelState;
pub use variant::KernelVariant;

/// Everything needed to author and run kernels.
pub mod prelude {
    pub use logikern_types::{Id, KernelError, Signal, VariableKind};

    pub use crate::composition::{KernelTemplate, KernelTemplateExt, SpecializedKernel, WrappedKernel};
    pub use crate::constraint::Constraint;
    pub use crate::context::{
        ConfigurationContext, InitScope, InitializationContext, SettingScope, UpdateContext,
    };
    pub use crate::instance::KernelInstance;
    pub use crate::kernel::{Kernel, KernelBuilder, KernelStage};
    pub use crate::provider::{
        FieldPatch, FieldState, FieldStorage, InputState, OutputPatch, OutputState, OutputStorage,
        ParameterPatch, ParameterStorage, PartialProvider, Provider, SettingPatch, SettingStorage,
        VectorSizeStorage,
    };
    pub use crate::state::KernelState;
    pub use crate::value::AnyValue;
    pub use crate::variable::{
        Field, InputElement, OutputElement, OutputInitializer, Parameter, ScalarInput,
        ScalarOutput, Setting, VectorInput, VectorOutput, VectorSize,
    };
    pub use crate::variant::KernelVariant;
}
