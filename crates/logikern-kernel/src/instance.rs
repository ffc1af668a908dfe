//! [`KernelInstance`] – a variant with settings resolved and the initial
//! field and output values computed.

use std::fmt;
use std::sync::Arc;

use logikern_types::{KernelError, Signal};
use tracing::{debug, instrument};

use crate::context::{InitScope, InitializationContext, SettingScope};
use crate::kernel::{Kernel, KernelStage};
use crate::provider::{
    FieldPatch, FieldStorage, OutputPatch, OutputStorage, PartialProvider, SettingPatch,
    SettingStorage,
};
use crate::schema::SettingKind;
use crate::state::KernelState;
use crate::value::ConfigValue;
use crate::variable::{Setting, Shape};
use crate::variant::KernelVariant;

struct InstanceDef {
    variant: KernelVariant,
    settings: SettingStorage,
    fields: FieldStorage,
    outputs: OutputStorage,
}

/// An initialized kernel.  Cloning shares the instance; every
/// [`KernelState`] created from it starts from the same initial values.
#[derive(Clone)]
pub struct KernelInstance {
    def: Arc<InstanceDef>,
}

impl KernelInstance {
    pub fn variant(&self) -> &KernelVariant {
        &self.def.variant
    }

    pub fn kernel(&self) -> &Kernel {
        self.def.variant.kernel()
    }

    pub fn settings(&self) -> &SettingStorage {
        &self.def.settings
    }

    pub fn setting<T: ConfigValue>(&self, setting: &Setting<T>) -> &T {
        self.def.settings.get(setting)
    }

    /// Field values every new state starts with.
    pub fn initial_fields(&self) -> &FieldStorage {
        &self.def.fields
    }

    /// Output values every new state starts with.
    pub fn initial_outputs(&self) -> &OutputStorage {
        &self.def.outputs
    }

    pub fn stage(&self) -> KernelStage {
        KernelStage::Initialized
    }

    /// Fresh mutable state: initial fields and outputs, all inputs unset.
    pub fn create_state(&self) -> KernelState {
        KernelState::new(self.clone())
    }

    /// New instance of the same variant starting from this instance's
    /// settings plus the overrides made by `configure`.
    ///
    /// # Errors
    ///
    /// As for [`KernelVariant::create_instance`].
    pub fn reconfigure<F>(&self, configure: F) -> Result<KernelInstance, KernelError>
    where
        F: FnOnce(&mut SettingPatch) -> Result<(), KernelError>,
    {
        self.def.variant.create_instance(&[&self.def.settings], configure)
    }
}

impl fmt::Debug for KernelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelInstance")
            .field("variant", &self.def.variant)
            .field("settings", &self.def.settings)
            .field("fields", &self.def.fields)
            .field("outputs", &self.def.outputs)
            .finish()
    }
}

#[instrument(level = "debug", skip_all, fields(kernel = %variant.template_id()))]
pub(crate) fn build<F>(
    variant: &KernelVariant,
    patches: &[&dyn PartialProvider<SettingKind>],
    configure: F,
) -> Result<KernelInstance, KernelError>
where
    F: FnOnce(&mut SettingPatch) -> Result<(), KernelError>,
{
    let variables = variant.variables();
    let schema = Arc::clone(variables.settings());
    let mut patch = SettingPatch::new(Arc::clone(&schema));
    for provider in patches {
        patch.apply_patch(*provider)?;
    }
    let scope = SettingScope::new(variant.parameters(), variant.sizes());
    for entry in schema.entries() {
        if !patch.has_value(entry.name()) {
            patch.set_value(entry.name(), (entry.init())(&scope))?;
        }
    }
    configure(&mut patch)?;
    let settings = patch.into_storage()?;

    let init = InitScope::new(variant.parameters(), &settings, variant.sizes());

    let mut fields = FieldPatch::new(Arc::clone(variables.fields()));
    for entry in variables.fields().entries() {
        if let Some(initializer) = entry.init() {
            fields.set_value(entry.name(), initializer(&init))?;
        }
    }

    let mut outputs = OutputPatch::new(Arc::clone(variables.outputs()));
    for entry in variables.outputs().entries() {
        let spec = entry.init();
        let width = match &spec.shape {
            Shape::Scalar => 1,
            Shape::Vector(_) => variant.sizes().size(entry.name()).ok_or_else(|| {
                KernelError::MissingVectorSize {
                    name: entry.name().to_string(),
                }
            })?,
        };
        let signals: Vec<Signal> = spec.initializer.evaluate(entry.name(), &init, width)?;
        outputs.set_value(entry.name(), signals)?;
    }

    let mut ctx = InitializationContext::new(init, fields, outputs);
    variant.kernel().run_initialization(&mut ctx)?;
    let (fields, outputs) = ctx.into_parts();
    let fields = fields.into_storage()?;
    let outputs = outputs.into_storage()?;

    debug!(settings = settings.len(), fields = fields.len(), "instance initialized");
    Ok(KernelInstance {
        def: Arc::new(InstanceDef {
            variant: variant.clone(),
            settings,
            fields,
            outputs,
        }),
    })
}
