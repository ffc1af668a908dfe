//! [`Kernel`] – the immutable declaration of a component's variables and
//! hooks, and [`KernelBuilder`] to author one.
//!
//! # Example
//!
//! ```
//! use logikern_kernel::prelude::*;
//!
//! let mut builder = Kernel::builder("demo:inverter");
//! let input = builder.declare(ScalarInput::new("in"));
//! let output = builder.declare(ScalarOutput::new("out"));
//! builder.on_update(move |ctx| {
//!     let level = ctx.input(&input);
//!     ctx.set_output(&output, !level);
//! });
//! let kernel = builder.build().unwrap();
//!
//! let mut state = kernel.default_variant().unwrap().default_instance().unwrap().create_state();
//! state.drive_input(&ScalarInput::new("in"), Signal::True).unwrap();
//! state.update();
//! assert_eq!(state.output(&ScalarOutput::new("out")), Signal::False);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use logikern_types::{Id, KernelError};
use tracing::{debug, warn};

use crate::composition::SpecializedKernel;
use crate::context::{ConfigurationContext, InitializationContext, UpdateContext};
use crate::provider::ParameterPatch;
use crate::schema::{VariableInfo, VariableSet};
use crate::state::KernelState;
use crate::variable::Declare;

/// Configuration hook: may declare, exclude and size variables.
pub type ConfigurationHook =
    Arc<dyn Fn(&mut ConfigurationContext<'_>) -> Result<(), KernelError> + Send + Sync>;

/// Initialization hook: may assign each field and output once.
pub type InitializationHook =
    Arc<dyn Fn(&mut InitializationContext<'_>) -> Result<(), KernelError> + Send + Sync>;

/// Update hook: runs once per tick.
pub type UpdateHook = Arc<dyn Fn(&mut UpdateContext<'_>) + Send + Sync>;

/// Lifecycle stage of a kernel object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KernelStage {
    /// A [`Kernel`]: variables declared, nothing resolved.
    Declared,
    /// A [`KernelVariant`][crate::variant::KernelVariant]: parameters and
    /// vector sizes resolved.
    Configured,
    /// A [`KernelInstance`][crate::instance::KernelInstance]: settings
    /// resolved, initial fields and outputs computed.
    Initialized,
    /// A [`KernelState`]: mutable per-tick values.
    Running,
}

impl fmt::Display for KernelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            KernelStage::Declared => "declared",
            KernelStage::Configured => "configured",
            KernelStage::Initialized => "initialized",
            KernelStage::Running => "running",
        };
        f.write_str(label)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Kernel
// ────────────────────────────────────────────────────────────────────────────

struct KernelDef {
    id: Id,
    tags: BTreeSet<Id>,
    properties: BTreeMap<Id, String>,
    variables: VariableSet,
    on_configuration: Option<ConfigurationHook>,
    on_initialization: Option<InitializationHook>,
    on_update: Option<UpdateHook>,
}

/// Immutable kernel declaration.  Cloning shares the declaration.
#[derive(Clone)]
pub struct Kernel {
    def: Arc<KernelDef>,
}

impl Kernel {
    /// Start declaring a kernel called `id`.
    pub fn builder(id: impl Into<Id>) -> KernelBuilder {
        KernelBuilder::new(id.into())
    }

    pub fn id(&self) -> &Id {
        &self.def.id
    }

    pub fn tags(&self) -> &BTreeSet<Id> {
        &self.def.tags
    }

    pub fn properties(&self) -> &BTreeMap<Id, String> {
        &self.def.properties
    }

    /// Statically declared variables.  A variant may differ when the
    /// configuration hook adds or excludes variables.
    pub fn variables(&self) -> &VariableSet {
        &self.def.variables
    }

    pub fn variable_infos(&self) -> Vec<VariableInfo> {
        self.def.variables.infos()
    }

    pub fn stage(&self) -> KernelStage {
        KernelStage::Declared
    }

    /// Run this kernel's update hook over `state` and advance its tick count.
    ///
    /// # Panics
    ///
    /// When the hook reads or writes a variable `state` does not declare.
    pub fn update_kernel(&self, state: &mut KernelState) {
        state.apply_update(|ctx| {
            if let Some(hook) = &self.def.on_update {
                hook(ctx);
            }
        });
    }

    /// A kernel with some parameters bound for good.
    ///
    /// `configure` receives a patch over this kernel's parameters; every value
    /// it sets disappears from the specialized kernel's parameter schema.
    ///
    /// # Errors
    ///
    /// Whatever `configure` or the bound values' validation reports.
    pub fn specialize<F>(&self, configure: F) -> Result<SpecializedKernel, KernelError>
    where
        F: FnOnce(&mut ParameterPatch) -> Result<(), KernelError>,
    {
        SpecializedKernel::from_template(Arc::new(self.clone()), configure)
    }

    pub(crate) fn run_configuration(&self, ctx: &mut ConfigurationContext<'_>) -> Result<(), KernelError> {
        match &self.def.on_configuration {
            Some(hook) => hook(ctx).inspect_err(|err| {
                warn!(kernel = %self.def.id, error = %err, "configuration hook failed");
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn run_initialization(
        &self,
        ctx: &mut InitializationContext<'_>,
    ) -> Result<(), KernelError> {
        match &self.def.on_initialization {
            Some(hook) => hook(ctx).inspect_err(|err| {
                warn!(kernel = %self.def.id, error = %err, "initialization hook failed");
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("id", &self.def.id)
            .field("tags", &self.def.tags)
            .field("variables", &self.def.variables)
            .finish_non_exhaustive()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// KernelBuilder
// ────────────────────────────────────────────────────────────────────────────

/// Accumulates a kernel declaration.
///
/// [`KernelBuilder::declare`] returns the handle it was given so the hooks
/// can capture it.  The first failed declaration is remembered and reported
/// by [`KernelBuilder::build`].
pub struct KernelBuilder {
    id: Id,
    tags: BTreeSet<Id>,
    properties: BTreeMap<Id, String>,
    variables: VariableSet,
    first_error: Option<KernelError>,
    on_configuration: Option<ConfigurationHook>,
    on_initialization: Option<InitializationHook>,
    on_update: Option<UpdateHook>,
}

impl KernelBuilder {
    fn new(id: Id) -> Self {
        Self {
            id,
            tags: BTreeSet::new(),
            properties: BTreeMap::new(),
            variables: VariableSet::new(),
            first_error: None,
            on_configuration: None,
            on_initialization: None,
            on_update: None,
        }
    }

    pub fn tag(&mut self, tag: impl Into<Id>) -> &mut Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn property(&mut self, key: impl Into<Id>, value: impl Into<String>) -> &mut Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Declare `variable` and hand it back.
    pub fn declare<D: Declare>(&mut self, variable: D) -> D {
        if let Err(err) = variable.register(&mut self.variables) {
            warn!(kernel = %self.id, error = %err, "rejected declaration");
            self.first_error.get_or_insert(err);
        }
        variable
    }

    pub fn on_configuration<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut ConfigurationContext<'_>) -> Result<(), KernelError> + Send + Sync + 'static,
    {
        self.on_configuration = Some(Arc::new(hook));
        self
    }

    pub fn on_initialization<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut InitializationContext<'_>) -> Result<(), KernelError> + Send + Sync + 'static,
    {
        self.on_initialization = Some(Arc::new(hook));
        self
    }

    pub fn on_update<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut UpdateContext<'_>) + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(hook));
        self
    }

    /// Finish the declaration.
    ///
    /// # Errors
    ///
    /// The first error recorded by [`KernelBuilder::declare`], typically
    /// [`KernelError::DuplicateVariable`].
    pub fn build(self) -> Result<Kernel, KernelError> {
        if let Some(err) = self.first_error {
            return Err(err);
        }
        debug!(kernel = %self.id, variables = self.variables.len(), "kernel declared");
        Ok(Kernel {
            def: Arc::new(KernelDef {
                id: self.id,
                tags: self.tags,
                properties: self.properties,
                variables: self.variables,
                on_configuration: self.on_configuration,
                on_initialization: self.on_initialization,
                on_update: self.on_update,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{Field, Parameter, ScalarInput, ScalarOutput, Setting};
    use logikern_types::VariableKind;

    #[test]
    fn duplicate_declaration_fails_build() {
        let mut builder = Kernel::builder("test:dup");
        builder.declare(ScalarInput::new("a"));
        builder.declare(ScalarOutput::new("a"));
        let err = builder.build().unwrap_err();
        assert_eq!(err, KernelError::DuplicateVariable { name: "a".into() });
    }

    #[test]
    fn first_error_wins() {
        let mut builder = Kernel::builder("test:dup");
        builder.declare(Parameter::new("p", 1_i64));
        builder.declare(Setting::new("p", 1_i64));
        builder.declare(ScalarInput::new("x"));
        builder.declare(ScalarInput::new("x"));
        assert!(matches!(
            builder.build(),
            Err(KernelError::DuplicateVariable { ref name }) if name == "p"
        ));
    }

    #[test]
    fn metadata_is_kept() {
        let mut builder = Kernel::builder("logic:and");
        builder.tag("logic:gate").tag("logic:combinational");
        builder.property("ui:symbol", "&");
        let kernel = builder.build().unwrap();
        assert_eq!(kernel.id().as_str(), "logic:and");
        assert!(kernel.tags().contains(&Id::from("logic:gate")));
        assert_eq!(kernel.tags().len(), 2);
        assert_eq!(
            kernel.properties().get(&Id::from("ui:symbol")).map(String::as_str),
            Some("&")
        );
        assert_eq!(kernel.stage(), KernelStage::Declared);
    }

    #[test]
    fn variable_infos_list_declarations() {
        let mut builder = Kernel::builder("test:info");
        builder.declare(Parameter::new("width", 1_i64));
        builder.declare(Field::new("count", 0_u32));
        builder.declare(ScalarOutput::new("q"));
        let kernel = builder.build().unwrap();
        let kinds: Vec<_> = kernel.variable_infos().into_iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![VariableKind::Parameter, VariableKind::Field, VariableKind::Output]
        );
    }

    #[test]
    fn stage_display() {
        assert_eq!(KernelStage::Running.to_string(), "running");
        assert!(KernelStage::Declared < KernelStage::Configured);
    }
}
