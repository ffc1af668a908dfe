//! [`KernelVariant`] – a kernel with every parameter and vector size
//! resolved.
//!
//! Building a variant runs these steps, stopping at the first error:
//!
//! 1. Start from the base values, fill every missing parameter from its
//!    initializer, then let the caller override values.  Defaults are
//!    validated as they are filled, so a default outside its constraint
//!    fails the call unless the base supplies that parameter; an override
//!    in `configure` comes too late to replace it.
//! 2. Freeze the parameters.
//! 3. Resolve the width of every constant or parameter-driven vector.
//! 4. Run the configuration hook, which may declare or exclude variables and
//!    size deferred vectors.
//! 5. Resolve the remaining widths; a deferred vector the hook left unsized
//!    fails with [`KernelError::MissingVectorSize`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use logikern_types::{Id, KernelError, VariableKind};
use tracing::{debug, instrument};

use crate::composition::KernelTemplate;
use crate::context::ConfigurationContext;
use crate::instance::{self, KernelInstance};
use crate::kernel::{Kernel, KernelStage};
use crate::provider::{
    ParameterPatch, ParameterStorage, PartialProvider, SettingPatch, VectorSizePatch,
    VectorSizeStorage,
};
use crate::schema::{ParameterKind, SettingKind, VariableSet};
use crate::value::ConfigValue;
use crate::variable::{Parameter, VectorSize, VectorVariable};

/// Caller hook that adjusts parameter values before they are frozen.
pub type ParameterConfigurator<'a> = dyn FnMut(&mut ParameterPatch) -> Result<(), KernelError> + 'a;

struct VariantDef {
    kernel: Kernel,
    template_id: Id,
    /// Wrapping template, when the variant did not come from `kernel` itself.
    origin: Option<Arc<dyn KernelTemplate>>,
    parameters: ParameterStorage,
    sizes: VectorSizeStorage,
    variables: VariableSet,
}

/// A configured kernel.  Cloning shares the variant.
#[derive(Clone)]
pub struct KernelVariant {
    def: Arc<VariantDef>,
}

impl KernelVariant {
    /// Kernel whose hooks this variant runs.
    pub fn kernel(&self) -> &Kernel {
        &self.def.kernel
    }

    /// Id of the template the variant was created from.  Differs from
    /// `kernel().id()` for wrapped and specialized kernels.
    pub fn template_id(&self) -> &Id {
        &self.def.template_id
    }

    pub fn parameters(&self) -> &ParameterStorage {
        &self.def.parameters
    }

    pub fn parameter<T: ConfigValue>(&self, parameter: &Parameter<T>) -> &T {
        self.def.parameters.get(parameter)
    }

    pub fn sizes(&self) -> &VectorSizeStorage {
        &self.def.sizes
    }

    /// # Panics
    ///
    /// When `vector` is not part of this variant.
    pub fn vector_size<V: VectorVariable + ?Sized>(&self, vector: &V) -> usize {
        self.def.sizes.size_of(vector)
    }

    /// Variables after the configuration hook ran.
    pub fn variables(&self) -> &VariableSet {
        &self.def.variables
    }

    pub fn stage(&self) -> KernelStage {
        KernelStage::Configured
    }

    /// Resolve settings and initial values.
    ///
    /// `patches` are applied in order (later ones win), missing settings are
    /// filled from their initializers, then `configure` may override.
    ///
    /// # Errors
    ///
    /// Any invalid or unknown setting, an error from the initialization hook,
    /// or [`KernelError::Incomplete`] when a field is left without a value.
    pub fn create_instance<F>(
        &self,
        patches: &[&dyn PartialProvider<SettingKind>],
        configure: F,
    ) -> Result<KernelInstance, KernelError>
    where
        F: FnOnce(&mut SettingPatch) -> Result<(), KernelError>,
    {
        instance::build(self, patches, configure)
    }

    /// Instance with every setting at its default.
    ///
    /// # Errors
    ///
    /// As for [`KernelVariant::create_instance`].
    pub fn default_instance(&self) -> Result<KernelInstance, KernelError> {
        self.create_instance(&[], |_| Ok(()))
    }

    /// New variant of the same template starting from this variant's
    /// parameter values plus the overrides made by `configure`.
    ///
    /// A variant of a wrapped or specialized kernel is rebuilt through that
    /// template, so parameters it binds stay bound and stay hidden from
    /// `configure`.
    ///
    /// # Errors
    ///
    /// As for building any variant; [`KernelError::UnknownVariable`] when
    /// `configure` sets a parameter the template binds.
    pub fn reconfigure<F>(&self, configure: F) -> Result<KernelVariant, KernelError>
    where
        F: FnOnce(&mut ParameterPatch) -> Result<(), KernelError>,
    {
        let mut configure = Some(configure);
        let mut hook = |patch: &mut ParameterPatch| configure.take().map_or(Ok(()), |f| f(patch));
        let Some(template) = &self.def.origin else {
            return build(&self.def.kernel, &self.def.parameters, &mut hook);
        };
        let schema = template.parameter_schema();
        let mut base = ParameterPatch::new(Arc::clone(schema));
        for name in schema.names() {
            if let Some(value) = self.def.parameters.value(name) {
                base.set_value(name, value.clone())?;
            }
        }
        template.create_variant_from(&base, &mut hook)
    }

    /// Re-badge this variant as created by `template`.
    pub(crate) fn with_template(self, template: Arc<dyn KernelTemplate>) -> Self {
        Self {
            def: Arc::new(VariantDef {
                kernel: self.def.kernel.clone(),
                template_id: template.id().clone(),
                origin: Some(template),
                parameters: self.def.parameters.clone(),
                sizes: self.def.sizes.clone(),
                variables: self.def.variables.clone(),
            }),
        }
    }
}

impl fmt::Debug for KernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelVariant")
            .field("template_id", &self.def.template_id)
            .field("parameters", &self.def.parameters)
            .field("sizes", &self.def.sizes)
            .finish_non_exhaustive()
    }
}

/// Build a variant of `kernel`.
#[instrument(level = "debug", skip_all, fields(kernel = %kernel.id()))]
pub(crate) fn build(
    kernel: &Kernel,
    base: &dyn PartialProvider<ParameterKind>,
    configure: &mut ParameterConfigurator<'_>,
) -> Result<KernelVariant, KernelError> {
    let schema = Arc::clone(kernel.variables().parameters());
    let mut patch = ParameterPatch::new(Arc::clone(&schema));
    patch.apply_patch(base)?;
    for entry in schema.entries() {
        if !patch.has_value(entry.name()) {
            patch.set_value(entry.name(), (entry.init())())?;
        }
    }
    configure(&mut patch)?;
    let parameters = patch.into_storage()?;

    let mut sizes = BTreeMap::new();
    for (name, size) in kernel.variables().vectors() {
        if let Some(width) = resolve_static(name, size, &parameters)? {
            sizes.insert(name.to_string(), width);
        }
    }

    let mut ctx = ConfigurationContext::new(kernel.id(), &parameters, kernel.variables().clone(), sizes);
    kernel.run_configuration(&mut ctx)?;
    let (variables, mut sizes) = ctx.into_parts();

    let mut size_patch = VectorSizePatch::new(Arc::new(variables.vector_size_schema()));
    for (name, size) in variables.vectors() {
        let width = match sizes.remove(name) {
            Some(width) => width,
            None => resolve_static(name, size, &parameters)?.ok_or_else(|| {
                KernelError::MissingVectorSize {
                    name: name.to_string(),
                }
            })?,
        };
        size_patch.set_value(name, width)?;
    }
    let sizes = size_patch.into_storage()?;

    debug!(
        parameters = parameters.len(),
        vectors = sizes.len(),
        "variant configured"
    );
    Ok(KernelVariant {
        def: Arc::new(VariantDef {
            kernel: kernel.clone(),
            template_id: kernel.id().clone(),
            origin: None,
            parameters,
            sizes,
            variables,
        }),
    })
}

/// Width of a constant or parameter-driven vector; `None` when deferred.
fn resolve_static(
    name: &str,
    size: &VectorSize,
    parameters: &ParameterStorage,
) -> Result<Option<usize>, KernelError> {
    match size {
        VectorSize::Value(width) => Ok(Some(*width)),
        VectorSize::Deferred => Ok(None),
        VectorSize::FromParameter(parameter) => {
            let value = parameters
                .try_get(parameter)
                .ok_or_else(|| KernelError::UnknownVariable {
                    kind: VariableKind::Parameter,
                    name: parameter.name().to_string(),
                })?;
            usize::try_from(*value)
                .map(Some)
                .map_err(|_| KernelError::InvalidVectorSize {
                    name: name.to_string(),
                    size: *value,
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::KernelTemplateExt;
    use crate::constraint::Constraint;
    use crate::variable::{ScalarInput, ScalarOutput, VectorInput, VectorOutput};

    fn counted() -> (Kernel, Parameter<i64>, VectorInput) {
        let mut builder = Kernel::builder("test:counted");
        let count = builder.declare(Parameter::new("count", 2_i64).constrained(Constraint::Min(2)));
        let inputs = builder.declare(VectorInput::new("in", &count));
        builder.declare(ScalarOutput::new("out"));
        (builder.build().unwrap(), count, inputs)
    }

    #[test]
    fn vector_size_follows_parameter() {
        let (kernel, count, inputs) = counted();
        let variant = kernel.create_variant(|p| p.set(&count, 5)).unwrap();
        assert_eq!(variant.vector_size(&inputs), 5);
        assert_eq!(*variant.parameter(&count), 5);
        assert_eq!(variant.stage(), KernelStage::Configured);
    }

    #[test]
    fn constraint_violation_names_parameter() {
        let (kernel, count, _) = counted();
        let err = kernel.create_variant(|p| p.set(&count, 1)).unwrap_err();
        assert!(matches!(err, KernelError::ConstraintViolation { ref name, .. } if name == "count"));
    }

    #[test]
    fn negative_width_is_rejected() {
        let mut builder = Kernel::builder("test:negative");
        let width = builder.declare(Parameter::new("width", 1_i64));
        builder.declare(VectorOutput::new("bus", &width));
        let kernel = builder.build().unwrap();
        let err = kernel.create_variant(|p| p.set(&width, -3)).unwrap_err();
        assert_eq!(
            err,
            KernelError::InvalidVectorSize {
                name: "bus".into(),
                size: -3
            }
        );
    }

    #[test]
    fn deferred_vector_needs_hook() {
        let mut builder = Kernel::builder("test:deferred");
        builder.declare(VectorInput::new("in", VectorSize::Deferred));
        let kernel = builder.build().unwrap();
        assert_eq!(
            kernel.default_variant().unwrap_err(),
            KernelError::MissingVectorSize { name: "in".into() }
        );
    }

    #[test]
    fn hook_sizes_deferred_vector_and_declares_conditional_io() {
        let mut builder = Kernel::builder("test:hooked");
        let bits = builder.declare(Parameter::new("bits", 3_i64));
        let data = builder.declare(VectorInput::new("data", VectorSize::Deferred));
        builder.declare(ScalarInput::new("reset"));
        builder.on_configuration(move |ctx| {
            let width = usize::try_from(*ctx.parameter(&bits)).unwrap_or(0) * 2;
            ctx.set_vector_size(&data, width)?;
            ctx.declare(ScalarInput::new("enable"))?;
            ctx.exclude("reset")?;
            Ok(())
        });
        let kernel = builder.build().unwrap();
        let variant = kernel.default_variant().unwrap();
        assert_eq!(variant.sizes().size("data"), Some(6));
        assert!(variant.variables().contains("enable"));
        assert!(!variant.variables().contains("reset"));
        assert!(kernel.variables().contains("reset"));
    }

    #[test]
    fn hook_cannot_declare_parameters() {
        let mut builder = Kernel::builder("test:late-parameter");
        builder.on_configuration(|ctx| {
            ctx.declare(Parameter::new("late", 1_i64))?;
            Ok(())
        });
        let kernel = builder.build().unwrap();
        assert!(matches!(
            kernel.default_variant(),
            Err(KernelError::WrongKind { ref name, .. }) if name == "late"
        ));
    }

    #[test]
    fn hook_errors_propagate() {
        let mut builder = Kernel::builder("test:failing");
        builder.on_configuration(|_| Err(KernelError::hook("configuration", "unsupported")));
        let kernel = builder.build().unwrap();
        assert!(matches!(kernel.default_variant(), Err(KernelError::Hook { .. })));
    }

    #[test]
    fn invalid_default_fails_variant() {
        let mut builder = Kernel::builder("test:bad-default");
        builder.declare(Parameter::new("n", 0_i64).constrained(Constraint::Min(1)));
        let kernel = builder.build().unwrap();
        assert!(matches!(
            kernel.default_variant(),
            Err(KernelError::ConstraintViolation { ref name, .. }) if name == "n"
        ));
    }

    #[test]
    fn unknown_override_is_rejected() {
        let (kernel, _, _) = counted();
        let stranger = Parameter::new("stranger", 1_i64);
        assert!(matches!(
            kernel.create_variant(|p| p.set(&stranger, 3)),
            Err(KernelError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn reconfigure_starts_from_current_values() {
        let (kernel, count, inputs) = counted();
        let first = kernel.create_variant(|p| p.set(&count, 4)).unwrap();
        let unchanged = first.reconfigure(|_| Ok(())).unwrap();
        assert_eq!(unchanged.vector_size(&inputs), 4);
        let second = first.reconfigure(|p| p.set(&count, 7)).unwrap();
        assert_eq!(second.vector_size(&inputs), 7);
        assert_eq!(first.vector_size(&inputs), 4);
    }

    #[test]
    fn out_of_range_default_needs_a_base_value() {
        let mut builder = Kernel::builder("test:bad-default");
        let depth = builder.declare(Parameter::new("depth", 0_i64).constrained(Constraint::Min(1)));
        let kernel = builder.build().unwrap();

        assert!(matches!(
            kernel.create_variant(|p| p.set(&depth, 4)),
            Err(KernelError::ConstraintViolation { ref name, .. }) if name == "depth"
        ));

        let mut base = kernel.parameter_patch();
        base.set(&depth, 4).unwrap();
        let variant = kernel
            .create_variant_from(&base, &mut |_: &mut ParameterPatch| Ok(()))
            .unwrap();
        assert_eq!(*variant.parameter(&depth), 4);
    }
}
