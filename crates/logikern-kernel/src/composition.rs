//! Kernel composition.
//!
//! Everything that can produce a [`KernelVariant`] implements
//! [`KernelTemplate`]: plain [`Kernel`]s, [`WrappedKernel`]s that re-badge
//! another template, and [`SpecializedKernel`]s that pre-bind some of its
//! parameters.
//!
//! # Example
//!
//! ```
//! use logikern_kernel::prelude::*;
//!
//! let mut builder = Kernel::builder("demo:gate");
//! let inputs = builder.declare(Parameter::new("inputs", 2_i64).constrained(Constraint::Min(2)));
//! builder.declare(VectorInput::new("in", &inputs));
//! let gate = builder.build().unwrap();
//!
//! let gate3 = gate.specialize(|p| p.set(&inputs, 3)).unwrap().with_id("demo:gate3");
//! assert!(!gate3.variables().contains("inputs"));
//! let variant = gate3.default_variant().unwrap();
//! assert_eq!(variant.sizes().size("in"), Some(3));
//! assert_eq!(variant.template_id().as_str(), "demo:gate3");
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use logikern_types::{Id, KernelError};
use tracing::debug;

use crate::kernel::Kernel;
use crate::provider::{ParameterPatch, PartialProvider};
use crate::schema::{KindSchema, ParameterKind, VariableSet};
use crate::variant::{self, KernelVariant, ParameterConfigurator};

// ────────────────────────────────────────────────────────────────────────────
// KernelTemplate
// ────────────────────────────────────────────────────────────────────────────

/// Anything variants can be created from.
///
/// The trait is object safe; generic conveniences live in
/// [`KernelTemplateExt`].
pub trait KernelTemplate: Send + Sync {
    fn id(&self) -> &Id;

    fn tags(&self) -> &BTreeSet<Id>;

    fn properties(&self) -> &BTreeMap<Id, String>;

    /// Variables visible to callers of this template.
    fn variables(&self) -> &VariableSet;

    /// Parameters a caller may set.
    fn parameter_schema(&self) -> &Arc<KindSchema<ParameterKind>> {
        self.variables().parameters()
    }

    /// Build a variant from `base` values and the caller's `configure` hook.
    ///
    /// # Errors
    ///
    /// Any error of the variant pipeline, including
    /// [`KernelError::UnknownVariable`] for parameters this template hides.
    fn create_variant_from(
        &self,
        base: &dyn PartialProvider<ParameterKind>,
        configure: &mut ParameterConfigurator<'_>,
    ) -> Result<KernelVariant, KernelError>;

    fn has_tag(&self, tag: &str) -> bool {
        self.tags().iter().any(|t| t.as_str() == tag)
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.properties()
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Convenience methods for every [`KernelTemplate`].
pub trait KernelTemplateExt: KernelTemplate {
    /// Variant with every parameter at its default.
    ///
    /// # Errors
    ///
    /// As for [`KernelTemplate::create_variant_from`].
    fn default_variant(&self) -> Result<KernelVariant, KernelError> {
        self.create_variant(|_| Ok(()))
    }

    /// Variant with the overrides made by `configure`.
    ///
    /// # Errors
    ///
    /// As for [`KernelTemplate::create_variant_from`].
    fn create_variant<F>(&self, configure: F) -> Result<KernelVariant, KernelError>
    where
        F: FnOnce(&mut ParameterPatch) -> Result<(), KernelError>,
    {
        let base = ParameterPatch::new(Arc::clone(self.parameter_schema()));
        let mut configure = Some(configure);
        self.create_variant_from(&base, &mut |patch: &mut ParameterPatch| {
            configure.take().map_or(Ok(()), |f| f(patch))
        })
    }

    /// Empty patch over this template's parameters.
    fn parameter_patch(&self) -> ParameterPatch {
        ParameterPatch::new(Arc::clone(self.parameter_schema()))
    }
}

impl<T: KernelTemplate + ?Sized> KernelTemplateExt for T {}

impl KernelTemplate for Kernel {
    fn id(&self) -> &Id {
        Kernel::id(self)
    }

    fn tags(&self) -> &BTreeSet<Id> {
        Kernel::tags(self)
    }

    fn properties(&self) -> &BTreeMap<Id, String> {
        Kernel::properties(self)
    }

    fn variables(&self) -> &VariableSet {
        Kernel::variables(self)
    }

    fn create_variant_from(
        &self,
        base: &dyn PartialProvider<ParameterKind>,
        configure: &mut ParameterConfigurator<'_>,
    ) -> Result<KernelVariant, KernelError> {
        variant::build(self, base, configure)
    }
}

impl<T: KernelTemplate + ?Sized> KernelTemplate for Arc<T> {
    fn id(&self) -> &Id {
        (**self).id()
    }

    fn tags(&self) -> &BTreeSet<Id> {
        (**self).tags()
    }

    fn properties(&self) -> &BTreeMap<Id, String> {
        (**self).properties()
    }

    fn variables(&self) -> &VariableSet {
        (**self).variables()
    }

    fn parameter_schema(&self) -> &Arc<KindSchema<ParameterKind>> {
        (**self).parameter_schema()
    }

    fn create_variant_from(
        &self,
        base: &dyn PartialProvider<ParameterKind>,
        configure: &mut ParameterConfigurator<'_>,
    ) -> Result<KernelVariant, KernelError> {
        (**self).create_variant_from(base, configure)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// WrappedKernel
// ────────────────────────────────────────────────────────────────────────────

/// Delegates to an inner template under a different id, with extra tags and
/// properties.
#[derive(Clone)]
pub struct WrappedKernel<K> {
    inner: K,
    id: Id,
    tags: BTreeSet<Id>,
    properties: BTreeMap<Id, String>,
}

impl<K: KernelTemplate> WrappedKernel<K> {
    /// Wrap `inner`, starting from its own id, tags and properties.
    pub fn new(inner: K) -> Self {
        Self {
            id: inner.id().clone(),
            tags: inner.tags().clone(),
            properties: inner.properties().clone(),
            inner,
        }
    }

    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<Id>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<Id>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn inner(&self) -> &K {
        &self.inner
    }
}

impl<K: KernelTemplate + Clone + 'static> KernelTemplate for WrappedKernel<K> {
    fn id(&self) -> &Id {
        &self.id
    }

    fn tags(&self) -> &BTreeSet<Id> {
        &self.tags
    }

    fn properties(&self) -> &BTreeMap<Id, String> {
        &self.properties
    }

    fn variables(&self) -> &VariableSet {
        self.inner.variables()
    }

    fn parameter_schema(&self) -> &Arc<KindSchema<ParameterKind>> {
        self.inner.parameter_schema()
    }

    fn create_variant_from(
        &self,
        base: &dyn PartialProvider<ParameterKind>,
        configure: &mut ParameterConfigurator<'_>,
    ) -> Result<KernelVariant, KernelError> {
        let variant = self.inner.create_variant_from(base, configure)?;
        Ok(variant.with_template(Arc::new(self.clone())))
    }
}

impl<K> fmt::Debug for WrappedKernel<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedKernel")
            .field("id", &self.id)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SpecializedKernel
// ────────────────────────────────────────────────────────────────────────────

/// An inner template with some parameters bound.
///
/// Bound parameters are hidden: they are absent from
/// [`KernelTemplate::variables`] and [`KernelTemplate::parameter_schema`],
/// and a caller that tries to set one gets [`KernelError::UnknownVariable`].
#[derive(Clone)]
pub struct SpecializedKernel {
    inner: Arc<dyn KernelTemplate>,
    id: Id,
    tags: BTreeSet<Id>,
    properties: BTreeMap<Id, String>,
    bound: ParameterPatch,
    variables: VariableSet,
}

impl SpecializedKernel {
    /// Bind every value present in `bound` on `inner`.
    ///
    /// # Errors
    ///
    /// When a bound value is unknown to `inner` or invalid for it.
    pub fn new(
        inner: Arc<dyn KernelTemplate>,
        bound: &dyn PartialProvider<ParameterKind>,
    ) -> Result<Self, KernelError> {
        let mut patch = ParameterPatch::new(Arc::clone(inner.parameter_schema()));
        patch.apply_patch(bound)?;
        Ok(Self::assemble(inner, patch))
    }

    /// Bind the values `configure` sets on a patch over `inner`'s
    /// parameters.
    ///
    /// # Errors
    ///
    /// Whatever `configure` reports.
    pub fn from_template<F>(inner: Arc<dyn KernelTemplate>, configure: F) -> Result<Self, KernelError>
    where
        F: FnOnce(&mut ParameterPatch) -> Result<(), KernelError>,
    {
        let mut patch = ParameterPatch::new(Arc::clone(inner.parameter_schema()));
        configure(&mut patch)?;
        Ok(Self::assemble(inner, patch))
    }

    fn assemble(inner: Arc<dyn KernelTemplate>, bound: ParameterPatch) -> Self {
        let names: Vec<&str> = bound.present().into_iter().map(|(name, _)| name).collect();
        let variables = inner.variables().without_parameters(names);
        debug!(kernel = %inner.id(), bound = bound.len(), "kernel specialized");
        Self {
            id: inner.id().clone(),
            tags: inner.tags().clone(),
            properties: inner.properties().clone(),
            inner,
            bound,
            variables,
        }
    }

    /// Bind more of the still-visible parameters.
    ///
    /// # Errors
    ///
    /// Whatever `configure` reports; bound parameters are unknown to the
    /// patch it receives.
    pub fn specialize<F>(&self, configure: F) -> Result<Self, KernelError>
    where
        F: FnOnce(&mut ParameterPatch) -> Result<(), KernelError>,
    {
        let mut patch = ParameterPatch::new(Arc::clone(self.variables.parameters()));
        configure(&mut patch)?;
        self.specialize_with(&patch)
    }

    /// Merge raw bindings into this kernel's; values in `patch` replace
    /// earlier bindings of the same name.
    ///
    /// # Errors
    ///
    /// When a value is unknown to the inner template or invalid for it.
    pub fn specialize_with(&self, patch: &dyn PartialProvider<ParameterKind>) -> Result<Self, KernelError> {
        let mut bound = self.bound.clone();
        bound.apply_patch(patch)?;
        let mut specialized = Self::assemble(Arc::clone(&self.inner), bound);
        specialized.id = self.id.clone();
        specialized.tags = self.tags.clone();
        specialized.properties = self.properties.clone();
        Ok(specialized)
    }

    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<Id>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<Id>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The bound parameter values.
    pub fn bound(&self) -> &ParameterPatch {
        &self.bound
    }

    pub fn inner(&self) -> &Arc<dyn KernelTemplate> {
        &self.inner
    }
}

impl KernelTemplate for SpecializedKernel {
    fn id(&self) -> &Id {
        &self.id
    }

    fn tags(&self) -> &BTreeSet<Id> {
        &self.tags
    }

    fn properties(&self) -> &BTreeMap<Id, String> {
        &self.properties
    }

    fn variables(&self) -> &VariableSet {
        &self.variables
    }

    fn create_variant_from(
        &self,
        base: &dyn PartialProvider<ParameterKind>,
        configure: &mut ParameterConfigurator<'_>,
    ) -> Result<KernelVariant, KernelError> {
        let mut overrides = ParameterPatch::new(Arc::clone(self.variables.parameters()));
        overrides.apply_patch(base)?;
        configure(&mut overrides)?;

        let mut merged = ParameterPatch::new(Arc::clone(self.inner.parameter_schema()));
        merged.apply_patch(&overrides)?;
        merged.apply_patch(&self.bound)?;

        let variant = self
            .inner
            .create_variant_from(&merged, &mut |_: &mut ParameterPatch| Ok(()))?;
        Ok(variant.with_template(Arc::new(self.clone())))
    }
}

impl fmt::Debug for SpecializedKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecializedKernel")
            .field("id", &self.id)
            .field("inner", &self.inner.id())
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}
