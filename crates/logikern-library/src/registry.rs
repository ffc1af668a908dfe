//! [`KernelRegistry`] – kernel templates indexed by id.
//!
//! A simulator resolves component types through the registry: it looks a
//! template up by the id stored in a design file and creates a variant from
//! the parameter values stored next to it.
//!
//! # Example
//!
//! ```rust
//! use logikern_kernel::prelude::*;
//! use logikern_library::KernelRegistry;
//!
//! let registry = KernelRegistry::standard().unwrap();
//! let and2 = registry.default_variant("logic:and2").unwrap();
//! assert_eq!(and2.sizes().size("in"), Some(2));
//! assert!(registry.default_variant("logic:mux").is_err());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use logikern_kernel::prelude::*;
use logikern_kernel::schema::ParameterKind;
use tracing::{debug, warn};

use crate::gate::{GateOp, fixed_gate, gate};
use crate::{buffer, clock, constant, flip_flop, memory};

/// Registry of kernel templates keyed by their id.
///
/// Construct with [`KernelRegistry::new`] or
/// [`KernelRegistry::standard`], register templates, then create variants
/// by id.  Cloning is cheap: templates are shared.
#[derive(Default, Clone)]
pub struct KernelRegistry {
    templates: HashMap<String, Arc<dyn KernelTemplate>>,
}

impl KernelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every kernel of this crate.
    ///
    /// # Errors
    ///
    /// Propagates a failure to declare any of the library kernels.
    pub fn standard() -> Result<Self, KernelError> {
        let mut registry = Self::new();
        registry.register(constant::constant()?.kernel);
        registry.register(buffer::buffer()?.kernel);
        registry.register(buffer::not()?.kernel);
        for op in GateOp::ALL {
            registry.register(gate(op)?.kernel);
            registry.register(fixed_gate(op, 2)?);
        }
        registry.register(clock::clock()?.kernel);
        registry.register(flip_flop::d_flip_flop()?.kernel);
        registry.register(memory::memory()?.kernel);
        registry.register(memory::rom()?);
        debug!(kernels = registry.len(), "standard library registered");
        Ok(registry)
    }

    /// Register a template.  Any template previously registered with the
    /// same id is replaced and returned.
    pub fn register<T: KernelTemplate + 'static>(&mut self, template: T) -> Option<Arc<dyn KernelTemplate>> {
        self.register_shared(Arc::new(template))
    }

    /// [`KernelRegistry::register`] for a template that is already shared.
    pub fn register_shared(&mut self, template: Arc<dyn KernelTemplate>) -> Option<Arc<dyn KernelTemplate>> {
        let id = template.id().to_string();
        let previous = self.templates.insert(id.clone(), template);
        if previous.is_some() {
            warn!(kernel = %id, "replaced registered kernel");
        }
        previous
    }

    /// Remove the template registered as `id`.
    pub fn unregister(&mut self, id: &str) -> Option<Arc<dyn KernelTemplate>> {
        self.templates.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn KernelTemplate>> {
        self.templates.get(id)
    }

    /// Like [`KernelRegistry::get`], for callers that propagate errors.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownKernel`] when nothing is registered as `id`.
    pub fn template(&self, id: &str) -> Result<&Arc<dyn KernelTemplate>, KernelError> {
        self.templates
            .get(id)
            .ok_or_else(|| KernelError::UnknownKernel { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Registered ids in lexicographic order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of the templates carrying `tag`, in lexicographic order.
    pub fn tagged(&self, tag: &str) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .templates
            .iter()
            .filter(|(_, template)| template.has_tag(tag))
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Variant of `id` with every parameter at its default.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownKernel`], or any error of the variant pipeline.
    pub fn default_variant(&self, id: &str) -> Result<KernelVariant, KernelError> {
        self.template(id)?.default_variant()
    }

    /// Variant of `id` with the overrides made by `configure`.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownKernel`], or any error of the variant pipeline.
    pub fn create_variant<F>(&self, id: &str, configure: F) -> Result<KernelVariant, KernelError>
    where
        F: FnOnce(&mut ParameterPatch) -> Result<(), KernelError>,
    {
        self.template(id)?.create_variant(configure)
    }

    /// Variant of `id` from stored parameter values.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownKernel`], or any error of the variant pipeline.
    pub fn create_variant_from(
        &self,
        id: &str,
        parameters: &dyn PartialProvider<ParameterKind>,
    ) -> Result<KernelVariant, KernelError> {
        self.template(id)?
            .create_variant_from(parameters, &mut |_: &mut ParameterPatch| Ok(()))
    }
}

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelRegistry").field("ids", &self.ids()).finish()
    }
}
