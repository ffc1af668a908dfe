//! Per-kind variable schemas.
//!
//! A [`KindSchema<K>`] is the ordered list of variables of one [`Kind`]
//! declared on a kernel, each with a validator and an initializer.  Every
//! patch and storage in [`provider`][crate::provider] carries the schema it
//! was built for; unknown names and completeness are judged against it.
//!
//! [`VariableSet`] bundles the five declared kinds and enforces that a name
//! is used only once across all of them.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use logikern_types::{KernelError, Signal, VariableKind};

use crate::context::{InitScope, SettingScope};
use crate::value::AnyValue;
use crate::variable::{OutputInitializer, Shape, VectorSize};

// ────────────────────────────────────────────────────────────────────────────
// Kinds
// ────────────────────────────────────────────────────────────────────────────

/// Compile-time tag for one variable kind: what a stored value looks like
/// and how a default is produced.
pub trait Kind: Send + Sync + 'static {
    const KIND: VariableKind;

    /// Stored representation of one variable's value.
    type Slot: Clone + fmt::Debug + PartialEq + Send + Sync;

    /// Declaration data used to produce the default value.
    type Init: Clone + Send + Sync;
}

pub type Validator<S> = Arc<dyn Fn(&S) -> Result<(), KernelError> + Send + Sync>;
pub type ParameterInit = Arc<dyn Fn() -> AnyValue + Send + Sync>;
pub type SettingInit = Arc<dyn Fn(&SettingScope<'_>) -> AnyValue + Send + Sync>;
pub type FieldInit = Option<Arc<dyn Fn(&InitScope<'_>) -> AnyValue + Send + Sync>>;

/// Shape and initial value of a declared output.
#[derive(Clone, Debug)]
pub struct OutputSpec {
    pub shape: Shape,
    pub initializer: OutputInitializer,
}

#[derive(Debug, Clone, Copy)]
pub struct ParameterKind;

#[derive(Debug, Clone, Copy)]
pub struct SettingKind;

#[derive(Debug, Clone, Copy)]
pub struct FieldKind;

#[derive(Debug, Clone, Copy)]
pub struct InputKind;

#[derive(Debug, Clone, Copy)]
pub struct OutputKind;

#[derive(Debug, Clone, Copy)]
pub struct VectorSizeKind;

impl Kind for ParameterKind {
    const KIND: VariableKind = VariableKind::Parameter;
    type Slot = AnyValue;
    type Init = ParameterInit;
}

impl Kind for SettingKind {
    const KIND: VariableKind = VariableKind::Setting;
    type Slot = AnyValue;
    type Init = SettingInit;
}

impl Kind for FieldKind {
    const KIND: VariableKind = VariableKind::Field;
    type Slot = AnyValue;
    type Init = FieldInit;
}

impl Kind for InputKind {
    const KIND: VariableKind = VariableKind::Input;
    type Slot = Vec<Signal>;
    type Init = Shape;
}

impl Kind for OutputKind {
    const KIND: VariableKind = VariableKind::Output;
    type Slot = Vec<Signal>;
    type Init = OutputSpec;
}

impl Kind for VectorSizeKind {
    const KIND: VariableKind = VariableKind::VectorSize;
    type Slot = usize;
    type Init = VectorSize;
}

// ────────────────────────────────────────────────────────────────────────────
// SchemaEntry
// ────────────────────────────────────────────────────────────────────────────

/// One declared variable of kind `K`.
pub struct SchemaEntry<K: Kind> {
    name: Arc<str>,
    value_type: &'static str,
    validator: Validator<K::Slot>,
    init: K::Init,
}

impl<K: Kind> SchemaEntry<K> {
    pub(crate) fn new(
        name: Arc<str>,
        value_type: &'static str,
        validator: Validator<K::Slot>,
        init: K::Init,
    ) -> Self {
        Self {
            name,
            value_type,
            validator,
            init,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name of the values this variable holds.
    pub fn value_type(&self) -> &'static str {
        self.value_type
    }

    /// Run the declaration's type and constraint checks against `slot`.
    pub fn validate(&self, slot: &K::Slot) -> Result<(), KernelError> {
        (self.validator)(slot)
    }

    pub fn init(&self) -> &K::Init {
        &self.init
    }
}

impl<K: Kind> Clone for SchemaEntry<K> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            value_type: self.value_type,
            validator: Arc::clone(&self.validator),
            init: self.init.clone(),
        }
    }
}

impl<K: Kind> fmt::Debug for SchemaEntry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaEntry")
            .field("kind", &K::KIND)
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// KindSchema
// ────────────────────────────────────────────────────────────────────────────

/// The declared variables of kind `K`, in declaration order.
pub struct KindSchema<K: Kind> {
    entries: Vec<SchemaEntry<K>>,
}

impl<K: Kind> KindSchema<K> {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn entry(&self, name: &str) -> Option<&SchemaEntry<K>> {
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(SchemaEntry::name)
    }

    pub fn entries(&self) -> &[SchemaEntry<K>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate `slot` as the value of `name`.
    ///
    /// # Errors
    ///
    /// [`KernelError::UnknownVariable`] when `name` is not part of this
    /// schema, otherwise whatever the declaration's validator reports.
    pub fn validate(&self, name: &str, slot: &K::Slot) -> Result<(), KernelError> {
        match self.entry(name) {
            Some(entry) => entry.validate(slot),
            None => Err(KernelError::UnknownVariable {
                kind: K::KIND,
                name: name.to_string(),
            }),
        }
    }

    pub(crate) fn insert(&mut self, entry: SchemaEntry<K>) -> Result<(), KernelError> {
        if self.contains(entry.name()) {
            return Err(KernelError::DuplicateVariable {
                name: entry.name().to_string(),
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub(crate) fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name() != name);
        self.entries.len() != before
    }

    /// Copy of this schema without the variables listed in `names`.
    pub fn without<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let excluded: BTreeSet<&str> = names.into_iter().collect();
        Self {
            entries: self
                .entries
                .iter()
                .filter(|e| !excluded.contains(e.name()))
                .cloned()
                .collect(),
        }
    }
}

impl<K: Kind> Default for KindSchema<K> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K: Kind> Clone for KindSchema<K> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<K: Kind> fmt::Debug for KindSchema<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindSchema")
            .field("kind", &K::KIND)
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// VariableSet
// ────────────────────────────────────────────────────────────────────────────

/// Summary of one declared variable, for introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub name: String,
    pub kind: VariableKind,
    pub value_type: &'static str,
    /// `true` for vector inputs and outputs.
    pub vector: bool,
}

/// Every variable declared on a kernel (or narrowed for a variant), grouped
/// by kind.  Names are unique across kinds.
#[derive(Clone, Debug, Default)]
pub struct VariableSet {
    parameters: Arc<KindSchema<ParameterKind>>,
    settings: Arc<KindSchema<SettingKind>>,
    fields: Arc<KindSchema<FieldKind>>,
    inputs: Arc<KindSchema<InputKind>>,
    outputs: Arc<KindSchema<OutputKind>>,
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parameters(&self) -> &Arc<KindSchema<ParameterKind>> {
        &self.parameters
    }

    pub fn settings(&self) -> &Arc<KindSchema<SettingKind>> {
        &self.settings
    }

    pub fn fields(&self) -> &Arc<KindSchema<FieldKind>> {
        &self.fields
    }

    pub fn inputs(&self) -> &Arc<KindSchema<InputKind>> {
        &self.inputs
    }

    pub fn outputs(&self) -> &Arc<KindSchema<OutputKind>> {
        &self.outputs
    }

    /// Kind of the variable called `name`, if declared.
    pub fn kind_of(&self, name: &str) -> Option<VariableKind> {
        if self.parameters.contains(name) {
            Some(VariableKind::Parameter)
        } else if self.settings.contains(name) {
            Some(VariableKind::Setting)
        } else if self.fields.contains(name) {
            Some(VariableKind::Field)
        } else if self.inputs.contains(name) {
            Some(VariableKind::Input)
        } else if self.outputs.contains(name) {
            Some(VariableKind::Output)
        } else {
            None
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kind_of(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
            + self.settings.len()
            + self.fields.len()
            + self.inputs.len()
            + self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_free(&self, name: &str) -> Result<(), KernelError> {
        if self.contains(name) {
            Err(KernelError::DuplicateVariable {
                name: name.to_string(),
            })
        } else {
            Ok(())
        }
    }

    pub(crate) fn insert_parameter(
        &mut self,
        entry: SchemaEntry<ParameterKind>,
    ) -> Result<(), KernelError> {
        self.ensure_free(entry.name())?;
        Arc::make_mut(&mut self.parameters).insert(entry)
    }

    pub(crate) fn insert_setting(&mut self, entry: SchemaEntry<SettingKind>) -> Result<(), KernelError> {
        self.ensure_free(entry.name())?;
        Arc::make_mut(&mut self.settings).insert(entry)
    }

    pub(crate) fn insert_field(&mut self, entry: SchemaEntry<FieldKind>) -> Result<(), KernelError> {
        self.ensure_free(entry.name())?;
        Arc::make_mut(&mut self.fields).insert(entry)
    }

    pub(crate) fn insert_input(&mut self, entry: SchemaEntry<InputKind>) -> Result<(), KernelError> {
        self.ensure_free(entry.name())?;
        Arc::make_mut(&mut self.inputs).insert(entry)
    }

    pub(crate) fn insert_output(&mut self, entry: SchemaEntry<OutputKind>) -> Result<(), KernelError> {
        self.ensure_free(entry.name())?;
        Arc::make_mut(&mut self.outputs).insert(entry)
    }

    /// Remove a setting, field, input or output.  Parameters cannot be
    /// removed once declared.
    pub(crate) fn remove(&mut self, name: &str) -> Result<VariableKind, KernelError> {
        match self.kind_of(name) {
            Some(VariableKind::Setting) => {
                Arc::make_mut(&mut self.settings).remove(name);
                Ok(VariableKind::Setting)
            }
            Some(VariableKind::Field) => {
                Arc::make_mut(&mut self.fields).remove(name);
                Ok(VariableKind::Field)
            }
            Some(VariableKind::Input) => {
                Arc::make_mut(&mut self.inputs).remove(name);
                Ok(VariableKind::Input)
            }
            Some(VariableKind::Output) => {
                Arc::make_mut(&mut self.outputs).remove(name);
                Ok(VariableKind::Output)
            }
            Some(kind) => Err(KernelError::WrongKind {
                name: name.to_string(),
                expected: VariableKind::Input,
                actual: kind,
            }),
            None => Err(KernelError::UnknownVariable {
                kind: VariableKind::Input,
                name: name.to_string(),
            }),
        }
    }

    /// Copy of this set without the listed parameters.
    pub(crate) fn without_parameters<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            parameters: Arc::new(self.parameters.without(names)),
            ..self.clone()
        }
    }

    /// Every vector input and output with its size declaration.
    pub fn vectors(&self) -> Vec<(&str, &VectorSize)> {
        let inputs = self.inputs.entries().iter().filter_map(|e| match e.init() {
            Shape::Vector(size) => Some((e.name(), size)),
            Shape::Scalar => None,
        });
        let outputs = self.outputs.entries().iter().filter_map(|e| match &e.init().shape {
            Shape::Vector(size) => Some((e.name(), size)),
            Shape::Scalar => None,
        });
        inputs.chain(outputs).collect()
    }

    /// Schema with one entry per vector input/output.
    pub(crate) fn vector_size_schema(&self) -> KindSchema<VectorSizeKind> {
        let mut schema = KindSchema::empty();
        for (name, size) in self.vectors() {
            // Names are unique across the set, so insertion cannot collide.
            let _ = schema.insert(SchemaEntry::<VectorSizeKind>::new(
                Arc::from(name),
                "usize",
                Arc::new(|_: &usize| -> Result<(), KernelError> { Ok(()) }),
                size.clone(),
            ));
        }
        schema
    }

    /// Describe every variable: parameters, settings, fields, inputs, then
    /// outputs, each in declaration order.
    pub fn infos(&self) -> Vec<VariableInfo> {
        fn describe<'a, K: Kind>(
            schema: &'a KindSchema<K>,
            vector: impl Fn(&SchemaEntry<K>) -> bool + 'a,
        ) -> impl Iterator<Item = VariableInfo> + 'a {
            schema.entries().iter().map(move |e| VariableInfo {
                name: e.name().to_string(),
                kind: K::KIND,
                value_type: e.value_type(),
                vector: vector(e),
            })
        }

        describe(&self.parameters, |_| false)
            .chain(describe(&self.settings, |_| false))
            .chain(describe(&self.fields, |_| false))
            .chain(describe(&self.inputs, |e| e.init().is_vector()))
            .chain(describe(&self.outputs, |e| e.init().shape.is_vector()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{
        Declare, Field, Parameter, ScalarInput, ScalarOutput, Setting, VectorInput, VectorOutput,
    };

    fn sample_set() -> VariableSet {
        let mut set = VariableSet::new();
        Parameter::new("width", 4_i64).register(&mut set).unwrap();
        Setting::new("delay", 1_u32).register(&mut set).unwrap();
        Field::new("count", 0_u64).register(&mut set).unwrap();
        VectorInput::new("in", 4).register(&mut set).unwrap();
        ScalarInput::new("enable").register(&mut set).unwrap();
        ScalarOutput::new("out").register(&mut set).unwrap();
        VectorOutput::new("bus", 8).register(&mut set).unwrap();
        set
    }

    #[test]
    fn names_are_unique_across_kinds() {
        let mut set = sample_set();
        let err = ScalarOutput::new("width").register(&mut set).unwrap_err();
        assert_eq!(
            err,
            KernelError::DuplicateVariable {
                name: "width".into()
            }
        );
        assert_eq!(set.len(), 7);
    }

    #[test]
    fn kind_of_reports_each_kind() {
        let set = sample_set();
        assert_eq!(set.kind_of("width"), Some(VariableKind::Parameter));
        assert_eq!(set.kind_of("delay"), Some(VariableKind::Setting));
        assert_eq!(set.kind_of("count"), Some(VariableKind::Field));
        assert_eq!(set.kind_of("enable"), Some(VariableKind::Input));
        assert_eq!(set.kind_of("bus"), Some(VariableKind::Output));
        assert_eq!(set.kind_of("ghost"), None);
    }

    #[test]
    fn parameters_cannot_be_removed() {
        let mut set = sample_set();
        assert!(matches!(
            set.remove("width"),
            Err(KernelError::WrongKind { .. })
        ));
        assert_eq!(set.remove("enable"), Ok(VariableKind::Input));
        assert!(!set.contains("enable"));
        assert!(matches!(
            set.remove("enable"),
            Err(KernelError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn removal_does_not_touch_clones() {
        let original = sample_set();
        let mut narrowed = original.clone();
        narrowed.remove("out").unwrap();
        assert!(original.contains("out"));
        assert!(!narrowed.contains("out"));
    }

    #[test]
    fn vectors_lists_inputs_then_outputs() {
        let set = sample_set();
        let names: Vec<_> = set.vectors().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["in", "bus"]);
        let schema = set.vector_size_schema();
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["in", "bus"]);
    }

    #[test]
    fn infos_follow_kind_then_declaration_order() {
        let infos = sample_set().infos();
        let summary: Vec<_> = infos.iter().map(|i| (i.name.as_str(), i.kind, i.vector)).collect();
        assert_eq!(
            summary,
            vec![
                ("width", VariableKind::Parameter, false),
                ("delay", VariableKind::Setting, false),
                ("count", VariableKind::Field, false),
                ("in", VariableKind::Input, true),
                ("enable", VariableKind::Input, false),
                ("out", VariableKind::Output, false),
                ("bus", VariableKind::Output, true),
            ]
        );
        assert_eq!(infos[0].value_type, "i64");
    }

    #[test]
    fn without_filters_entries() {
        let set = sample_set();
        let reduced = set.without_parameters(["width"]);
        assert!(reduced.parameters().is_empty());
        assert!(set.parameters().contains("width"));
    }

    #[test]
    fn validate_unknown_name() {
        let set = sample_set();
        let err = set
            .parameters()
            .validate("ghost", &AnyValue::new(1_i64))
            .unwrap_err();
        assert!(matches!(
            err,
            KernelError::UnknownVariable {
                kind: VariableKind::Parameter,
                ..
            }
        ));
    }
}
