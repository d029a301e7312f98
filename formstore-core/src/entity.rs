//! Entity schemas: the static description of business objects.
//!
//! An [`Entity`] is declared once (usually in a `LazyLock`) and shared by
//! every store built from it. Entities are immutable after
//! [`EntityBuilder::build`] and are always handled through `Arc`.
//!
//! ```
//! use formstore_core::{Entity, FieldEntry, FieldType};
//!
//! let address = Entity::builder("Address")
//!     .field(FieldEntry::builder("city", FieldType::String))
//!     .build()
//!     .unwrap();
//!
//! let person = Entity::builder("Person")
//!     .field(FieldEntry::builder("firstName", FieldType::String).required(true))
//!     .object("address", address)
//!     .recursive_list("children")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(person.len(), 3);
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SchemaError, SchemaResult};
use crate::validation::Validator;

/// Scalar kind of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Text value.
    String,
    /// Numeric value.
    Number,
    /// Boolean value.
    Boolean,
    /// Application-defined value type (dates, codes, nested JSON...).
    Custom(String),
}

/// Formats a field value for read-only display.
pub type DisplayFormatter = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Shared behaviour of a family of fields: validators and formatting.
#[derive(Clone, Default)]
pub struct Domain {
    name: String,
    validators: Vec<Validator>,
    display_formatter: Option<DisplayFormatter>,
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("name", &self.name)
            .field("validators", &self.validators)
            .field("display_formatter", &self.display_formatter.is_some())
            .finish()
    }
}

impl Domain {
    /// Create a domain without validators.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append a validator. Validators run in declaration order.
    #[must_use]
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Set the display formatter.
    #[must_use]
    pub fn display_formatter(mut self, f: impl Fn(&Value) -> String + Send + Sync + 'static) -> Self {
        self.display_formatter = Some(Arc::new(f));
        self
    }

    /// Domain name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validators in application order.
    #[must_use]
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Render a value through the formatter, or plainly if there is none.
    #[must_use]
    pub fn format(&self, value: &Value) -> String {
        match &self.display_formatter {
            Some(formatter) => formatter(value),
            None => match value {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        }
    }
}

/// Metadata of a scalar field.
#[derive(Debug, Clone)]
pub struct FieldEntry {
    name: String,
    label: String,
    field_type: FieldType,
    domain: Arc<Domain>,
    is_required: bool,
    comment: Option<String>,
}

impl FieldEntry {
    /// Start declaring a field.
    #[must_use]
    pub fn builder(name: impl Into<String>, field_type: FieldType) -> FieldEntryBuilder {
        let name = name.into();
        FieldEntryBuilder {
            label: name.clone(),
            name,
            field_type,
            domain: Arc::new(Domain::default()),
            is_required: false,
            comment: None,
        }
    }

    /// Builder pre-filled with this entry, to derive a modified copy.
    #[must_use]
    pub fn to_builder(&self) -> FieldEntryBuilder {
        FieldEntryBuilder {
            name: self.name.clone(),
            label: self.label.clone(),
            field_type: self.field_type.clone(),
            domain: Arc::clone(&self.domain),
            is_required: self.is_required,
            comment: self.comment.clone(),
        }
    }

    /// Copy of this entry with the given overrides applied.
    #[must_use]
    pub fn with_metadata(&self, metadata: FieldMetadata) -> Self {
        self.to_builder().metadata(metadata).build()
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Scalar kind.
    #[must_use]
    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// Domain (validators, formatter).
    #[must_use]
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// Whether an empty value is a validation error.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.is_required
    }

    /// Optional help text.
    #[must_use]
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Render a value for display. `None` renders as an empty string.
    #[must_use]
    pub fn display(&self, value: Option<&Value>) -> String {
        value.map(|v| self.domain.format(v)).unwrap_or_default()
    }
}

/// Fluent declaration of a [`FieldEntry`].
#[derive(Debug, Clone)]
pub struct FieldEntryBuilder {
    name: String,
    label: String,
    field_type: FieldType,
    domain: Arc<Domain>,
    is_required: bool,
    comment: Option<String>,
}

impl FieldEntryBuilder {
    /// Set the label (defaults to the name).
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Mark the field as required.
    #[must_use]
    pub fn required(mut self, is_required: bool) -> Self {
        self.is_required = is_required;
        self
    }

    /// Set the domain.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<Arc<Domain>>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the scalar kind.
    #[must_use]
    pub fn field_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }

    /// Set the help text.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Apply partial overrides; `None` keeps the current value.
    #[must_use]
    pub fn metadata(mut self, metadata: FieldMetadata) -> Self {
        let FieldMetadata {
            label,
            field_type,
            domain,
            is_required,
            comment,
        } = metadata;
        if let Some(label) = label {
            self.label = label;
        }
        if let Some(field_type) = field_type {
            self.field_type = field_type;
        }
        if let Some(domain) = domain {
            self.domain = domain;
        }
        if let Some(is_required) = is_required {
            self.is_required = is_required;
        }
        if comment.is_some() {
            self.comment = comment;
        }
        self
    }

    /// Finish the entry.
    #[must_use]
    pub fn build(self) -> FieldEntry {
        FieldEntry {
            name: self.name,
            label: self.label,
            field_type: self.field_type,
            domain: self.domain,
            is_required: self.is_required,
            comment: self.comment,
        }
    }
}

impl From<FieldEntryBuilder> for FieldEntry {
    fn from(builder: FieldEntryBuilder) -> Self {
        builder.build()
    }
}

/// Partial overrides for a [`FieldEntry`]; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct FieldMetadata {
    /// New label.
    pub label: Option<String>,
    /// New scalar kind.
    pub field_type: Option<FieldType>,
    /// New domain.
    pub domain: Option<Arc<Domain>>,
    /// New required flag.
    pub is_required: Option<bool>,
    /// New help text.
    pub comment: Option<String>,
}

/// One entry of an entity.
#[derive(Debug, Clone)]
pub enum EntityEntry {
    /// A scalar field.
    Field(Arc<FieldEntry>),
    /// A nested object.
    Object(Arc<Entity>),
    /// A homogeneous list of nested objects.
    List(Arc<Entity>),
    /// A list of objects of the enclosing entity (tree-shaped data).
    RecursiveList,
}

impl EntityEntry {
    /// Short name of the entry kind, for messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Field(_) => "field",
            Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::RecursiveList => "recursive-list",
        }
    }
}

/// Static schema of a business object.
#[derive(Debug, Clone)]
pub struct Entity {
    name: String,
    fields: IndexMap<String, EntityEntry>,
}

impl Entity {
    /// Start declaring an entity.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> EntityBuilder {
        EntityBuilder {
            name: name.into(),
            fields: IndexMap::new(),
            error: None,
        }
    }

    /// Entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &EntityEntry)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Look up an entry by name.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&EntityEntry> {
        self.fields.get(name)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the entity has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Fluent declaration of an [`Entity`].
///
/// Errors are recorded as they happen and the first one is returned by
/// [`build`](Self::build).
#[derive(Debug)]
pub struct EntityBuilder {
    name: String,
    fields: IndexMap<String, EntityEntry>,
    error: Option<SchemaError>,
}

impl EntityBuilder {
    /// Declare a scalar field.
    #[must_use]
    pub fn field(self, entry: impl Into<FieldEntry>) -> Self {
        let entry = entry.into();
        let name = entry.name().to_string();
        self.entry(name, EntityEntry::Field(Arc::new(entry)))
    }

    /// Declare a nested object.
    #[must_use]
    pub fn object(self, name: impl Into<String>, entity: Arc<Entity>) -> Self {
        self.entry(name.into(), EntityEntry::Object(entity))
    }

    /// Declare a list of nested objects.
    #[must_use]
    pub fn list(self, name: impl Into<String>, entity: Arc<Entity>) -> Self {
        self.entry(name.into(), EntityEntry::List(entity))
    }

    /// Declare a list of objects of the entity being declared.
    #[must_use]
    pub fn recursive_list(self, name: impl Into<String>) -> Self {
        self.entry(name.into(), EntityEntry::RecursiveList)
    }

    /// Declare an entry of any kind.
    #[must_use]
    pub fn entry(mut self, name: String, entry: EntityEntry) -> Self {
        if self.error.is_some() {
            return self;
        }
        if name.is_empty() {
            self.error = Some(SchemaError::EmptyFieldName(self.name.clone()));
        } else if self.fields.contains_key(&name) {
            self.error = Some(SchemaError::DuplicateField {
                entity: self.name.clone(),
                field: name,
            });
        } else {
            self.fields.insert(name, entry);
        }
        self
    }

    /// Finish the entity.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] recorded while declaring entries, or
    /// [`SchemaError::EmptyEntityName`].
    pub fn build(self) -> SchemaResult<Arc<Entity>> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.name.is_empty() {
            return Err(SchemaError::EmptyEntityName);
        }
        tracing::trace!(entity = %self.name, fields = self.fields.len(), "entity declared");
        Ok(Arc::new(Entity {
            name: self.name,
            fields: self.fields,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(name: &str) -> FieldEntryBuilder {
        FieldEntry::builder(name, FieldType::String)
    }

    #[test]
    fn test_entries_keep_declaration_order() {
        let entity = Entity::builder("Person")
            .field(text("lastName"))
            .field(text("firstName"))
            .recursive_list("children")
            .build()
            .expect("valid entity");

        let names: Vec<_> = entity.entries().map(|(name, _)| name).collect();
        assert_eq!(names, ["lastName", "firstName", "children"]);
        assert_eq!(entity.entry("children").map(EntityEntry::kind), Some("recursive-list"));
    }

    #[test]
    fn test_duplicate_field_is_rejected() {
        let result = Entity::builder("Person")
            .field(text("name"))
            .field(text("name"))
            .build();
        assert!(matches!(result, Err(SchemaError::DuplicateField { field, .. }) if field == "name"));
    }

    #[test]
    fn test_empty_names_are_rejected() {
        assert!(matches!(
            Entity::builder("").build(),
            Err(SchemaError::EmptyEntityName)
        ));
        assert!(matches!(
            Entity::builder("Person").field(text("")).build(),
            Err(SchemaError::EmptyFieldName(_))
        ));
    }

    #[test]
    fn test_label_defaults_to_name() {
        let entry = text("city").build();
        assert_eq!(entry.label(), "city");
        assert!(!entry.is_required());
    }

    #[test]
    fn test_with_metadata_overrides_only_given_values() {
        let entry = text("firstName").label("First name").required(true).build();
        let patched = entry.with_metadata(FieldMetadata {
            is_required: Some(false),
            ..FieldMetadata::default()
        });
        assert_eq!(patched.label(), "First name");
        assert!(!patched.is_required());
        assert!(Arc::ptr_eq(patched.domain(), entry.domain()));
    }

    #[test]
    fn test_builder_metadata_matches_with_metadata() {
        let entry = text("zip").comment("postal code").build();
        let metadata = FieldMetadata {
            label: Some("Zip".to_string()),
            field_type: Some(FieldType::Number),
            ..FieldMetadata::default()
        };
        let from_builder = entry.to_builder().metadata(metadata.clone()).build();
        let from_entry = entry.with_metadata(metadata);

        for patched in [&from_builder, &from_entry] {
            assert_eq!(patched.name(), "zip");
            assert_eq!(patched.label(), "Zip");
            assert_eq!(patched.field_type(), &FieldType::Number);
            assert_eq!(patched.comment(), Some("postal code"));
        }
    }

    #[test]
    fn test_display_uses_formatter() {
        let domain = Domain::new("DO_AMOUNT").display_formatter(|v| format!("{v} EUR"));
        let entry = FieldEntry::builder("amount", FieldType::Number)
            .domain(domain)
            .build();
        assert_eq!(entry.display(Some(&Value::from(12))), "12 EUR");
        assert_eq!(entry.display(None), "");

        let plain = text("name").build();
        assert_eq!(plain.display(Some(&Value::from("Ada"))), "Ada");
    }
}
