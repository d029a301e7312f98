//! JSON schema documents.
//!
//! Entities can be declared in Rust with [`Entity::builder`] or loaded from
//! a JSON document:
//!
//! ```json
//! {
//!   "domains": [
//!     { "name": "DO_EMAIL", "validators": [{ "type": "email" }] }
//!   ],
//!   "entities": [
//!     {
//!       "name": "Person",
//!       "fields": [
//!         { "type": "field", "name": "email", "domain": "DO_EMAIL", "required": true },
//!         { "type": "object", "name": "address", "entity": "Address" },
//!         { "type": "recursive-list", "name": "children" }
//!       ]
//!     },
//!     { "name": "Address", "fields": [{ "type": "field", "name": "city" }] }
//!   ]
//! }
//! ```
//!
//! Entity references are resolved by name, in any declaration order.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::entity::{Domain, Entity, FieldEntry, FieldType};
use crate::error::{SchemaError, SchemaResult};
use crate::validation::Validator;

/// Top-level schema document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Shared domains, referenced by name from fields.
    #[serde(default)]
    pub domains: Vec<DomainDocument>,
    /// Entity declarations.
    pub entities: Vec<EntityDocument>,
}

/// Document form of a [`Domain`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainDocument {
    /// Domain name.
    pub name: String,
    /// Validators in application order.
    #[serde(default)]
    pub validators: Vec<ValidatorDocument>,
}

/// Document form of a [`Validator`]. Custom functions cannot be loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ValidatorDocument {
    /// Fails on empty values.
    Required {
        /// Message override.
        #[serde(default)]
        message: Option<String>,
    },
    /// Fails when the value does not match `pattern`.
    Regex {
        /// Regular expression.
        pattern: String,
        /// Message override.
        #[serde(default)]
        message: Option<String>,
    },
    /// Fails on malformed email addresses.
    Email {
        /// Message override.
        #[serde(default)]
        message: Option<String>,
    },
    /// Fails on non-numbers and out-of-range numbers.
    Number {
        /// Inclusive lower bound.
        #[serde(default)]
        min: Option<f64>,
        /// Inclusive upper bound.
        #[serde(default)]
        max: Option<f64>,
        /// Message override.
        #[serde(default)]
        message: Option<String>,
    },
    /// Fails when the text length is out of range.
    String {
        /// Minimum length in characters.
        #[serde(default, rename = "minLength")]
        min_length: Option<usize>,
        /// Maximum length in characters.
        #[serde(default, rename = "maxLength")]
        max_length: Option<usize>,
        /// Message override.
        #[serde(default)]
        message: Option<String>,
    },
    /// Fails on invalid ISO 8601 dates.
    Date {
        /// Message override.
        #[serde(default)]
        message: Option<String>,
    },
}

impl ValidatorDocument {
    /// Compile into a runtime validator.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidRegex`] if a pattern does not compile.
    pub fn to_validator(&self) -> SchemaResult<Validator> {
        let (validator, message) = match self {
            Self::Required { message } => (Validator::required(), message),
            Self::Regex { pattern, message } => (Validator::regex(pattern)?, message),
            Self::Email { message } => (Validator::email(), message),
            Self::Number { min, max, message } => (Validator::number(*min, *max), message),
            Self::String {
                min_length,
                max_length,
                message,
            } => (Validator::length(*min_length, *max_length), message),
            Self::Date { message } => (Validator::date(), message),
        };
        Ok(match message {
            Some(message) => validator.with_message(message.clone()),
            None => validator,
        })
    }
}

/// Document form of an [`Entity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDocument {
    /// Entity name.
    pub name: String,
    /// Entries in declaration order.
    pub fields: Vec<FieldDocument>,
}

/// One entry of an entity document, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FieldDocument {
    /// A scalar field.
    Field {
        /// Field name.
        name: String,
        /// `string`, `number`, `boolean` or any custom type name.
        #[serde(default = "FieldDocument::default_field_type", rename = "fieldType")]
        field_type: String,
        /// Label, defaults to the name.
        #[serde(default)]
        label: Option<String>,
        /// Domain name.
        #[serde(default)]
        domain: Option<String>,
        /// Whether the field is required.
        #[serde(default)]
        required: bool,
        /// Help text.
        #[serde(default)]
        comment: Option<String>,
    },
    /// A nested object of another entity.
    Object {
        /// Field name.
        name: String,
        /// Referenced entity name.
        entity: String,
    },
    /// A list of objects of another entity.
    List {
        /// Field name.
        name: String,
        /// Referenced entity name.
        entity: String,
    },
    /// A list of objects of the enclosing entity.
    RecursiveList {
        /// Field name.
        name: String,
    },
}

impl FieldDocument {
    fn default_field_type() -> String {
        "string".to_string()
    }

    /// Entry name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Field { name, .. }
            | Self::Object { name, .. }
            | Self::List { name, .. }
            | Self::RecursiveList { name } => name,
        }
    }
}

fn parse_field_type(name: &str) -> FieldType {
    match name {
        "string" => FieldType::String,
        "number" => FieldType::Number,
        "boolean" => FieldType::Boolean,
        other => FieldType::Custom(other.to_string()),
    }
}

/// Entities and domains loaded from a [`SchemaDocument`].
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    domains: IndexMap<String, Arc<Domain>>,
    entities: IndexMap<String, Arc<Entity>>,
}

impl SchemaRegistry {
    /// Parse and resolve a JSON schema document.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Document`] for malformed JSON (including a
    /// field entry without `type`), or any resolution error of
    /// [`from_document`](Self::from_document).
    pub fn from_json(json: &str) -> SchemaResult<Self> {
        let document: SchemaDocument = serde_json::from_str(json)?;
        Self::from_document(&document)
    }

    /// Resolve a parsed document.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownEntity`], [`SchemaError::UnknownDomain`],
    /// [`SchemaError::ReferenceCycle`], [`SchemaError::DuplicateEntity`],
    /// [`SchemaError::InvalidRegex`] or an entity declaration error.
    pub fn from_document(document: &SchemaDocument) -> SchemaResult<Self> {
        let mut domains = IndexMap::new();
        for doc in &document.domains {
            let domain = doc
                .validators
                .iter()
                .try_fold(Domain::new(&doc.name), |domain, v| Ok::<_, SchemaError>(domain.validator(v.to_validator()?)))?;
            domains.insert(doc.name.clone(), Arc::new(domain));
        }

        let mut docs = IndexMap::new();
        for doc in &document.entities {
            if docs.insert(doc.name.clone(), doc).is_some() {
                return Err(SchemaError::DuplicateEntity(doc.name.clone()));
            }
        }

        let mut resolver = Resolver {
            docs: &docs,
            domains: &domains,
            resolved: IndexMap::new(),
            visiting: HashSet::new(),
        };
        for name in docs.keys() {
            resolver.resolve(name)?;
        }
        // Declaration order rather than resolution order.
        let entities: IndexMap<_, _> = docs
            .keys()
            .filter_map(|name| Some((name.clone(), Arc::clone(resolver.resolved.get(name)?))))
            .collect();

        tracing::debug!(entities = entities.len(), domains = domains.len(), "schema loaded");
        Ok(Self { domains, entities })
    }

    /// Entity by name.
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&Arc<Entity>> {
        self.entities.get(name)
    }

    /// Domain by name.
    #[must_use]
    pub fn domain(&self, name: &str) -> Option<&Arc<Domain>> {
        self.domains.get(name)
    }

    /// Entity names in declaration order.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }
}

struct Resolver<'a> {
    docs: &'a IndexMap<String, &'a EntityDocument>,
    domains: &'a IndexMap<String, Arc<Domain>>,
    resolved: IndexMap<String, Arc<Entity>>,
    visiting: HashSet<String>,
}

impl Resolver<'_> {
    fn resolve(&mut self, name: &str) -> SchemaResult<Arc<Entity>> {
        if let Some(entity) = self.resolved.get(name) {
            return Ok(Arc::clone(entity));
        }
        if !self.visiting.insert(name.to_string()) {
            return Err(SchemaError::ReferenceCycle(name.to_string()));
        }
        let docs = self.docs;
        let doc = *docs.get(name).ok_or_else(|| SchemaError::ReferenceCycle(name.to_string()))?;

        let mut builder = Entity::builder(&doc.name);
        for field in &doc.fields {
            builder = match field {
                FieldDocument::Field {
                    name,
                    field_type,
                    label,
                    domain,
                    required,
                    comment,
                } => {
                    let mut entry = FieldEntry::builder(name, parse_field_type(field_type)).required(*required);
                    if let Some(label) = label {
                        entry = entry.label(label);
                    }
                    if let Some(comment) = comment {
                        entry = entry.comment(comment);
                    }
                    if let Some(domain) = domain {
                        let found = self.domains.get(domain).ok_or_else(|| SchemaError::UnknownDomain {
                            field: format!("{}.{name}", doc.name),
                            domain: domain.clone(),
                        })?;
                        entry = entry.domain(Arc::clone(found));
                    }
                    builder.field(entry)
                }
                FieldDocument::Object { name, entity } => builder.object(name, self.reference(doc, name, entity)?),
                FieldDocument::List { name, entity } => builder.list(name, self.reference(doc, name, entity)?),
                FieldDocument::RecursiveList { name } => builder.recursive_list(name),
            };
        }
        let entity = builder.build()?;

        self.visiting.remove(name);
        self.resolved.insert(name.to_string(), Arc::clone(&entity));
        Ok(entity)
    }

    fn reference(&mut self, doc: &EntityDocument, field: &str, target: &str) -> SchemaResult<Arc<Entity>> {
        if !self.docs.contains_key(target) {
            return Err(SchemaError::UnknownEntity {
                entity: doc.name.clone(),
                field: field.to_string(),
                target: target.to_string(),
            });
        }
        self.resolve(target)
    }
}
