//! Error types for schema declaration and store operations.
//!
//! Validation failures are not errors: they are computed state exposed by
//! form fields and form nodes.

use thiserror::Error;

/// Result type for schema declaration and loading.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for store, clone and form operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Configuration errors raised while declaring or loading an entity schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Two entries of the same entity share a name.
    #[error("Duplicate field '{field}' in entity '{entity}'")]
    DuplicateField {
        /// Entity name.
        entity: String,
        /// Offending field name.
        field: String,
    },

    /// An entity was declared without a name.
    #[error("Entity name must not be empty")]
    EmptyEntityName,

    /// A field entry was declared without a name.
    #[error("Field name must not be empty in entity '{0}'")]
    EmptyFieldName(String),

    /// An object or list entry references an entity that is not declared.
    #[error("Entity '{entity}' references unknown entity '{target}' in field '{field}'")]
    UnknownEntity {
        /// Referencing entity.
        entity: String,
        /// Referencing field.
        field: String,
        /// Missing entity name.
        target: String,
    },

    /// Two entities of a schema document share a name.
    #[error("Duplicate entity '{0}'")]
    DuplicateEntity(String),

    /// Entity references form a cycle; self-reference needs a recursive list.
    #[error("Entity references form a cycle through '{0}'")]
    ReferenceCycle(String),

    /// A regex validator does not compile.
    #[error("Invalid regex '{pattern}': {source}")]
    InvalidRegex {
        /// The pattern.
        pattern: String,
        /// Compilation error.
        #[source]
        source: regex::Error,
    },

    /// A domain referenced by a field is not declared.
    #[error("Field '{field}' references unknown domain '{domain}'")]
    UnknownDomain {
        /// Referencing field.
        field: String,
        /// Missing domain name.
        domain: String,
    },

    /// The schema document is malformed (missing `type` tag, wrong shape...).
    #[error("Schema document error: {0}")]
    Document(#[from] serde_json::Error),
}

/// Errors raised by store nodes, the clone engine and form builders.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Data passed to `set`/`replace` does not match the node shape.
    #[error("Invalid data at '{path}': expected {expected}")]
    InvalidData {
        /// Dotted path of the offending value.
        path: String,
        /// Expected JSON shape.
        expected: &'static str,
    },

    /// Form nodes must be derived from plain store nodes exactly once.
    #[error("Cannot clone or derive a form from a form node ('{0}')")]
    CloneFormNode(String),

    /// `reset` was called after the source node was dropped.
    #[error("Source node of '{0}' is no longer alive")]
    SourceDetached(String),

    /// A builder operation named an entry that does not exist.
    #[error("No entry named '{name}' in node '{entity}'")]
    UnknownEntry {
        /// Node entity name.
        entity: String,
        /// Requested entry.
        name: String,
    },

    /// A builder operation named an entry of another kind.
    #[error("Entry '{name}' is a {actual}, not a {expected}")]
    WrongEntryKind {
        /// Requested entry.
        name: String,
        /// Kind the operation expects.
        expected: &'static str,
        /// Kind found in the node.
        actual: &'static str,
    },

    /// A builder operation targeted an entry removed earlier.
    #[error("Entry '{0}' was removed earlier in this builder")]
    RemovedEntry(String),

    /// `add` used a name already present in the node.
    #[error("Entry '{0}' already exists")]
    DuplicateEntry(String),
}
