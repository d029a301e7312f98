//! # Formstore Core
//!
//! Reactive entity stores and form overlays for form-driven applications.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                formstore-core               │
//! ├─────────────────────────────────────────────┤
//! │  Entity Schema   │  Store Tree              │
//! │  - Fields        │  - StoreNode             │
//! │  - Domains       │  - StoreListNode         │
//! │  - JSON loading  │  - EntityField           │
//! ├─────────────────────────────────────────────┤
//! │  Form Overlay    │  Builder DSL             │
//! │  - Edit mode     │  - add / patch / remove  │
//! │  - Validation    │  - edit conditions       │
//! │  - Reset / sync  │  - list item config      │
//! ├─────────────────────────────────────────────┤
//! │  Reactive layer: Observable, Computed,      │
//! │  reaction, batch                            │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Everything above the schema is single-threaded (`Rc`-based) and meant to
//! live on the UI thread.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod builder;
pub mod clone;
pub mod entity;
pub mod error;
pub mod form;
pub mod reactive;
pub mod schema;
pub mod store;
pub mod validation;

pub use builder::{
    make_form_node, FormEntityFieldBuilder, FormListNodeBuilder, FormNodeBuilder, FormNodeOptions,
};
pub use clone::{clone_field, clone_list, clone_node};
pub use entity::{
    DisplayFormatter, Domain, Entity, EntityBuilder, EntityEntry, FieldEntry, FieldEntryBuilder,
    FieldMetadata, FieldType,
};
pub use error::{SchemaError, SchemaResult, StoreError, StoreResult};
pub use form::{
    list_to_form_list, node_to_form_node, EditCondition, ErrorMap, FormEntityField, FormErrors,
    FormListNode, FormNode,
};
pub use reactive::{batch, reaction, untracked, BatchScope, Computed, Observable, Subscription};
pub use schema::{
    DomainDocument, EntityDocument, FieldDocument, SchemaDocument, SchemaRegistry,
    ValidatorDocument,
};
pub use store::{
    build_node, string_for, to_flat_values, EntityField, EntityStore, EntityStoreBuilder,
    FieldGetter, FieldSetter, NodeBuilderHook, NodeId, StoreEntry, StoreListNode, StoreNode,
    WeakEntityField, WeakStoreListNode, WeakStoreNode,
};
pub use validation::{validate_field, validate_value, CustomValidator, Validator};

/// Formstore core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
