//! Fluent configuration of form trees.
//!
//! A [`FormNodeBuilder`] owns a private, empty clone of its source node.
//! Every call edits that working copy; nothing is visible outside the
//! builder until [`FormNodeBuilder::build`] attaches the form overlay,
//! copies the source values and starts following the source.
//!
//! Configuration mistakes (unknown names, wrong entry kinds, touching an
//! entry after removing it, adding a name twice) are recorded in call order
//! and the first one is returned by `build`.
//!
//! ```
//! use formstore_core::{build_node, Entity, FieldEntry, FieldMetadata, FieldType, FormNodeBuilder};
//! use serde_json::json;
//!
//! let person = Entity::builder("Person")
//!     .field(FieldEntry::builder("firstName", FieldType::String).required(true))
//!     .field(FieldEntry::builder("lastName", FieldType::String))
//!     .build()
//!     .unwrap();
//! let node = build_node(&person);
//! node.set(&json!({ "lastName": "Lovelace" })).unwrap();
//!
//! let form = FormNodeBuilder::new(&node)
//!     .unwrap()
//!     .edit(true)
//!     .patch_field("firstName", |f, _| {
//!         f.metadata(FieldMetadata { is_required: Some(false), ..FieldMetadata::default() })
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert!(form.is_valid());
//! assert_eq!(form.to_flat_values(), json!({ "lastName": "Lovelace" }));
//! ```

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;

use crate::clone::{clone_list, clone_node};
use crate::entity::{Domain, FieldEntry, FieldEntryBuilder, FieldMetadata, FieldType};
use crate::error::{StoreError, StoreResult};
use crate::form::{list_to_form_list, node_to_form_node, EditCondition, FormListNode, FormNode};
use crate::store::{
    build_node, EntityField, FieldGetter, FieldSetter, StoreEntry, StoreListNode, StoreNode, ValueCell,
};

/// Options of [`make_form_node`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormNodeOptions {
    /// Initial edit mode of the root.
    pub is_edit: bool,
    /// Start empty instead of copying the source, and do not follow it.
    pub is_empty: bool,
}

/// Build a form from `node` without further configuration.
///
/// # Errors
///
/// Returns [`StoreError::CloneFormNode`] if `node` is already a form.
pub fn make_form_node(node: &StoreNode, options: FormNodeOptions) -> StoreResult<FormNode> {
    let builder = FormNodeBuilder::new(node)?.edit(options.is_edit);
    if options.is_empty {
        builder.build_detached()
    } else {
        builder.build()
    }
}

// ============================================================================
// FormEntityFieldBuilder
// ============================================================================

/// Configuration of one field of a form: metadata, value accessors and edit
/// condition.
pub struct FormEntityFieldBuilder {
    entry: FieldEntryBuilder,
    cell: Option<ValueCell>,
    getter: Option<FieldGetter>,
    setter: Option<FieldSetter>,
    edit: Option<EditCondition>,
}

impl fmt::Debug for FormEntityFieldBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormEntityFieldBuilder")
            .field("entry", &self.entry)
            .field("derived", &self.getter.is_some())
            .field("edit", &self.edit)
            .finish()
    }
}

impl FormEntityFieldBuilder {
    fn new(name: &str) -> Self {
        Self {
            entry: FieldEntry::builder(name, FieldType::String),
            cell: None,
            getter: None,
            setter: None,
            edit: None,
        }
    }

    fn from_field(field: &EntityField) -> Self {
        Self {
            entry: field.field().to_builder(),
            cell: Some(field.inner.value.clone()),
            getter: None,
            setter: None,
            edit: field.inner.pending_edit.borrow_mut().take(),
        }
    }

    /// Apply partial metadata overrides.
    #[must_use]
    pub fn metadata(mut self, metadata: FieldMetadata) -> Self {
        self.entry = self.entry.metadata(metadata);
        self
    }

    /// Replace the domain.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<Arc<Domain>>) -> Self {
        self.entry = self.entry.domain(domain);
        self
    }

    /// Replace the label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.entry = self.entry.label(label);
        self
    }

    /// Replace the required flag.
    #[must_use]
    pub fn required(mut self, is_required: bool) -> Self {
        self.entry = self.entry.required(is_required);
        self
    }

    /// Replace the value scalar kind.
    #[must_use]
    pub fn field_type(mut self, field_type: FieldType) -> Self {
        self.entry = self.entry.field_type(field_type);
        self
    }

    /// Compute the value with `get` instead of storing it.
    ///
    /// The getter is tracked: capture [`WeakStoreNode`](crate::WeakStoreNode)
    /// handles rather than nodes to read sibling fields.
    #[must_use]
    pub fn value(mut self, get: impl Fn() -> Option<Value> + 'static) -> Self {
        self.getter = Some(Rc::new(get));
        self
    }

    /// Receive writes to a computed value. Without a setter they are dropped.
    #[must_use]
    pub fn setter(mut self, set: impl Fn(Option<Value>) + 'static) -> Self {
        self.setter = Some(Rc::new(set));
        self
    }

    /// Edit condition of the field.
    #[must_use]
    pub fn edit(mut self, condition: impl Into<EditCondition>) -> Self {
        self.edit = Some(condition.into());
        self
    }

    fn into_field(self) -> EntityField {
        let cell = match (self.getter, self.cell) {
            (Some(get), _) => ValueCell::derived(get, self.setter),
            (None, Some(cell)) => cell,
            (None, None) => ValueCell::stored(None),
        };
        let field = EntityField::with_cell(Arc::new(self.entry.build()), cell);
        if let Some(condition) = self.edit {
            StoreEntry::Field(field.clone()).set_pending_edit(condition);
        }
        field
    }
}

// ============================================================================
// FormNodeBuilder
// ============================================================================

/// Configures a form derived from a store node.
pub struct FormNodeBuilder {
    source: Option<StoreNode>,
    node: StoreNode,
    edit: Option<EditCondition>,
    removed: HashSet<String>,
    error: Option<StoreError>,
}

impl fmt::Debug for FormNodeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormNodeBuilder")
            .field("node", &self.node)
            .field("edit", &self.edit)
            .field("removed", &self.removed)
            .field("error", &self.error)
            .finish()
    }
}

impl FormNodeBuilder {
    /// Start configuring a form derived from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CloneFormNode`] if `source` is a form.
    pub fn new(source: &StoreNode) -> StoreResult<Self> {
        let node = clone_node(source, false)?;
        Ok(Self {
            source: Some(source.clone()),
            ..Self::over(node)
        })
    }

    /// Configure `node` in place (nested nodes and list items).
    fn over(node: StoreNode) -> Self {
        Self {
            source: None,
            node,
            edit: None,
            removed: HashSet::new(),
            error: None,
        }
    }

    /// The working copy being configured.
    #[must_use]
    pub fn node(&self) -> &StoreNode {
        &self.node
    }

    fn fail(&mut self, error: StoreError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Look up an entry that must exist and not have been removed.
    fn lookup(&mut self, name: &str) -> Option<StoreEntry> {
        if self.error.is_some() {
            return None;
        }
        if self.removed.contains(name) {
            self.fail(StoreError::RemovedEntry(name.to_string()));
            return None;
        }
        let entry = self.node.get(name);
        if entry.is_none() {
            self.fail(StoreError::UnknownEntry {
                entity: self.node.entity().name().to_string(),
                name: name.to_string(),
            });
        }
        entry
    }

    fn wrong_kind(&mut self, name: &str, expected: &'static str, actual: &StoreEntry) {
        self.fail(StoreError::WrongEntryKind {
            name: name.to_string(),
            expected,
            actual: actual.kind(),
        });
    }

    /// Add a field that does not exist in the entity.
    ///
    /// `configure` receives a builder for a string field named `name` and
    /// the working node, typically to install value accessors reading its
    /// siblings.
    #[must_use]
    pub fn add(
        mut self,
        name: &str,
        configure: impl FnOnce(FormEntityFieldBuilder, &StoreNode) -> FormEntityFieldBuilder,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.node.contains(name) {
            self.fail(StoreError::DuplicateEntry(name.to_string()));
            return self;
        }
        let field = configure(FormEntityFieldBuilder::new(name), &self.node).into_field();
        self.removed.remove(name);
        self.node.insert_entry(name.to_string(), StoreEntry::Field(field));
        self
    }

    /// Reconfigure an existing field.
    #[must_use]
    pub fn patch_field(
        mut self,
        name: &str,
        configure: impl FnOnce(FormEntityFieldBuilder, &StoreNode) -> FormEntityFieldBuilder,
    ) -> Self {
        match self.lookup(name) {
            Some(StoreEntry::Field(field)) => {
                let patched = configure(FormEntityFieldBuilder::from_field(&field), &self.node).into_field();
                self.node.insert_entry(name.to_string(), StoreEntry::Field(patched));
            }
            Some(other) => self.wrong_kind(name, "field", &other),
            None => {}
        }
        self
    }

    /// Reconfigure a nested node.
    #[must_use]
    pub fn patch_node(mut self, name: &str, configure: impl FnOnce(FormNodeBuilder) -> FormNodeBuilder) -> Self {
        match self.lookup(name) {
            Some(StoreEntry::Node(child)) => {
                if let Err(error) = configure(Self::over(child)).collect() {
                    self.fail(error);
                }
            }
            Some(other) => self.wrong_kind(name, "node", &other),
            None => {}
        }
        self
    }

    /// Reconfigure a nested list.
    #[must_use]
    pub fn patch_list(
        mut self,
        name: &str,
        configure: impl FnOnce(FormListNodeBuilder) -> FormListNodeBuilder,
    ) -> Self {
        match self.lookup(name) {
            Some(StoreEntry::List(child)) => {
                if let Err(error) = configure(FormListNodeBuilder::over(child)).collect() {
                    self.fail(error);
                }
            }
            Some(other) => self.wrong_kind(name, "list", &other),
            None => {}
        }
        self
    }

    /// Edit condition of the node itself.
    #[must_use]
    pub fn edit(mut self, condition: impl Into<EditCondition>) -> Self {
        self.edit = Some(condition.into());
        self
    }

    /// Edit condition computed from the node; reads are tracked.
    #[must_use]
    pub fn edit_when(self, predicate: impl Fn(&StoreNode) -> bool + 'static) -> Self {
        let weak = self.node.downgrade();
        self.edit(EditCondition::when(move || weak.upgrade().is_some_and(|node| predicate(&node))))
    }

    /// Edit condition of the named children only.
    #[must_use]
    pub fn edit_fields(mut self, condition: impl Into<EditCondition>, names: &[&str]) -> Self {
        let condition = condition.into();
        for name in names {
            if let Some(entry) = self.lookup(name) {
                entry.set_pending_edit(condition.clone());
            }
        }
        self
    }

    /// Remove the named children from the form.
    #[must_use]
    pub fn remove(mut self, names: &[&str]) -> Self {
        for name in names {
            if self.lookup(name).is_some() {
                self.node.remove_entry(name);
                self.removed.insert((*name).to_string());
            }
        }
        self
    }

    /// Remove every child except the named ones.
    #[must_use]
    pub fn remove_all_but(mut self, names: &[&str]) -> Self {
        for name in names {
            self.lookup(name);
        }
        if self.error.is_none() {
            for key in self.node.keys() {
                if !names.contains(&key.as_str()) {
                    self.removed.insert(key);
                }
            }
            let removed = &self.removed;
            self.node.retain_entries(|key| !removed.contains(key));
        }
        self
    }

    /// Return the configured node, leaving its edit condition for the
    /// overlay to pick up.
    fn collect(self) -> StoreResult<StoreNode> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if let Some(condition) = self.edit {
            StoreEntry::Node(self.node.clone()).set_pending_edit(condition);
        }
        Ok(self.node)
    }

    fn attach(self) -> StoreResult<FormNode> {
        let source = self.source.clone();
        let edit = self.edit.clone().unwrap_or(EditCondition::Static(false));
        let node = Self { edit: Some(edit), ..self }.collect()?;
        let Some(source) = source else {
            return Err(StoreError::SourceDetached(node.entity().name().to_string()));
        };
        node_to_form_node(&node, &source, true)
    }

    /// Attach the overlay, copy the source values and follow the source.
    ///
    /// The form starts in read mode unless [`edit`](Self::edit) said
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error recorded.
    pub fn build(self) -> StoreResult<FormNode> {
        let form = self.attach()?;
        form.reset()?;
        form.sync_with_source();
        tracing::debug!(entity = %form.entity().name(), id = %form.id(), "form built");
        Ok(form)
    }

    /// Like [`build`](Self::build), but the form starts empty and does not
    /// follow the source.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error recorded.
    pub fn build_detached(self) -> StoreResult<FormNode> {
        let form = self.attach()?;
        tracing::debug!(entity = %form.entity().name(), id = %form.id(), "empty form built");
        Ok(form)
    }
}

// ============================================================================
// FormListNodeBuilder
// ============================================================================

type ItemConfig = Rc<dyn Fn(FormNodeBuilder, &StoreListNode) -> FormNodeBuilder>;

/// Configures a form derived from a store list.
pub struct FormListNodeBuilder {
    source: Option<StoreListNode>,
    list: StoreListNode,
    edit: Option<EditCondition>,
    items: Option<ItemConfig>,
}

impl fmt::Debug for FormListNodeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormListNodeBuilder")
            .field("list", &self.list)
            .field("edit", &self.edit)
            .field("items", &self.items.is_some())
            .finish()
    }
}

impl FormListNodeBuilder {
    /// Start configuring a form derived from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CloneFormNode`] if `source` is a form.
    pub fn new(source: &StoreListNode) -> StoreResult<Self> {
        let list = clone_list(source, false)?;
        Ok(Self {
            source: Some(source.clone()),
            ..Self::over(list)
        })
    }

    fn over(list: StoreListNode) -> Self {
        Self {
            source: None,
            list,
            edit: None,
            items: None,
        }
    }

    /// The working copy being configured.
    #[must_use]
    pub fn list(&self) -> &StoreListNode {
        &self.list
    }

    /// Edit condition of the list.
    #[must_use]
    pub fn edit(mut self, condition: impl Into<EditCondition>) -> Self {
        self.edit = Some(condition.into());
        self
    }

    /// Configuration applied to every item when it is built.
    #[must_use]
    pub fn items(mut self, configure: impl Fn(FormNodeBuilder, &StoreListNode) -> FormNodeBuilder + 'static) -> Self {
        self.items = Some(Rc::new(configure));
        self
    }

    fn collect(self) -> StoreResult<StoreListNode> {
        if let Some(configure) = self.items {
            // Item configuration is deterministic per entity: a scratch item
            // surfaces its errors now rather than on every push.
            configure(FormNodeBuilder::over(build_node(self.list.entity())), &self.list).collect()?;

            let weak = self.list.downgrade();
            self.list.set_hook(Some(Rc::new(move |item: &StoreNode| {
                let Some(list) = weak.upgrade() else {
                    return;
                };
                if let Err(error) = configure(FormNodeBuilder::over(item.clone()), &list).collect() {
                    tracing::warn!(%error, "list item configuration failed");
                }
            })));
        }
        if let Some(condition) = self.edit {
            StoreEntry::List(self.list.clone()).set_pending_edit(condition);
        }
        Ok(self.list)
    }

    /// Attach the overlay, copy the source items and follow the source.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error recorded by the item
    /// configuration.
    pub fn build(self) -> StoreResult<FormListNode> {
        let source = self.source.clone();
        let edit = self.edit.clone().unwrap_or(EditCondition::Static(false));
        let list = Self { edit: Some(edit), ..self }.collect()?;
        let Some(source) = source else {
            return Err(StoreError::SourceDetached(list.entity().name().to_string()));
        };
        let form = list_to_form_list(&list, &source, true)?;
        form.reset()?;
        form.sync_with_source();
        tracing::debug!(entity = %form.entity().name(), id = %form.id(), "form list built");
        Ok(form)
    }
}
