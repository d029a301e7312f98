//! Observable store trees built from entity schemas.
//!
//! [`build_node`] turns an [`Entity`] into a [`StoreNode`]: every scalar
//! field becomes an [`EntityField`] backed by its own observable cell, every
//! object entry a nested node and every list entry an empty
//! [`StoreListNode`]. List items are only built when data is pushed, which
//! is what makes recursive lists finite.
//!
//! # Example
//!
//! ```
//! use formstore_core::{build_node, Entity, FieldEntry, FieldType};
//! use serde_json::json;
//!
//! let person = Entity::builder("Person")
//!     .field(FieldEntry::builder("firstName", FieldType::String))
//!     .recursive_list("children")
//!     .build()
//!     .unwrap();
//!
//! let node = build_node(&person);
//! node.set(&json!({ "firstName": "Ada", "children": [{ "firstName": "Byron" }] }))
//!     .unwrap();
//!
//! assert_eq!(node.list("children").unwrap().len(), 1);
//! assert_eq!(
//!     node.to_flat_values(),
//!     json!({ "firstName": "Ada", "children": [{ "firstName": "Byron", "children": [] }] })
//! );
//! ```

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::entity::{Entity, EntityEntry, FieldEntry};
use crate::error::{StoreError, StoreResult};
use crate::form::{self, EditCondition, FieldForm, ListForm, NodeForm};
use crate::reactive::{untracked, BatchScope, Computed, Observable};

/// Unique identifier of a store node or list, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Create a new unique ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hook applied to every list item right after it is built.
pub type NodeBuilderHook = Rc<dyn Fn(&StoreNode)>;

/// Getter of a derived field.
pub type FieldGetter = Rc<dyn Fn() -> Option<Value>>;

/// Setter of a derived field.
pub type FieldSetter = Rc<dyn Fn(Option<Value>)>;

/// One child of a store node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEntry {
    /// A scalar field.
    Field(EntityField),
    /// A nested object.
    Node(StoreNode),
    /// A list of nested objects.
    List(StoreListNode),
}

impl StoreEntry {
    /// Short name of the entry kind, for messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Field(_) => "field",
            Self::Node(_) => "node",
            Self::List(_) => "list",
        }
    }

    /// Whether a form overlay is attached to the entry.
    #[must_use]
    pub fn is_form(&self) -> bool {
        match self {
            Self::Field(field) => field.is_form(),
            Self::Node(node) => node.is_form(),
            Self::List(list) => list.is_form(),
        }
    }

    pub(crate) fn set_pending_edit(&self, condition: EditCondition) {
        let slot = match self {
            Self::Field(field) => &field.inner.pending_edit,
            Self::Node(node) => &node.inner.pending_edit,
            Self::List(list) => &list.inner.pending_edit,
        };
        *slot.borrow_mut() = Some(condition);
    }
}

// ============================================================================
// EntityField
// ============================================================================

#[derive(Clone)]
pub(crate) enum ValueCell {
    Stored(Observable<Option<Value>>),
    Derived {
        get: FieldGetter,
        computed: Computed<Option<Value>>,
        set: Option<FieldSetter>,
    },
}

impl ValueCell {
    pub(crate) fn stored(value: Option<Value>) -> Self {
        Self::Stored(Observable::new(value))
    }

    pub(crate) fn derived(get: FieldGetter, set: Option<FieldSetter>) -> Self {
        let getter = Rc::clone(&get);
        let computed = Computed::new(move || getter().filter(|v| !v.is_null()));
        Self::Derived { get, computed, set }
    }

    /// A new cell of the same kind, independent from this one.
    ///
    /// Derived cells share their accessor closures.
    pub(crate) fn fresh(&self, deep: bool) -> Self {
        match self {
            Self::Stored(cell) => Self::stored(if deep { cell.get_untracked() } else { None }),
            Self::Derived { get, set, .. } => Self::derived(Rc::clone(get), set.clone()),
        }
    }
}

pub(crate) struct FieldInner {
    pub(crate) entry: Arc<FieldEntry>,
    pub(crate) value: ValueCell,
    pub(crate) form: OnceCell<Rc<FieldForm>>,
    pub(crate) pending_edit: RefCell<Option<EditCondition>>,
}

/// A scalar leaf: schema metadata plus an observable value.
///
/// `None` means "undefined". Writing JSON `null` stores `None`.
#[derive(Clone)]
pub struct EntityField {
    pub(crate) inner: Rc<FieldInner>,
}

impl PartialEq for EntityField {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for EntityField {}

impl fmt::Debug for EntityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityField")
            .field("name", &self.inner.entry.name())
            .field("value", &self.value_untracked())
            .field("derived", &self.is_derived())
            .finish()
    }
}

impl EntityField {
    /// Create a stored field with an undefined value.
    #[must_use]
    pub fn new(entry: Arc<FieldEntry>) -> Self {
        Self::with_cell(entry, ValueCell::stored(None))
    }

    pub(crate) fn with_cell(entry: Arc<FieldEntry>, value: ValueCell) -> Self {
        Self {
            inner: Rc::new(FieldInner {
                entry,
                value,
                form: OnceCell::new(),
                pending_edit: RefCell::new(None),
            }),
        }
    }

    /// Schema metadata of the field.
    #[must_use]
    pub fn field(&self) -> Arc<FieldEntry> {
        Arc::clone(&self.inner.entry)
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.entry.name()
    }

    /// Current value, registering a dependency.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.with_value(|value| value.cloned())
    }

    /// Read the current value through a borrow, registering a dependency.
    pub fn with_value<R>(&self, f: impl FnOnce(Option<&Value>) -> R) -> R {
        match &self.inner.value {
            ValueCell::Stored(cell) => cell.with(|value| f(value.as_ref())),
            ValueCell::Derived { computed, .. } => f(computed.get().as_ref()),
        }
    }

    /// Current value without registering a dependency.
    #[must_use]
    pub fn value_untracked(&self) -> Option<Value> {
        untracked(|| self.value())
    }

    /// Write the value. `Some(Value::Null)` is stored as `None`.
    ///
    /// Derived fields forward the write to their setter; without one the
    /// write is dropped with a warning.
    pub fn set_value(&self, value: Option<Value>) {
        let value = value.filter(|v| !v.is_null());
        match &self.inner.value {
            ValueCell::Stored(cell) => cell.set(value),
            ValueCell::Derived { set: Some(set), .. } => set(value),
            ValueCell::Derived { set: None, .. } => {
                tracing::warn!(field = %self.name(), "write to a derived field without setter ignored");
            }
        }
    }

    /// Reset a stored value to `None`. Derived fields are left alone.
    pub fn clear(&self) {
        if let ValueCell::Stored(cell) = &self.inner.value {
            cell.set(None);
        }
    }

    /// Whether the value is computed by accessor closures.
    #[must_use]
    pub fn is_derived(&self) -> bool {
        matches!(self.inner.value, ValueCell::Derived { .. })
    }

    /// Whether a form overlay is attached.
    #[must_use]
    pub fn is_form(&self) -> bool {
        self.inner.form.get().is_some()
    }

    /// Non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakEntityField {
        WeakEntityField(Rc::downgrade(&self.inner))
    }
}

/// Non-owning handle to an [`EntityField`].
#[derive(Clone)]
pub struct WeakEntityField(Weak<FieldInner>);

impl WeakEntityField {
    /// The field, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<EntityField> {
        self.0.upgrade().map(|inner| EntityField { inner })
    }
}

impl fmt::Debug for WeakEntityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakEntityField")
    }
}

/// Render a field value through its domain display formatter.
#[must_use]
pub fn string_for(field: &EntityField) -> String {
    field.with_value(|value| field.inner.entry.display(value))
}

// ============================================================================
// StoreNode
// ============================================================================

pub(crate) struct NodeInner {
    pub(crate) id: NodeId,
    pub(crate) entity: Arc<Entity>,
    pub(crate) entries: RefCell<IndexMap<String, StoreEntry>>,
    pub(crate) form: OnceCell<Rc<NodeForm>>,
    pub(crate) pending_edit: RefCell<Option<EditCondition>>,
}

/// Observable instance of an entity.
///
/// Cloning the handle does not copy the tree; use
/// [`clone_node`](crate::clone_node) for that.
#[derive(Clone)]
pub struct StoreNode {
    pub(crate) inner: Rc<NodeInner>,
}

impl PartialEq for StoreNode {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for StoreNode {}

impl fmt::Debug for StoreNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreNode")
            .field("id", &self.inner.id)
            .field("entity", &self.inner.entity.name())
            .field("keys", &self.keys())
            .field("form", &self.is_form())
            .finish()
    }
}

/// Build an empty store node mirroring `entity`.
///
/// Scalars start undefined, lists start empty.
#[must_use]
pub fn build_node(entity: &Arc<Entity>) -> StoreNode {
    let entries = entity
        .entries()
        .map(|(name, entry)| {
            let child = match entry {
                EntityEntry::Field(field) => StoreEntry::Field(EntityField::new(Arc::clone(field))),
                EntityEntry::Object(object) => StoreEntry::Node(build_node(object)),
                EntityEntry::List(item) => StoreEntry::List(StoreListNode::new(Arc::clone(item))),
                EntityEntry::RecursiveList => StoreEntry::List(StoreListNode::new(Arc::clone(entity))),
            };
            (name.to_string(), child)
        })
        .collect();
    let node = StoreNode::from_parts(Arc::clone(entity), entries);
    tracing::trace!(entity = %entity.name(), id = %node.id(), "store node built");
    node
}

impl StoreNode {
    pub(crate) fn from_parts(entity: Arc<Entity>, entries: IndexMap<String, StoreEntry>) -> Self {
        Self {
            inner: Rc::new(NodeInner {
                id: NodeId::new(),
                entity,
                entries: RefCell::new(entries),
                form: OnceCell::new(),
                pending_edit: RefCell::new(None),
            }),
        }
    }

    /// Node identifier.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Schema the node was built from.
    #[must_use]
    pub fn entity(&self) -> &Arc<Entity> {
        &self.inner.entity
    }

    /// Child by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<StoreEntry> {
        self.inner.entries.borrow().get(name).cloned()
    }

    /// Scalar child by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<EntityField> {
        match self.get(name)? {
            StoreEntry::Field(field) => Some(field),
            _ => None,
        }
    }

    /// Object child by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<StoreNode> {
        match self.get(name)? {
            StoreEntry::Node(node) => Some(node),
            _ => None,
        }
    }

    /// List child by name.
    #[must_use]
    pub fn list(&self, name: &str) -> Option<StoreListNode> {
        match self.get(name)? {
            StoreEntry::List(list) => Some(list),
            _ => None,
        }
    }

    /// Child names in order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.borrow().keys().cloned().collect()
    }

    /// Children in order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, StoreEntry)> {
        self.inner
            .entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether a child with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.entries.borrow().contains_key(name)
    }

    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    /// Whether the node has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    /// Whether a form overlay is attached.
    #[must_use]
    pub fn is_form(&self) -> bool {
        self.inner.form.get().is_some()
    }

    /// Non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakStoreNode {
        WeakStoreNode(Rc::downgrade(&self.inner))
    }

    pub(crate) fn insert_entry(&self, name: String, entry: StoreEntry) {
        self.inner.entries.borrow_mut().insert(name, entry);
    }

    pub(crate) fn remove_entry(&self, name: &str) -> Option<StoreEntry> {
        self.inner.entries.borrow_mut().shift_remove(name)
    }

    pub(crate) fn retain_entries(&self, keep: impl Fn(&str) -> bool) {
        self.inner.entries.borrow_mut().retain(|name, _| keep(name));
    }

    /// Merge `data` into the node.
    ///
    /// Keys absent from `data` are untouched and unknown keys are ignored.
    /// `null` clears a scalar, a nested object or a list. Lists are updated
    /// item by item, extra items are appended and surplus items dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidData`] if `data` does not match the node
    /// shape. The shape is checked before anything is written.
    pub fn set(&self, data: &Value) -> StoreResult<()> {
        untracked(|| check_node(self, data, ""))?;
        let _batch = BatchScope::new();
        self.apply(data)
    }

    /// Clear the node, then [`set`](Self::set) `data`, as one change.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set); nothing is cleared on error.
    pub fn replace(&self, data: &Value) -> StoreResult<()> {
        untracked(|| check_node(self, data, ""))?;
        let _batch = BatchScope::new();
        self.clear();
        self.apply(data)
    }

    /// Reset every scalar to `None` and empty every list, keeping the shape.
    pub fn clear(&self) {
        let _batch = BatchScope::new();
        for (_, entry) in self.entries() {
            match entry {
                StoreEntry::Field(field) => field.clear(),
                StoreEntry::Node(node) => node.clear(),
                StoreEntry::List(list) => list.clear(),
            }
        }
    }

    /// Plain JSON copy of the values.
    ///
    /// Undefined scalars are omitted, nested objects are always present and
    /// lists become arrays. Reads are tracked.
    #[must_use]
    pub fn to_flat_values(&self) -> Value {
        let mut map = Map::new();
        for (name, entry) in self.entries() {
            match entry {
                StoreEntry::Field(field) => {
                    if let Some(value) = field.value() {
                        map.insert(name, value);
                    }
                }
                StoreEntry::Node(node) => {
                    map.insert(name, node.to_flat_values());
                }
                StoreEntry::List(list) => {
                    map.insert(name, list.to_flat_values());
                }
            }
        }
        Value::Object(map)
    }

    pub(crate) fn apply(&self, data: &Value) -> StoreResult<()> {
        let Value::Object(map) = data else {
            return Ok(());
        };
        for (key, value) in map {
            match self.get(key) {
                Some(StoreEntry::Field(field)) => field.set_value(Some(value.clone())),
                Some(StoreEntry::Node(node)) if value.is_null() => node.clear(),
                Some(StoreEntry::Node(node)) => node.apply(value)?,
                Some(StoreEntry::List(list)) => match value {
                    Value::Array(items) => list.apply_nodes(items)?,
                    _ => list.clear(),
                },
                None => {}
            }
        }
        Ok(())
    }
}

/// Plain JSON copy of a node's values. See [`StoreNode::to_flat_values`].
#[must_use]
pub fn to_flat_values(node: &StoreNode) -> Value {
    node.to_flat_values()
}

/// Non-owning handle to a [`StoreNode`].
#[derive(Clone, Default)]
pub struct WeakStoreNode(Weak<NodeInner>);

impl WeakStoreNode {
    /// The node, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<StoreNode> {
        self.0.upgrade().map(|inner| StoreNode { inner })
    }
}

impl fmt::Debug for WeakStoreNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakStoreNode")
            .field(&(self.0.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// StoreListNode
// ============================================================================

pub(crate) struct ListInner {
    pub(crate) id: NodeId,
    pub(crate) entity: Arc<Entity>,
    pub(crate) items: Observable<Vec<StoreNode>>,
    pub(crate) hook: RefCell<Option<NodeBuilderHook>>,
    pub(crate) form: OnceCell<Rc<ListForm>>,
    pub(crate) pending_edit: RefCell<Option<EditCondition>>,
}

/// Ordered, observable list of store nodes of one entity.
#[derive(Clone)]
pub struct StoreListNode {
    pub(crate) inner: Rc<ListInner>,
}

impl PartialEq for StoreListNode {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for StoreListNode {}

impl fmt::Debug for StoreListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreListNode")
            .field("id", &self.inner.id)
            .field("entity", &self.inner.entity.name())
            .field("len", &untracked(|| self.len()))
            .field("form", &self.is_form())
            .finish()
    }
}

impl StoreListNode {
    /// Create an empty list of `entity` items.
    #[must_use]
    pub fn new(entity: Arc<Entity>) -> Self {
        Self::from_parts(entity, Vec::new(), None)
    }

    pub(crate) fn from_parts(
        entity: Arc<Entity>,
        items: Vec<StoreNode>,
        hook: Option<NodeBuilderHook>,
    ) -> Self {
        let list = Self {
            inner: Rc::new(ListInner {
                id: NodeId::new(),
                entity,
                items: Observable::new(items),
                hook: RefCell::new(hook),
                form: OnceCell::new(),
                pending_edit: RefCell::new(None),
            }),
        };
        tracing::trace!(entity = %list.inner.entity.name(), id = %list.id(), "store list built");
        list
    }

    /// List identifier.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Item schema.
    #[must_use]
    pub fn entity(&self) -> &Arc<Entity> {
        &self.inner.entity
    }

    /// Number of items, registering a dependency.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.with(Vec::len)
    }

    /// Whether the list is empty, registering a dependency.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item at `index`, registering a dependency.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<StoreNode> {
        self.inner.items.with(|items| items.get(index).cloned())
    }

    /// Snapshot of the items, registering a dependency.
    #[must_use]
    pub fn items(&self) -> Vec<StoreNode> {
        self.inner.items.get()
    }

    /// Item construction hook.
    #[must_use]
    pub fn hook(&self) -> Option<NodeBuilderHook> {
        self.inner.hook.borrow().clone()
    }

    /// Install or remove the item construction hook.
    ///
    /// Items already in the list are not affected.
    pub fn set_hook(&self, hook: Option<NodeBuilderHook>) {
        *self.inner.hook.borrow_mut() = hook;
    }

    /// Whether a form overlay is attached.
    #[must_use]
    pub fn is_form(&self) -> bool {
        self.inner.form.get().is_some()
    }

    /// Non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakStoreListNode {
        WeakStoreListNode(Rc::downgrade(&self.inner))
    }

    /// Append one item per element of `data`. Returns the new length.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidData`] if an element does not match the
    /// item shape; nothing is appended in that case.
    pub fn push_node(&self, data: &[Value]) -> StoreResult<usize> {
        let start = self.inner.items.get_untracked().len();
        untracked(|| {
            data.iter()
                .enumerate()
                .try_for_each(|(i, item)| check_entity(&self.inner.entity, item, &index_path("", start + i)))
        })?;
        let _batch = BatchScope::new();
        self.push_unchecked(data)
    }

    /// Replace every item with new ones built from `data`.
    ///
    /// # Errors
    ///
    /// Same as [`push_node`](Self::push_node); nothing is cleared on error.
    pub fn replace_nodes(&self, data: &[Value]) -> StoreResult<()> {
        untracked(|| {
            data.iter()
                .enumerate()
                .try_for_each(|(i, item)| check_entity(&self.inner.entity, item, &index_path("", i)))
        })?;
        let _batch = BatchScope::new();
        self.clear();
        self.push_unchecked(data).map(|_| ())
    }

    /// Update items by index, append extra elements and drop surplus items.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidData`] on shape mismatch; nothing is
    /// written in that case.
    pub fn set_nodes(&self, data: &[Value]) -> StoreResult<()> {
        untracked(|| check_items(self, data, ""))?;
        let _batch = BatchScope::new();
        self.apply_nodes(data)
    }

    /// Remove every item.
    pub fn clear(&self) {
        if !self.inner.items.get_untracked().is_empty() {
            self.inner.items.update(Vec::clear);
        }
    }

    /// Values of every item as a JSON array. Reads are tracked.
    #[must_use]
    pub fn to_flat_values(&self) -> Value {
        Value::Array(self.items().iter().map(StoreNode::to_flat_values).collect())
    }

    pub(crate) fn apply_nodes(&self, data: &[Value]) -> StoreResult<()> {
        let current = self.inner.items.get_untracked();
        for (item, value) in current.iter().zip(data) {
            item.apply(value)?;
        }
        if data.len() > current.len() {
            self.push_unchecked(&data[current.len()..])?;
        } else if data.len() < current.len() {
            self.inner.items.update(|items| items.truncate(data.len()));
        }
        Ok(())
    }

    fn push_unchecked(&self, data: &[Value]) -> StoreResult<usize> {
        let start = self.inner.items.get_untracked().len();
        let mut built = Vec::with_capacity(data.len());
        for (offset, value) in data.iter().enumerate() {
            let item = build_node(&self.inner.entity);
            if let Some(hook) = self.hook() {
                hook(&item);
            }
            item.apply(value)?;
            if let Some(list_form) = self.inner.form.get() {
                form::attach_list_item(list_form, &item, start + offset)?;
            }
            built.push(item);
        }
        if !built.is_empty() {
            self.inner.items.update(|items| items.extend(built));
        }
        Ok(start + data.len())
    }
}

/// Non-owning handle to a [`StoreListNode`].
#[derive(Clone, Default)]
pub struct WeakStoreListNode(Weak<ListInner>);

impl WeakStoreListNode {
    /// The list, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<StoreListNode> {
        self.0.upgrade().map(|inner| StoreListNode { inner })
    }
}

impl fmt::Debug for WeakStoreListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakStoreListNode")
            .field(&(self.0.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// EntityStore
// ============================================================================

/// Named set of root nodes and lists.
///
/// `set`, `replace` and `clear` dispatch each top-level key of the data to
/// the root with that name.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    roots: IndexMap<String, StoreEntry>,
}

impl EntityStore {
    /// Start declaring a store.
    #[must_use]
    pub fn builder() -> EntityStoreBuilder {
        EntityStoreBuilder::default()
    }

    /// Root by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StoreEntry> {
        self.roots.get(name)
    }

    /// Root node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<StoreNode> {
        match self.roots.get(name)? {
            StoreEntry::Node(node) => Some(node.clone()),
            _ => None,
        }
    }

    /// Root list by name.
    #[must_use]
    pub fn list(&self, name: &str) -> Option<StoreListNode> {
        match self.roots.get(name)? {
            StoreEntry::List(list) => Some(list.clone()),
            _ => None,
        }
    }

    /// Root names in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    /// Merge data into the roots named by its keys.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidData`] on shape mismatch; nothing is
    /// written in that case.
    pub fn set(&self, data: &Value) -> StoreResult<()> {
        untracked(|| self.check(data))?;
        let _batch = BatchScope::new();
        self.apply(data, false)
    }

    /// Replace the roots named by the keys of `data`.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn replace(&self, data: &Value) -> StoreResult<()> {
        untracked(|| self.check(data))?;
        let _batch = BatchScope::new();
        self.apply(data, true)
    }

    /// Clear every root.
    pub fn clear(&self) {
        let _batch = BatchScope::new();
        for root in self.roots.values() {
            match root {
                StoreEntry::Field(field) => field.clear(),
                StoreEntry::Node(node) => node.clear(),
                StoreEntry::List(list) => list.clear(),
            }
        }
    }

    /// JSON object of every root's values.
    #[must_use]
    pub fn to_flat_values(&self) -> Value {
        let map = self
            .roots
            .iter()
            .map(|(name, root)| {
                let value = match root {
                    StoreEntry::Field(field) => field.value().unwrap_or(Value::Null),
                    StoreEntry::Node(node) => node.to_flat_values(),
                    StoreEntry::List(list) => list.to_flat_values(),
                };
                (name.clone(), value)
            })
            .collect();
        Value::Object(map)
    }

    fn check(&self, data: &Value) -> StoreResult<()> {
        let Value::Object(map) = data else {
            return Err(invalid("", "object"));
        };
        for (key, value) in map {
            match self.roots.get(key) {
                Some(StoreEntry::Node(node)) if !value.is_null() => check_node(node, value, key)?,
                Some(StoreEntry::List(list)) if !value.is_null() => check_list(list, value, key)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(&self, data: &Value, replace: bool) -> StoreResult<()> {
        let Value::Object(map) = data else {
            return Ok(());
        };
        for (key, value) in map {
            match (self.roots.get(key), value) {
                (Some(StoreEntry::Field(field)), value) => field.set_value(Some(value.clone())),
                (Some(StoreEntry::Node(node)), Value::Null) => node.clear(),
                (Some(StoreEntry::Node(node)), value) => {
                    if replace {
                        node.clear();
                    }
                    node.apply(value)?;
                }
                (Some(StoreEntry::List(list)), Value::Array(items)) => {
                    if replace {
                        list.clear();
                    }
                    list.apply_nodes(items)?;
                }
                (Some(StoreEntry::List(list)), _) => list.clear(),
                (None, _) => {}
            }
        }
        Ok(())
    }
}

/// Fluent declaration of an [`EntityStore`].
#[derive(Debug, Default)]
pub struct EntityStoreBuilder {
    roots: IndexMap<String, StoreEntry>,
    error: Option<StoreError>,
}

impl EntityStoreBuilder {
    /// Declare a root node.
    #[must_use]
    pub fn node(self, name: impl Into<String>, entity: &Arc<Entity>) -> Self {
        self.root(name.into(), StoreEntry::Node(build_node(entity)))
    }

    /// Declare a root list.
    #[must_use]
    pub fn list(self, name: impl Into<String>, entity: &Arc<Entity>) -> Self {
        self.root(name.into(), StoreEntry::List(StoreListNode::new(Arc::clone(entity))))
    }

    fn root(mut self, name: String, entry: StoreEntry) -> Self {
        if self.error.is_none() {
            if self.roots.contains_key(&name) {
                self.error = Some(StoreError::DuplicateEntry(name));
            } else {
                self.roots.insert(name, entry);
            }
        }
        self
    }

    /// Finish the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateEntry`] if a root name was declared twice.
    pub fn build(self) -> StoreResult<EntityStore> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(EntityStore { roots: self.roots }),
        }
    }
}

// ============================================================================
// Shape checks
// ============================================================================

fn invalid(path: &str, expected: &'static str) -> StoreError {
    StoreError::InvalidData {
        path: if path.is_empty() { "$".to_string() } else { path.to_string() },
        expected,
    }
}

fn key_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn index_path(path: &str, index: usize) -> String {
    format!("{path}[{index}]")
}

fn check_node(node: &StoreNode, data: &Value, path: &str) -> StoreResult<()> {
    let Value::Object(map) = data else {
        return Err(invalid(path, "object"));
    };
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        match node.get(key) {
            Some(StoreEntry::Node(child)) => check_node(&child, value, &key_path(path, key))?,
            Some(StoreEntry::List(list)) => check_list(&list, value, &key_path(path, key))?,
            Some(StoreEntry::Field(_)) | None => {}
        }
    }
    Ok(())
}

fn check_list(list: &StoreListNode, data: &Value, path: &str) -> StoreResult<()> {
    let Value::Array(items) = data else {
        return Err(invalid(path, "array"));
    };
    check_items(list, items, path)
}

fn check_items(list: &StoreListNode, data: &[Value], path: &str) -> StoreResult<()> {
    let current = list.inner.items.get_untracked();
    for (i, value) in data.iter().enumerate() {
        match current.get(i) {
            Some(item) => check_node(item, value, &index_path(path, i))?,
            None => check_entity(&list.inner.entity, value, &index_path(path, i))?,
        }
    }
    Ok(())
}

fn check_entity(entity: &Arc<Entity>, data: &Value, path: &str) -> StoreResult<()> {
    let Value::Object(map) = data else {
        return Err(invalid(path, "object"));
    };
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        let item = match entity.entry(key) {
            Some(EntityEntry::Object(object)) => {
                check_entity(object, value, &key_path(path, key))?;
                continue;
            }
            Some(EntityEntry::List(item)) => item,
            Some(EntityEntry::RecursiveList) => entity,
            Some(EntityEntry::Field(_)) | None => continue,
        };
        let Value::Array(items) = value else {
            return Err(invalid(&key_path(path, key), "array"));
        };
        for (i, value) in items.iter().enumerate() {
            check_entity(item, value, &index_path(&key_path(path, key), i))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::FieldType;
    use serde_json::json;

    fn address() -> Arc<Entity> {
        Entity::builder("Address")
            .field(FieldEntry::builder("city", FieldType::String))
            .field(FieldEntry::builder("zip", FieldType::String))
            .build()
            .expect("valid entity")
    }

    fn person() -> Arc<Entity> {
        Entity::builder("Person")
            .field(FieldEntry::builder("firstName", FieldType::String).required(true))
            .field(FieldEntry::builder("age", FieldType::Number))
            .object("address", address())
            .recursive_list("children")
            .build()
            .expect("valid entity")
    }

    #[test]
    fn test_build_node_mirrors_entity() {
        let node = build_node(&person());
        assert_eq!(node.keys(), ["firstName", "age", "address", "children"]);
        assert_eq!(node.get("firstName").map(|e| e.kind()), Some("field"));
        assert_eq!(node.get("address").map(|e| e.kind()), Some("node"));
        assert_eq!(node.get("children").map(|e| e.kind()), Some("list"));
        assert!(node.field("firstName").and_then(|f| f.value()).is_none());
    }

    #[test]
    fn test_recursive_list_binds_enclosing_entity() {
        let entity = person();
        let node = build_node(&entity);
        let children = node.list("children").expect("children list");
        assert!(Arc::ptr_eq(children.entity(), &entity));
        assert!(children.is_empty());
    }

    #[test]
    fn test_value_read_is_tracked() {
        let node = build_node(&person());
        let field = node.field("firstName").expect("field");
        let reader = field.clone();
        let upper = crate::reactive::Computed::new(move || {
            reader.value().and_then(|v| v.as_str().map(str::to_uppercase))
        });

        assert_eq!(upper.get(), None);
        field.set_value(Some(json!("ada")));
        assert_eq!(upper.get().as_deref(), Some("ADA"));
        assert_eq!(field.value_untracked(), Some(json!("ada")));
    }

    #[test]
    fn test_set_merges() {
        let node = build_node(&person());
        node.set(&json!({ "firstName": "Ada", "age": 36 })).expect("set");
        node.set(&json!({ "age": 37, "unknown": true })).expect("set");

        assert_eq!(node.field("firstName").and_then(|f| f.value()), Some(json!("Ada")));
        assert_eq!(node.field("age").and_then(|f| f.value()), Some(json!(37)));
        assert_eq!(node.to_flat_values()["address"], json!({}));
    }

    #[test]
    fn test_null_clears_field() {
        let node = build_node(&person());
        node.set(&json!({ "firstName": "Ada" })).expect("set");
        node.set(&json!({ "firstName": null })).expect("set");
        assert!(node.field("firstName").and_then(|f| f.value()).is_none());
    }

    #[test]
    fn test_shape_mismatch_writes_nothing() {
        let node = build_node(&person());
        let err = node
            .set(&json!({ "firstName": "Ada", "address": "Paris" }))
            .expect_err("address must be an object");
        assert!(matches!(err, StoreError::InvalidData { ref path, expected: "object" } if path == "address"));
        assert!(node.field("firstName").and_then(|f| f.value()).is_none());

        let err = node
            .set(&json!({ "children": [{ "address": [] }] }))
            .expect_err("nested address must be an object");
        assert!(matches!(err, StoreError::InvalidData { ref path, .. } if path == "children[0].address"));
        assert!(matches!(node.set(&json!([1])), Err(StoreError::InvalidData { .. })));
    }

    #[test]
    fn test_replace_clears_missing_keys() {
        let node = build_node(&person());
        node.set(&json!({ "firstName": "Ada", "address": { "city": "London" } }))
            .expect("set");
        node.replace(&json!({ "age": 36 })).expect("replace");
        assert_eq!(node.to_flat_values(), json!({ "age": 36, "address": {}, "children": [] }));
    }

    #[test]
    fn test_list_operations() {
        let entity = person();
        let list = StoreListNode::new(Arc::clone(&entity));
        let len = list
            .push_node(&[json!({ "firstName": "A" }), json!({ "firstName": "B" })])
            .expect("push");
        assert_eq!(len, 2);

        list.set_nodes(&[json!({ "age": 1 }), json!({ "age": 2 }), json!({ "firstName": "C" })])
            .expect("set_nodes");
        assert_eq!(
            list.to_flat_values(),
            json!([
                { "firstName": "A", "age": 1, "address": {}, "children": [] },
                { "firstName": "B", "age": 2, "address": {}, "children": [] },
                { "firstName": "C", "address": {}, "children": [] },
            ])
        );

        list.set_nodes(&[json!({})]).expect("truncate");
        assert_eq!(list.len(), 1);

        list.replace_nodes(&[json!({ "age": 9 })]).expect("replace");
        assert_eq!(list.to_flat_values(), json!([{ "age": 9, "address": {}, "children": [] }]));
    }

    #[test]
    fn test_hook_runs_on_new_items() {
        let list = StoreListNode::new(person());
        let hook: NodeBuilderHook = Rc::new(|item: &StoreNode| {
            if let Some(field) = item.field("age") {
                field.set_value(Some(json!(18)));
            }
        });
        list.set_hook(Some(hook));
        list.push_node(&[json!({ "firstName": "A" }), json!({ "age": 40 })])
            .expect("push");
        let ages: Vec<_> = list
            .items()
            .iter()
            .map(|item| item.field("age").and_then(|f| f.value()))
            .collect();
        assert_eq!(ages, [Some(json!(18)), Some(json!(40))]);
    }

    #[test]
    fn test_fields_are_independent_cells() {
        let node = build_node(&person());
        let first = node.field("firstName").expect("field");
        let watched = first.clone();
        let upper = Computed::new(move || watched.value());
        let _ = upper.get();

        node.set(&json!({ "age": 3 })).expect("set");
        assert!(!upper.is_stale());
        node.set(&json!({ "firstName": "Ada" })).expect("set");
        assert!(upper.is_stale());
    }

    #[test]
    fn test_derived_field_without_setter_ignores_writes() {
        let entry = Arc::new(FieldEntry::builder("full", FieldType::String).build());
        let field = EntityField::with_cell(entry, ValueCell::derived(Rc::new(|| Some(json!("x"))), None));
        field.set_value(Some(json!("y")));
        field.clear();
        assert_eq!(field.value(), Some(json!("x")));
        assert!(field.is_derived());
    }

    #[test]
    fn test_string_for_uses_domain() {
        let node = build_node(&person());
        let age = node.field("age").expect("field");
        assert_eq!(string_for(&age), "");
        age.set_value(Some(json!(36)));
        assert_eq!(string_for(&age), "36");
    }

    #[test]
    fn test_entity_store_dispatches_roots() {
        let entity = person();
        let store = EntityStore::builder()
            .node("person", &entity)
            .list("friends", &entity)
            .build()
            .expect("store");
        store
            .set(&json!({ "person": { "firstName": "Ada" }, "friends": [{ "age": 1 }] }))
            .expect("set");
        assert_eq!(store.list("friends").map(|l| l.len()), Some(1));

        store.replace(&json!({ "person": { "age": 2 } })).expect("replace");
        assert_eq!(store.node("person").map(|n| n.to_flat_values()["age"].clone()), Some(json!(2)));
        assert!(store.node("person").and_then(|n| n.field("firstName")).and_then(|f| f.value()).is_none());

        store.clear();
        assert_eq!(store.list("friends").map(|l| l.len()), Some(0));
        assert!(matches!(
            EntityStore::builder().node("a", &entity).list("a", &entity).build(),
            Err(StoreError::DuplicateEntry(_))
        ));
    }
}
