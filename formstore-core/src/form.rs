//! Form overlays: edit mode, validation state and reset on top of a store
//! tree.
//!
//! [`node_to_form_node`] attaches a form sidecar to every node, list and
//! field of a tree, depth first. Each sidecar exposes computed state:
//!
//! - `is_edit`: the element's own flag AND its parent's `is_edit` AND its
//!   edit conditions. Turning edit mode off on a node turns it off for every
//!   descendant, whatever their own flag says.
//! - fields: `error` (see [`validate_field`]) and
//!   `is_valid = !is_edit || error.is_none()`.
//! - nodes and lists: `errors` (invalid children only) and `is_valid`.
//!
//! A form keeps a weak reference to the node it was derived from.
//! [`FormNode::reset`] copies the *current* values of that source, so a form
//! picks up changes made to the source since it was built.

use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::reactive::{reaction, untracked, BatchScope, Computed, Observable, Subscription};
use crate::store::{
    EntityField, StoreEntry, StoreListNode, StoreNode, WeakStoreListNode, WeakStoreNode,
};
use crate::validation::validate_field;

/// Validation errors of a node, keyed by child name.
pub type ErrorMap = IndexMap<String, FormErrors>;

/// Validation errors of one child.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FormErrors {
    /// Error of a scalar field.
    Field(String),
    /// Errors of a nested node.
    Node(ErrorMap),
    /// Errors of every list item, by index; valid items have empty maps.
    List(Vec<ErrorMap>),
}

/// When an element of a form is editable.
#[derive(Clone)]
pub enum EditCondition {
    /// Initial value of the element's own edit flag.
    Static(bool),
    /// Evaluated on every read; dependencies are tracked.
    Predicate(Rc<dyn Fn() -> bool>),
}

impl EditCondition {
    /// Predicate condition.
    pub fn when(predicate: impl Fn() -> bool + 'static) -> Self {
        Self::Predicate(Rc::new(predicate))
    }

    /// Current value of the condition.
    #[must_use]
    pub fn evaluate(&self) -> bool {
        match self {
            Self::Static(value) => *value,
            Self::Predicate(predicate) => predicate(),
        }
    }
}

impl Default for EditCondition {
    fn default() -> Self {
        Self::Static(true)
    }
}

impl From<bool> for EditCondition {
    fn from(value: bool) -> Self {
        Self::Static(value)
    }
}

impl fmt::Debug for EditCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

// ============================================================================
// Sidecars
// ============================================================================

struct EditState {
    own: Observable<bool>,
    is_edit: Computed<bool>,
}

impl EditState {
    /// Static conditions set the initial own flag, predicates are re-read.
    fn new(conditions: impl IntoIterator<Item = EditCondition>, parent: Option<Computed<bool>>) -> Self {
        let mut initial = true;
        let mut predicates = Vec::new();
        for condition in conditions {
            match condition {
                EditCondition::Static(value) => initial &= value,
                EditCondition::Predicate(predicate) => predicates.push(predicate),
            }
        }
        let own = Observable::new(initial);
        let flag = own.clone();
        let is_edit = Computed::new(move || {
            flag.get()
                && parent.as_ref().is_none_or(Computed::get)
                && predicates.iter().all(|predicate| predicate())
        });
        Self { own, is_edit }
    }
}

pub(crate) struct FieldForm {
    edit: EditState,
    error: Computed<Option<String>>,
    is_valid: Computed<bool>,
}

pub(crate) struct NodeForm {
    edit: EditState,
    errors: Computed<ErrorMap>,
    source: WeakStoreNode,
    sync: RefCell<Option<Subscription>>,
}

pub(crate) struct ListForm {
    edit: EditState,
    errors: Computed<Vec<ErrorMap>>,
    source: WeakStoreListNode,
    sync: RefCell<Option<Subscription>>,
}

fn take_pending(slot: &RefCell<Option<EditCondition>>) -> Option<EditCondition> {
    slot.borrow_mut().take()
}

fn ensure_plain_node(node: &StoreNode) -> StoreResult<()> {
    if node.is_form() {
        return Err(StoreError::CloneFormNode(node.entity().name().to_string()));
    }
    for (_, entry) in node.entries() {
        match entry {
            StoreEntry::Field(field) if field.is_form() => {
                return Err(StoreError::CloneFormNode(field.name().to_string()));
            }
            StoreEntry::Field(_) => {}
            StoreEntry::Node(child) => ensure_plain_node(&child)?,
            StoreEntry::List(list) => ensure_plain_list(&list)?,
        }
    }
    Ok(())
}

fn ensure_plain_list(list: &StoreListNode) -> StoreResult<()> {
    if list.is_form() {
        return Err(StoreError::CloneFormNode(list.entity().name().to_string()));
    }
    let items = list.inner.items.get_untracked();
    items.iter().try_for_each(ensure_plain_node)
}

fn attach_field(field: &EntityField, parent: &Computed<bool>) -> StoreResult<Rc<FieldForm>> {
    if field.is_form() {
        return Err(StoreError::CloneFormNode(field.name().to_string()));
    }
    let edit = EditState::new(take_pending(&field.inner.pending_edit), Some(parent.clone()));

    let weak = field.downgrade();
    let error = Computed::new(move || weak.upgrade().and_then(|field| validate_field(&field)));

    let (is_edit, field_error) = (edit.is_edit.clone(), error.clone());
    let is_valid = Computed::new(move || !is_edit.get() || field_error.get().is_none());

    let form = Rc::new(FieldForm {
        edit,
        error,
        is_valid,
    });
    field
        .inner
        .form
        .set(Rc::clone(&form))
        .map_err(|_| StoreError::CloneFormNode(field.name().to_string()))?;
    Ok(form)
}

fn attach_node(
    node: &StoreNode,
    source: WeakStoreNode,
    parent: Option<Computed<bool>>,
    condition: EditCondition,
) -> StoreResult<Rc<NodeForm>> {
    let name = || node.entity().name().to_string();
    if node.is_form() {
        return Err(StoreError::CloneFormNode(name()));
    }
    let conditions = std::iter::once(condition).chain(take_pending(&node.inner.pending_edit));
    let edit = EditState::new(conditions, parent);
    let source_node = source.upgrade();

    for (key, entry) in node.entries() {
        match entry {
            StoreEntry::Field(field) => {
                attach_field(&field, &edit.is_edit)?;
            }
            StoreEntry::Node(child) => {
                let child_source = source_node
                    .as_ref()
                    .and_then(|s| s.node(&key))
                    .map(|s| s.downgrade())
                    .unwrap_or_default();
                attach_node(&child, child_source, Some(edit.is_edit.clone()), EditCondition::default())?;
            }
            StoreEntry::List(list) => {
                let child_source = source_node
                    .as_ref()
                    .and_then(|s| s.list(&key))
                    .map(|s| s.downgrade())
                    .unwrap_or_default();
                attach_list(&list, child_source, Some(edit.is_edit.clone()), EditCondition::default())?;
            }
        }
    }

    let weak = node.downgrade();
    let errors = Computed::new(move || weak.upgrade().map(|node| node_errors(&node)).unwrap_or_default());

    let form = Rc::new(NodeForm {
        edit,
        errors,
        source,
        sync: RefCell::new(None),
    });
    node.inner
        .form
        .set(Rc::clone(&form))
        .map_err(|_| StoreError::CloneFormNode(name()))?;
    Ok(form)
}

fn attach_list(
    list: &StoreListNode,
    source: WeakStoreListNode,
    parent: Option<Computed<bool>>,
    condition: EditCondition,
) -> StoreResult<Rc<ListForm>> {
    let name = || list.entity().name().to_string();
    if list.is_form() {
        return Err(StoreError::CloneFormNode(name()));
    }
    let conditions = std::iter::once(condition).chain(take_pending(&list.inner.pending_edit));
    let edit = EditState::new(conditions, parent);

    for (index, item) in list.inner.items.get_untracked().iter().enumerate() {
        attach_item(&edit.is_edit, &source, item, index)?;
    }

    let weak = list.downgrade();
    let errors = Computed::new(move || {
        weak.upgrade()
            .map(|list| {
                list.items()
                    .iter()
                    .map(|item| item.inner.form.get().map(|form| form.errors.get()).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default()
    });

    let form = Rc::new(ListForm {
        edit,
        errors,
        source,
        sync: RefCell::new(None),
    });
    list.inner
        .form
        .set(Rc::clone(&form))
        .map_err(|_| StoreError::CloneFormNode(name()))?;
    Ok(form)
}

fn attach_item(
    parent: &Computed<bool>,
    source: &WeakStoreListNode,
    item: &StoreNode,
    index: usize,
) -> StoreResult<()> {
    let item_source = untracked(|| source.upgrade().and_then(|list| list.get(index)))
        .map(|node| node.downgrade())
        .unwrap_or_default();
    attach_node(item, item_source, Some(parent.clone()), EditCondition::default()).map(|_| ())
}

/// Attach the overlay to an item pushed into a form list.
pub(crate) fn attach_list_item(form: &ListForm, item: &StoreNode, index: usize) -> StoreResult<()> {
    ensure_plain_node(item)?;
    attach_item(&form.edit.is_edit, &form.source, item, index)
}

fn node_errors(node: &StoreNode) -> ErrorMap {
    let mut errors = ErrorMap::new();
    for (key, entry) in node.entries() {
        match entry {
            StoreEntry::Field(field) => {
                let Some(form) = field.inner.form.get() else { continue };
                if !form.is_valid.get() {
                    if let Some(error) = form.error.get() {
                        errors.insert(key, FormErrors::Field(error));
                    }
                }
            }
            StoreEntry::Node(child) => {
                let Some(form) = child.inner.form.get() else { continue };
                let child_errors = form.errors.get();
                if !child_errors.is_empty() {
                    errors.insert(key, FormErrors::Node(child_errors));
                }
            }
            StoreEntry::List(list) => {
                let Some(form) = list.inner.form.get() else { continue };
                let items = form.errors.get();
                if items.iter().any(|item| !item.is_empty()) {
                    errors.insert(key, FormErrors::List(items));
                }
            }
        }
    }
    errors
}

/// Attach a form overlay to `node`, deriving it from `source`.
///
/// `condition` is ANDed with any edit condition a builder stored on the
/// node. Children start editable.
///
/// # Errors
///
/// Returns [`StoreError::CloneFormNode`] if an overlay is already attached
/// anywhere in the tree. Nothing is attached in that case.
pub fn node_to_form_node(
    node: &StoreNode,
    source: &StoreNode,
    condition: impl Into<EditCondition>,
) -> StoreResult<FormNode> {
    ensure_plain_node(node)?;
    let form = attach_node(node, source.downgrade(), None, condition.into())?;
    tracing::debug!(entity = %node.entity().name(), id = %node.id(), "form overlay attached");
    Ok(FormNode {
        node: node.clone(),
        form,
    })
}

/// List counterpart of [`node_to_form_node`].
///
/// # Errors
///
/// Returns [`StoreError::CloneFormNode`] if an overlay is already attached
/// anywhere in the list. Nothing is attached in that case.
pub fn list_to_form_list(
    list: &StoreListNode,
    source: &StoreListNode,
    condition: impl Into<EditCondition>,
) -> StoreResult<FormListNode> {
    ensure_plain_list(list)?;
    let form = attach_list(list, source.downgrade(), None, condition.into())?;
    tracing::debug!(entity = %list.entity().name(), id = %list.id(), "form list overlay attached");
    Ok(FormListNode {
        list: list.clone(),
        form,
    })
}

// ============================================================================
// FormEntityField
// ============================================================================

/// A field with a form overlay.
#[derive(Clone)]
pub struct FormEntityField {
    field: EntityField,
    form: Rc<FieldForm>,
}

impl FormEntityField {
    /// View a field as a form field, if it has an overlay.
    #[must_use]
    pub fn from_field(field: &EntityField) -> Option<Self> {
        let form = Rc::clone(field.inner.form.get()?);
        Some(Self {
            field: field.clone(),
            form,
        })
    }

    /// Underlying field.
    #[must_use]
    pub fn as_field(&self) -> &EntityField {
        &self.field
    }

    /// Whether the field is editable.
    #[must_use]
    pub fn is_edit(&self) -> bool {
        self.form.edit.is_edit.get()
    }

    /// Set the field's own edit flag.
    pub fn set_edit(&self, edit: bool) {
        self.form.edit.own.set(edit);
    }

    /// Validation error of the current value, whether editable or not.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.form.error.get()
    }

    /// `true` when not editable or without error.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.form.is_valid.get()
    }
}

impl Deref for FormEntityField {
    type Target = EntityField;

    fn deref(&self) -> &EntityField {
        &self.field
    }
}

impl fmt::Debug for FormEntityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        untracked(|| {
            f.debug_struct("FormEntityField")
                .field("name", &self.field.name())
                .field("value", &self.field.value())
                .field("is_edit", &self.is_edit())
                .field("error", &self.error())
                .finish()
        })
    }
}

// ============================================================================
// FormNode
// ============================================================================

/// A store node with a form overlay.
#[derive(Clone)]
pub struct FormNode {
    node: StoreNode,
    form: Rc<NodeForm>,
}

impl FormNode {
    /// View a node as a form node, if it has an overlay.
    #[must_use]
    pub fn from_node(node: &StoreNode) -> Option<Self> {
        let form = Rc::clone(node.inner.form.get()?);
        Some(Self {
            node: node.clone(),
            form,
        })
    }

    /// Underlying node.
    #[must_use]
    pub fn as_node(&self) -> &StoreNode {
        &self.node
    }

    /// Form field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<FormEntityField> {
        FormEntityField::from_field(&self.node.field(name)?)
    }

    /// Nested form node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<FormNode> {
        Self::from_node(&self.node.node(name)?)
    }

    /// Nested form list by name.
    #[must_use]
    pub fn list(&self, name: &str) -> Option<FormListNode> {
        FormListNode::from_list(&self.node.list(name)?)
    }

    /// Whether the node is editable.
    #[must_use]
    pub fn is_edit(&self) -> bool {
        self.form.edit.is_edit.get()
    }

    /// Set the node's own edit flag.
    pub fn set_edit(&self, edit: bool) {
        self.form.edit.own.set(edit);
    }

    /// Errors of the invalid children.
    #[must_use]
    pub fn errors(&self) -> ErrorMap {
        self.form.errors.get()
    }

    /// Whether no child is invalid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.form.errors.get().is_empty()
    }

    /// The node this form was derived from, if still alive.
    #[must_use]
    pub fn source(&self) -> Option<StoreNode> {
        self.form.source.upgrade()
    }

    /// Whether [`reset`](Self::reset) can run.
    #[must_use]
    pub fn is_source_alive(&self) -> bool {
        self.source().is_some()
    }

    /// Clear the form and copy the current values of the source.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SourceDetached`] if the source was dropped.
    pub fn reset(&self) -> StoreResult<()> {
        let source = self
            .source()
            .ok_or_else(|| StoreError::SourceDetached(self.node.entity().name().to_string()))?;
        let values = untracked(|| source.to_flat_values());
        tracing::debug!(entity = %self.node.entity().name(), id = %self.node.id(), "form reset");
        let _batch = BatchScope::new();
        self.node.replace(&values)
    }

    /// Keep the form in sync with its source: every change of the source
    /// values resets the form.
    pub(crate) fn sync_with_source(&self) {
        let source = self.form.source.clone();
        let target = self.node.downgrade();
        let subscription = reaction(
            move || source.upgrade().map(|node| node.to_flat_values()),
            move |_| {
                let Some(form) = target.upgrade().as_ref().and_then(FormNode::from_node) else {
                    return;
                };
                tracing::debug!(id = %form.node.id(), "source changed");
                if let Err(error) = form.reset() {
                    tracing::debug!(%error, "form not reset");
                }
            },
        );
        *self.form.sync.borrow_mut() = Some(subscription);
    }

    /// Stop following the source. Idempotent.
    pub fn dispose(&self) {
        if let Some(subscription) = self.form.sync.borrow_mut().take() {
            subscription.dispose();
            tracing::debug!(id = %self.node.id(), "form disposed");
        }
    }
}

impl Deref for FormNode {
    type Target = StoreNode;

    fn deref(&self) -> &StoreNode {
        &self.node
    }
}

impl fmt::Debug for FormNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        untracked(|| {
            f.debug_struct("FormNode")
                .field("node", &self.node)
                .field("is_edit", &self.is_edit())
                .field("source_alive", &self.is_source_alive())
                .finish()
        })
    }
}

// ============================================================================
// FormListNode
// ============================================================================

/// A store list with a form overlay.
#[derive(Clone)]
pub struct FormListNode {
    list: StoreListNode,
    form: Rc<ListForm>,
}

impl FormListNode {
    /// View a list as a form list, if it has an overlay.
    #[must_use]
    pub fn from_list(list: &StoreListNode) -> Option<Self> {
        let form = Rc::clone(list.inner.form.get()?);
        Some(Self {
            list: list.clone(),
            form,
        })
    }

    /// Underlying list.
    #[must_use]
    pub fn as_list(&self) -> &StoreListNode {
        &self.list
    }

    /// Form item at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<FormNode> {
        FormNode::from_node(&self.list.get(index)?)
    }

    /// Form items.
    #[must_use]
    pub fn items(&self) -> Vec<FormNode> {
        self.list.items().iter().filter_map(FormNode::from_node).collect()
    }

    /// Whether the list is editable.
    #[must_use]
    pub fn is_edit(&self) -> bool {
        self.form.edit.is_edit.get()
    }

    /// Set the list's own edit flag.
    pub fn set_edit(&self, edit: bool) {
        self.form.edit.own.set(edit);
    }

    /// Errors of every item, by index.
    #[must_use]
    pub fn errors(&self) -> Vec<ErrorMap> {
        self.form.errors.get()
    }

    /// Whether every item is valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.form.errors.get().iter().all(IndexMap::is_empty)
    }

    /// The list this form was derived from, if still alive.
    #[must_use]
    pub fn source(&self) -> Option<StoreListNode> {
        self.form.source.upgrade()
    }

    /// Whether [`reset`](Self::reset) can run.
    #[must_use]
    pub fn is_source_alive(&self) -> bool {
        self.source().is_some()
    }

    /// Replace the items with copies of the current source items.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SourceDetached`] if the source was dropped.
    pub fn reset(&self) -> StoreResult<()> {
        let source = self
            .source()
            .ok_or_else(|| StoreError::SourceDetached(self.list.entity().name().to_string()))?;
        let values: Vec<Value> = untracked(|| source.items().iter().map(StoreNode::to_flat_values).collect());
        tracing::debug!(entity = %self.list.entity().name(), id = %self.list.id(), "form list reset");
        self.list.replace_nodes(&values)
    }

    pub(crate) fn sync_with_source(&self) {
        let source = self.form.source.clone();
        let target = self.list.downgrade();
        let subscription = reaction(
            move || source.upgrade().map(|list| list.to_flat_values()),
            move |_| {
                let Some(form) = target.upgrade().as_ref().and_then(FormListNode::from_list) else {
                    return;
                };
                tracing::debug!(id = %form.list.id(), "source list changed");
                if let Err(error) = form.reset() {
                    tracing::debug!(%error, "form list not reset");
                }
            },
        );
        *self.form.sync.borrow_mut() = Some(subscription);
    }

    /// Stop following the source. Idempotent.
    pub fn dispose(&self) {
        if let Some(subscription) = self.form.sync.borrow_mut().take() {
            subscription.dispose();
            tracing::debug!(id = %self.list.id(), "form list disposed");
        }
    }
}

impl Deref for FormListNode {
    type Target = StoreListNode;

    fn deref(&self) -> &StoreListNode {
        &self.list
    }
}

impl fmt::Debug for FormListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        untracked(|| {
            f.debug_struct("FormListNode")
                .field("list", &self.list)
                .field("is_edit", &self.is_edit())
                .finish()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone::clone_node;
    use crate::entity::{Entity, FieldEntry, FieldType};
    use crate::store::build_node;
    use crate::validation::REQUIRED_MESSAGE;
    use serde_json::json;
    use std::sync::Arc;

    fn person() -> Arc<Entity> {
        let address = Entity::builder("Address")
            .field(FieldEntry::builder("city", FieldType::String).required(true))
            .build()
            .expect("valid entity");
        Entity::builder("Person")
            .field(FieldEntry::builder("firstName", FieldType::String).required(true))
            .field(FieldEntry::builder("nickname", FieldType::String))
            .object("address", address)
            .recursive_list("children")
            .build()
            .expect("valid entity")
    }

    fn form_of(source: &StoreNode, edit: bool) -> FormNode {
        let working = clone_node(source, false).expect("plain node");
        let form = node_to_form_node(&working, source, edit).expect("overlay");
        form.reset().expect("source alive");
        form
    }

    #[test]
    fn test_required_field_errors_only_in_edit_mode() {
        let source = build_node(&person());
        let form = form_of(&source, true);
        let first = form.field("firstName").expect("form field");

        assert!(first.is_edit());
        assert_eq!(first.error().as_deref(), Some(REQUIRED_MESSAGE));
        assert!(!first.is_valid());

        form.set_edit(false);
        assert!(!first.is_edit());
        assert_eq!(first.error().as_deref(), Some(REQUIRED_MESSAGE));
        assert!(first.is_valid());
        assert!(form.is_valid());
    }

    #[test]
    fn test_errors_list_invalid_children_only() {
        let source = build_node(&person());
        source
            .set(&json!({ "firstName": "Ada", "children": [{ "firstName": "B" }, {}] }))
            .expect("set");
        let form = form_of(&source, true);

        assert_eq!(
            serde_json::to_value(form.errors()).expect("serializable"),
            json!({
                "address": { "city": REQUIRED_MESSAGE },
                "children": [
                    { "address": { "city": REQUIRED_MESSAGE } },
                    { "firstName": REQUIRED_MESSAGE, "address": { "city": REQUIRED_MESSAGE } },
                ],
            })
        );
        assert!(!form.is_valid());
        assert!(!form.list("children").expect("form list").is_valid());
    }

    #[test]
    fn test_parent_edit_cascades() {
        let source = build_node(&person());
        source.set(&json!({ "children": [{}] })).expect("set");
        let form = form_of(&source, true);
        let city = form.node("address").and_then(|a| a.field("city")).expect("city");
        let child = form.list("children").and_then(|l| l.get(0)).expect("child");

        city.set_edit(true);
        assert!(city.is_edit());
        assert!(child.is_edit());

        form.set_edit(false);
        assert!(!city.is_edit());
        assert!(!child.is_edit());
        assert!(!child.field("firstName").expect("field").is_edit());

        form.set_edit(true);
        city.set_edit(false);
        assert!(!city.is_edit());
        assert!(form.node("address").expect("node").is_edit());
    }

    #[test]
    fn test_predicate_condition_is_tracked() {
        let source = build_node(&person());
        let toggle = Observable::new(false);
        let flag = toggle.clone();
        let working = clone_node(&source, false).expect("plain node");
        let form = node_to_form_node(&working, &source, EditCondition::when(move || flag.get()))
            .expect("overlay");

        assert!(!form.is_edit());
        toggle.set(true);
        assert!(form.is_edit());
    }

    #[test]
    fn test_reset_reads_live_source() {
        let source = build_node(&person());
        source.set(&json!({ "firstName": "Ada" })).expect("set");
        let form = form_of(&source, true);
        let first = form.field("firstName").expect("field");

        first.set_value(Some(json!("edited")));
        assert_eq!(source.field("firstName").and_then(|f| f.value()), Some(json!("Ada")));

        source.set(&json!({ "firstName": "Grace" })).expect("set");
        form.reset().expect("reset");
        assert_eq!(first.value(), Some(json!("Grace")));

        form.reset().expect("reset");
        assert_eq!(form.to_flat_values(), source.to_flat_values());
    }

    #[test]
    fn test_reset_rebuilds_list_items_with_overlay() {
        let source = build_node(&person());
        source
            .set(&json!({ "children": [{ "firstName": "A" }, { "firstName": "B" }] }))
            .expect("set");
        let form = form_of(&source, true);
        let children = form.list("children").expect("form list");

        assert_eq!(children.items().len(), 2);
        let second = children.get(1).expect("item");
        assert_eq!(second.source(), source.list("children").and_then(|l| l.get(1)));

        children.push_node(&[json!({})]).expect("push");
        let third = children.get(2).expect("pushed item has overlay");
        assert!(!third.is_source_alive());
        assert!(!children.is_valid());
    }

    #[test]
    fn test_reset_fails_after_source_dropped() {
        let source = build_node(&person());
        let form = form_of(&source, true);
        drop(source);

        assert!(!form.is_source_alive());
        assert!(matches!(form.reset(), Err(StoreError::SourceDetached(_))));
        form.dispose();
        form.dispose();
    }

    #[test]
    fn test_overlay_twice_is_rejected() {
        let source = build_node(&person());
        let form = form_of(&source, true);
        assert!(matches!(
            node_to_form_node(form.as_node(), &source, true),
            Err(StoreError::CloneFormNode(_))
        ));
    }

    #[test]
    fn test_failed_overlay_leaves_tree_untouched() {
        let source = build_node(&person());
        source.set(&json!({ "children": [{}, {}] })).expect("set");
        let working = clone_node(&source, true).expect("plain node");

        let address = working.node("address").expect("address");
        let address_source = source.node("address").expect("address");
        node_to_form_node(&address, &address_source, true).expect("overlay");

        assert!(matches!(
            node_to_form_node(&working, &source, true),
            Err(StoreError::CloneFormNode(_))
        ));
        assert!(!working.is_form());
        assert!(!working.field("firstName").expect("field").is_form());
        assert!(!working.field("nickname").expect("field").is_form());

        let children = working.list("children").expect("children");
        let nested = children.get(1).and_then(|item| item.list("children")).expect("nested");
        let nested_source = source
            .list("children")
            .and_then(|list| list.get(1))
            .and_then(|item| item.list("children"))
            .expect("nested source");
        list_to_form_list(&nested, &nested_source, true).expect("overlay");
        assert!(matches!(
            list_to_form_list(&children, &children, true),
            Err(StoreError::CloneFormNode(_))
        ));
        assert!(!children.is_form());
        assert!(!children.get(0).expect("item").is_form());
        assert!(!children.get(0).expect("item").field("firstName").expect("field").is_form());
    }

    #[test]
    fn test_validation_recomputes_lazily() {
        let source = build_node(&person());
        let form = form_of(&source, true);
        let first = form.field("firstName").expect("field");
        assert!(first.error().is_some());

        crate::reactive::batch(|| {
            first.set_value(Some(json!("A")));
            first.set_value(Some(json!("Ad")));
        });
        assert!(first.error().is_none());
        assert_eq!(first.form.error.evaluations(), 2);
    }
}
