//! Structural copies of store trees.
//!
//! A clone has the same shape as its source and its own value cells.
//! Schema references (`Arc<FieldEntry>`, `Arc<Entity>`), list item hooks and
//! derived-field closures are shared. With `deep`, stored values and list
//! items are copied too; otherwise fields start undefined and lists empty.
//!
//! Form trees cannot be cloned: a form is derived from a plain store tree
//! exactly once.

use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::store::{EntityField, StoreEntry, StoreListNode, StoreNode};

/// Clone a node and its whole subtree.
///
/// # Errors
///
/// Returns [`StoreError::CloneFormNode`] if `node` has a form overlay.
pub fn clone_node(node: &StoreNode, deep: bool) -> StoreResult<StoreNode> {
    if node.is_form() {
        return Err(StoreError::CloneFormNode(node.entity().name().to_string()));
    }
    let entries = node
        .entries()
        .into_iter()
        .map(|(name, entry)| {
            let copy = match &entry {
                StoreEntry::Field(field) => StoreEntry::Field(clone_field(field, deep)?),
                StoreEntry::Node(child) => StoreEntry::Node(clone_node(child, deep)?),
                StoreEntry::List(list) => StoreEntry::List(clone_list(list, deep)?),
            };
            Ok((name, copy))
        })
        .collect::<StoreResult<_>>()?;
    Ok(StoreNode::from_parts(Arc::clone(node.entity()), entries))
}

/// Clone a list, keeping its entity and item hook.
///
/// # Errors
///
/// Returns [`StoreError::CloneFormNode`] if `list` has a form overlay.
pub fn clone_list(list: &StoreListNode, deep: bool) -> StoreResult<StoreListNode> {
    if list.is_form() {
        return Err(StoreError::CloneFormNode(list.entity().name().to_string()));
    }
    let items = if deep {
        list.inner
            .items
            .get_untracked()
            .iter()
            .map(|item| clone_node(item, true))
            .collect::<StoreResult<_>>()?
    } else {
        Vec::new()
    };
    Ok(StoreListNode::from_parts(Arc::clone(list.entity()), items, list.hook()))
}

/// Clone a field: same schema entry, new value cell.
///
/// # Errors
///
/// Returns [`StoreError::CloneFormNode`] if `field` has a form overlay.
pub fn clone_field(field: &EntityField, deep: bool) -> StoreResult<EntityField> {
    if field.is_form() {
        return Err(StoreError::CloneFormNode(field.name().to_string()));
    }
    Ok(EntityField::with_cell(field.field(), field.inner.value.fresh(deep)))
}
