//! Pure reshaping of flat item lists into per-level parent groups.
//!
//! Nothing here clones or mutates its input: results borrow the caller's
//! items.

use std::collections::{BTreeMap, HashMap};

use super::types::{HierarchyNode, ItemType};

/// Group `items` by the parent id returned from `parent_of`.
///
/// Grouping is stable: each bucket keeps the relative input order. Items
/// without a parent are left out; whether that makes them roots or orphans
/// depends on the level and is up to the caller.
pub fn group_by_parent<'a, T, F>(items: &'a [T], parent_of: F) -> BTreeMap<&'a str, Vec<&'a T>>
where
  F: Fn(&'a T) -> Option<&'a str>,
{
  let mut groups: BTreeMap<&'a str, Vec<&'a T>> = BTreeMap::new();
  for item in items {
    if let Some(parent) = parent_of(item) {
      groups.entry(parent).or_default().push(item);
    }
  }
  groups
}

/// Items of `item_type` that have no parent, in input order.
pub fn extract_roots<T: HierarchyNode>(items: &[T], item_type: ItemType) -> Vec<&T> {
  items
    .iter()
    .filter(|item| item.item_type() == item_type && item.parent_id().is_none())
    .collect()
}

/// Child id to parent id, for every item that declares a parent.
pub fn parent_index<T: HierarchyNode>(items: &[T]) -> HashMap<&str, &str> {
  items
    .iter()
    .filter_map(|item| item.parent_id().map(|parent| (item.node_id(), parent)))
    .collect()
}
