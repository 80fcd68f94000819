//! Organized, per-level view of a project's work items.
//!
//! A [`ProjectHierarchy`] is derived from one fetched flat list and is never
//! built independently of it. Epics without a parent are the roots. Every
//! other item that names a parent lands in exactly one bucket, keyed by its
//! own type and its parent id, as long as that parent is part of the same
//! fetch. Items whose parent is missing are orphans: they are kept out of the
//! buckets and are not promoted to roots. Non-epic items without any parent
//! are kept aside as unparented.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::organize::{extract_roots, group_by_parent, parent_index};
use super::types::{HierarchyNode, ItemType, WorkItem};
use crate::cache::Patchable;

/// Parent id to ordered children, for one child type
pub type Level = BTreeMap<String, Vec<WorkItem>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectHierarchy {
  items: Vec<WorkItem>,
  roots: Vec<WorkItem>,
  levels: BTreeMap<ItemType, Level>,
  orphans: Vec<WorkItem>,
  unparented: Vec<WorkItem>,
  parents: HashMap<String, String>,
}

impl ProjectHierarchy {
  pub fn from_items(items: Vec<WorkItem>) -> Self {
    let ids: HashSet<&str> = items.iter().map(|item| item.id.as_str()).collect();

    let roots = extract_roots(&items, ItemType::Epic)
      .into_iter()
      .cloned()
      .collect();

    let mut levels = BTreeMap::new();
    let mut orphans = Vec::new();
    for item_type in ItemType::ALL {
      let groups = group_by_parent(&items, |item| {
        item
          .parent_id
          .as_deref()
          .filter(|_| item.item_type == item_type)
      });

      let mut level = Level::new();
      for (parent, children) in groups {
        if ids.contains(parent) {
          level.insert(parent.to_string(), children.into_iter().cloned().collect());
        } else {
          orphans.extend(children.into_iter().cloned());
        }
      }
      if !level.is_empty() {
        levels.insert(item_type, level);
      }
    }
    // Keep orphans in fetch order rather than grouped by type
    let position: HashMap<&str, usize> = items
      .iter()
      .enumerate()
      .map(|(i, item)| (item.id.as_str(), i))
      .collect();
    orphans.sort_by_key(|item: &WorkItem| position.get(item.id.as_str()).copied());

    let unparented = items
      .iter()
      .filter(|item| item.item_type != ItemType::Epic && item.parent_id.is_none())
      .cloned()
      .collect();

    let parents = parent_index(&items)
      .into_iter()
      .filter(|(_, parent)| ids.contains(parent))
      .map(|(child, parent)| (child.to_string(), parent.to_string()))
      .collect();

    Self {
      items,
      roots,
      levels,
      orphans,
      unparented,
      parents,
    }
  }

  /// The source list, in fetch order.
  pub fn items(&self) -> &[WorkItem] {
    &self.items
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn get(&self, id: &str) -> Option<&WorkItem> {
    self.items.iter().find(|item| item.id == id)
  }

  /// Epics without a parent.
  pub fn roots(&self) -> &[WorkItem] {
    &self.roots
  }

  /// Parent-to-children mapping for items of `item_type`.
  pub fn level(&self, item_type: ItemType) -> Option<&Level> {
    self.levels.get(&item_type)
  }

  /// Direct children of `parent_id` that are of `item_type`.
  pub fn children(&self, parent_id: &str, item_type: ItemType) -> &[WorkItem] {
    self
      .levels
      .get(&item_type)
      .and_then(|level| level.get(parent_id))
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  /// Direct children of `parent_id` across all levels, shallowest type first.
  pub fn children_of(&self, parent_id: &str) -> Vec<&WorkItem> {
    self
      .levels
      .values()
      .filter_map(|level| level.get(parent_id))
      .flatten()
      .collect()
  }

  /// Parent of `id`, if it was part of the same fetch.
  pub fn parent_of(&self, id: &str) -> Option<&str> {
    self.parents.get(id).map(String::as_str)
  }

  /// Items whose declared parent was not part of the fetch.
  pub fn orphans(&self) -> &[WorkItem] {
    &self.orphans
  }

  /// Non-epic items that declare no parent at all.
  pub fn unparented(&self) -> &[WorkItem] {
    &self.unparented
  }

  pub fn stats(&self) -> WorkItemStats {
    WorkItemStats::from_items(&self.items)
  }

  fn bucket_mut(&mut self, item: &WorkItem) -> Option<&mut Vec<WorkItem>> {
    match item.parent_id() {
      Some(parent) => self.levels.get_mut(&item.item_type)?.get_mut(parent),
      None if item.item_type == ItemType::Epic => Some(&mut self.roots),
      None => None,
    }
  }
}

impl Patchable<WorkItem> for ProjectHierarchy {
  /// Replace the entry with `item.id` in the bucket `item` belongs to.
  ///
  /// Returns `None` when that bucket does not exist or does not hold the id,
  /// e.g. after a reparent; such changes need a refetch.
  fn patch(&self, item: &WorkItem) -> Option<Self> {
    let mut next = self.clone();

    let bucket = next.bucket_mut(item)?;
    let slot = bucket.iter_mut().find(|existing| existing.id == item.id)?;
    *slot = item.clone();

    if let Some(source) = next.items.iter_mut().find(|existing| existing.id == item.id) {
      *source = item.clone();
    }
    Some(next)
  }
}

/// Aggregate counts for a project's work items
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkItemStats {
  pub total_items: usize,
  pub by_type: BTreeMap<String, usize>,
  pub by_status: BTreeMap<String, usize>,
  pub by_priority: BTreeMap<String, usize>,
  pub total_estimated_hours: f64,
}

impl WorkItemStats {
  pub fn from_items(items: &[WorkItem]) -> Self {
    let mut stats = WorkItemStats {
      total_items: items.len(),
      ..Default::default()
    };
    for item in items {
      *stats.by_type.entry(item.item_type.to_string()).or_default() += 1;
      *stats.by_status.entry(item.status.to_string()).or_default() += 1;
      *stats
        .by_priority
        .entry(item.priority.to_string())
        .or_default() += 1;
      stats.total_estimated_hours += item.estimated_hours.unwrap_or(0.0);
    }
    stats
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backlog::{ItemPriority, ItemStatus};

  fn item(id: &str, item_type: ItemType, parent: Option<&str>) -> WorkItem {
    let item = WorkItem::new(id, "p1", item_type, format!("Item {}", id));
    match parent {
      Some(parent) => item.with_parent(parent),
      None => item,
    }
  }

  fn sample() -> ProjectHierarchy {
    ProjectHierarchy::from_items(vec![
      item("e1", ItemType::Epic, None),
      item("s1", ItemType::Story, Some("e1")),
      item("e2", ItemType::Epic, None),
      item("s2", ItemType::Story, Some("e1")),
      item("s3", ItemType::Story, Some("e2")),
      item("t1", ItemType::Task, Some("s1")),
      item("st1", ItemType::Subtask, Some("t1")),
      item("t2", ItemType::Task, Some("gone")),
      item("s4", ItemType::Story, None),
    ])
  }

  fn ids(items: &[WorkItem]) -> Vec<&str> {
    items.iter().map(|item| item.id.as_str()).collect()
  }

  #[test]
  fn test_roots_and_levels() {
    let h = sample();

    assert_eq!(ids(h.roots()), vec!["e1", "e2"]);
    assert_eq!(ids(h.children("e1", ItemType::Story)), vec!["s1", "s2"]);
    assert_eq!(ids(h.children("e2", ItemType::Story)), vec!["s3"]);
    assert_eq!(ids(h.children("s1", ItemType::Task)), vec!["t1"]);
    assert_eq!(ids(h.children("t1", ItemType::Subtask)), vec!["st1"]);
    assert!(h.children("e1", ItemType::Task).is_empty());
    assert_eq!(h.level(ItemType::Story).map(|l| l.len()), Some(2));
  }

  #[test]
  fn test_orphans_are_excluded_not_promoted() {
    let h = sample();

    assert_eq!(ids(h.orphans()), vec!["t2"]);
    assert!(h.level(ItemType::Task).unwrap().get("gone").is_none());
    assert!(!ids(h.roots()).contains(&"t2"));
    assert_eq!(h.parent_of("t2"), None);
  }

  #[test]
  fn test_every_reachable_item_in_exactly_one_bucket() {
    let h = sample();
    let bucketed: Vec<&str> = ItemType::ALL
      .iter()
      .filter_map(|t| h.level(*t))
      .flat_map(|level| level.values().flatten())
      .map(|item| item.id.as_str())
      .collect();

    let mut sorted = bucketed.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), bucketed.len());
    assert_eq!(sorted, vec!["s1", "s2", "s3", "st1", "t1"]);
    assert_eq!(ids(h.unparented()), vec!["s4"]);
  }

  #[test]
  fn test_parent_pointer_index() {
    let h = sample();
    assert_eq!(h.parent_of("st1"), Some("t1"));
    assert_eq!(h.parent_of("t1"), Some("s1"));
    assert_eq!(h.parent_of("e1"), None);
    assert_eq!(
      h.children_of("e1").iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
      vec!["s1", "s2"]
    );
  }

  #[test]
  fn test_patch_replaces_exactly_one_entry() {
    let h = sample();
    let mut updated = item("s2", ItemType::Story, Some("e1"));
    updated.title = "Renamed".to_string();
    updated.status = ItemStatus::Approved;

    let patched = h.patch(&updated).unwrap();

    let stories = patched.children("e1", ItemType::Story);
    assert_eq!(ids(stories), vec!["s1", "s2"]);
    assert_eq!(stories[1].title, "Renamed");
    assert_eq!(stories[0].title, "Item s1");
    assert_eq!(patched.get("s2").unwrap().status, ItemStatus::Approved);
    assert_eq!(patched.len(), h.len());
    // Source snapshot untouched
    assert_eq!(h.get("s2").unwrap().title, "Item s2");
  }

  #[test]
  fn test_patch_root_epic() {
    let h = sample();
    let mut updated = item("e2", ItemType::Epic, None);
    updated.priority = ItemPriority::Critical;

    let patched = h.patch(&updated).unwrap();
    assert_eq!(patched.roots()[1].priority, ItemPriority::Critical);
  }

  #[test]
  fn test_patch_without_matching_bucket_is_none() {
    let h = sample();

    // Parent bucket does not exist
    assert!(h.patch(&item("s9", ItemType::Story, Some("e9"))).is_none());
    // Bucket exists but does not hold the id (moved from e1 to e2)
    assert!(h.patch(&item("s1", ItemType::Story, Some("e2"))).is_none());
    // Orphans and unparented items have no bucket
    assert!(h.patch(&item("t2", ItemType::Task, Some("gone"))).is_none());
    assert!(h.patch(&item("s4", ItemType::Story, None)).is_none());
    assert!(ProjectHierarchy::default().patch(&item("e1", ItemType::Epic, None)).is_none());
  }

  #[test]
  fn test_stats() {
    let mut items = vec![
      item("e1", ItemType::Epic, None),
      item("s1", ItemType::Story, Some("e1")),
      item("s2", ItemType::Story, Some("e1")),
    ];
    items[1].estimated_hours = Some(5.0);
    items[2].estimated_hours = Some(3.5);
    items[2].status = ItemStatus::Reviewed;

    let stats = ProjectHierarchy::from_items(items).stats();
    assert_eq!(stats.total_items, 3);
    assert_eq!(stats.by_type["story"], 2);
    assert_eq!(stats.by_status["ai_generated"], 2);
    assert_eq!(stats.by_status["reviewed"], 1);
    assert_eq!(stats.by_priority["medium"], 3);
    assert_eq!(stats.total_estimated_hours, 8.5);
  }
}
