use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Level of a work item in the project hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
  Epic,
  Story,
  Task,
  Subtask,
}

impl ItemType {
  pub const ALL: [ItemType; 4] = [
    ItemType::Epic,
    ItemType::Story,
    ItemType::Task,
    ItemType::Subtask,
  ];

  /// Type one level up, `None` for epics.
  pub fn parent_type(self) -> Option<ItemType> {
    match self {
      ItemType::Epic => None,
      ItemType::Story => Some(ItemType::Epic),
      ItemType::Task => Some(ItemType::Story),
      ItemType::Subtask => Some(ItemType::Task),
    }
  }

  /// Type one level down, `None` for subtasks.
  pub fn child_type(self) -> Option<ItemType> {
    match self {
      ItemType::Epic => Some(ItemType::Story),
      ItemType::Story => Some(ItemType::Task),
      ItemType::Task => Some(ItemType::Subtask),
      ItemType::Subtask => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ItemType::Epic => "epic",
      ItemType::Story => "story",
      ItemType::Task => "task",
      ItemType::Subtask => "subtask",
    }
  }
}

impl std::fmt::Display for ItemType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ItemType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ItemType::ALL
      .into_iter()
      .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| format!("unknown item type '{}'", s))
  }
}

/// Review state of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
  AiGenerated,
  InReview,
  Reviewed,
  Approved,
}

impl ItemStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      ItemStatus::AiGenerated => "ai_generated",
      ItemStatus::InReview => "in_review",
      ItemStatus::Reviewed => "reviewed",
      ItemStatus::Approved => "approved",
    }
  }
}

impl std::fmt::Display for ItemStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemPriority {
  Low,
  Medium,
  High,
  Critical,
}

impl ItemPriority {
  pub fn as_str(self) -> &'static str {
    match self {
      ItemPriority::Low => "low",
      ItemPriority::Medium => "medium",
      ItemPriority::High => "high",
      ItemPriority::Critical => "critical",
    }
  }
}

impl std::fmt::Display for ItemPriority {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

fn default_status() -> ItemStatus {
  ItemStatus::AiGenerated
}

fn default_priority() -> ItemPriority {
  ItemPriority::Medium
}

/// One node of a project's epic/story/task/subtask tree, as fetched (flat)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
  pub id: String,
  pub project_id: String,
  #[serde(default)]
  pub parent_id: Option<String>,
  pub item_type: ItemType,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default = "default_status")]
  pub status: ItemStatus,
  #[serde(default = "default_priority")]
  pub priority: ItemPriority,
  #[serde(default)]
  pub acceptance_criteria: Option<String>,
  #[serde(default)]
  pub estimated_hours: Option<f64>,
  #[serde(default)]
  pub order_index: i32,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub updated_at: Option<DateTime<Utc>>,
}

impl WorkItem {
  pub fn new(
    id: impl Into<String>,
    project_id: impl Into<String>,
    item_type: ItemType,
    title: impl Into<String>,
  ) -> Self {
    Self {
      id: id.into(),
      project_id: project_id.into(),
      parent_id: None,
      item_type,
      title: title.into(),
      description: None,
      status: ItemStatus::AiGenerated,
      priority: ItemPriority::Medium,
      acceptance_criteria: None,
      estimated_hours: None,
      order_index: 0,
      created_at: None,
      updated_at: None,
    }
  }

  pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
    self.parent_id = Some(parent_id.into());
    self
  }
}

/// Access to the fields the organizer needs
pub trait HierarchyNode {
  fn node_id(&self) -> &str;
  fn parent_id(&self) -> Option<&str>;
  fn item_type(&self) -> ItemType;
}

impl HierarchyNode for WorkItem {
  fn node_id(&self) -> &str {
    &self.id
  }

  fn parent_id(&self) -> Option<&str> {
    self.parent_id.as_deref()
  }

  fn item_type(&self) -> ItemType {
    self.item_type
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_levels_chain() {
    assert_eq!(ItemType::Epic.child_type(), Some(ItemType::Story));
    assert_eq!(ItemType::Subtask.parent_type(), Some(ItemType::Task));
    assert_eq!(ItemType::Epic.parent_type(), None);
    assert_eq!(ItemType::Subtask.child_type(), None);
  }

  #[test]
  fn test_item_type_from_str() {
    assert_eq!("Story".parse::<ItemType>(), Ok(ItemType::Story));
    assert!("bug".parse::<ItemType>().is_err());
  }

  #[test]
  fn test_decode_backend_item() {
    let json = r#"{
      "id": "b1",
      "project_id": "p1",
      "parent_id": "a1",
      "item_type": "story",
      "title": "Checkout flow",
      "status": "in_review",
      "priority": "high",
      "estimated_hours": 8,
      "order_index": 2,
      "created_at": "2024-03-01T10:00:00.123456+00:00"
    }"#;
    let item: WorkItem = serde_json::from_str(json).unwrap();
    assert_eq!(item.item_type, ItemType::Story);
    assert_eq!(item.status, ItemStatus::InReview);
    assert_eq!(item.priority, ItemPriority::High);
    assert_eq!(item.parent_id.as_deref(), Some("a1"));
    assert_eq!(item.estimated_hours, Some(8.0));
  }
}
