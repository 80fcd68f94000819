//! Serde types matching backlog API request and response bodies.
//!
//! These types are separate from domain types to allow clean (de)serialization
//! while keeping domain types focused on application needs.

use serde::{Deserialize, Serialize};

use super::types::{ItemPriority, ItemStatus, ItemType};

/// Partial update for `PUT /work-items/{id}`; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkItemPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub item_type: Option<ItemType>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<ItemPriority>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<ItemStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub acceptance_criteria: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub estimated_hours: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub order_index: Option<i32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parent_id: Option<String>,
}

impl WorkItemPatch {
  /// Whether applying this patch can move the item to another bucket.
  pub fn is_structural(&self) -> bool {
    self.item_type.is_some() || self.parent_id.is_some()
  }
}

/// Body for `POST /projects/{id}/work-items`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewWorkItem {
  pub project_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parent_id: Option<String>,
  pub item_type: ItemType,
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub priority: ItemPriority,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub acceptance_criteria: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub estimated_hours: Option<f64>,
  pub order_index: i32,
}

impl NewWorkItem {
  pub fn new(project_id: impl Into<String>, item_type: ItemType, title: impl Into<String>) -> Self {
    Self {
      project_id: project_id.into(),
      parent_id: None,
      item_type,
      title: title.into(),
      description: None,
      priority: ItemPriority::Medium,
      acceptance_criteria: None,
      estimated_hours: None,
      order_index: 0,
    }
  }

  pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
    self.parent_id = Some(parent_id.into());
    self
  }
}

/// FastAPI-style error body.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub detail: String,
}

/// Acknowledgement returned by action endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiMessage {
  pub message: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_patch_serializes_only_set_fields() {
    let patch = WorkItemPatch {
      title: Some("Renamed".into()),
      status: Some(ItemStatus::Approved),
      ..Default::default()
    };
    let json = serde_json::to_value(&patch).unwrap();
    assert_eq!(
      json,
      serde_json::json!({ "title": "Renamed", "status": "approved" })
    );
  }

  #[test]
  fn test_structural_patch() {
    assert!(!WorkItemPatch::default().is_structural());
    let reparent = WorkItemPatch {
      parent_id: Some("e2".into()),
      ..Default::default()
    };
    assert!(reparent.is_structural());
  }

  #[test]
  fn test_new_work_item_body() {
    let body = NewWorkItem::new("p1", ItemType::Task, "Write tests").with_parent("s1");
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json["item_type"], "task");
    assert_eq!(json["priority"], "medium");
    assert_eq!(json["parent_id"], "s1");
    assert!(json.get("description").is_none());
  }
}
