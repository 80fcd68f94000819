//! Cache keys for backlog queries.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::types::ItemType;

/// Server-side filter for a work item listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct WorkItemFilter {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub item_type: Option<ItemType>,
}

impl WorkItemFilter {
  pub fn item_type(item_type: ItemType) -> Self {
    Self {
      item_type: Some(item_type),
    }
  }

  /// Query string pairs understood by the work item endpoint.
  pub fn query_pairs(&self) -> Vec<(&'static str, &'static str)> {
    self
      .item_type
      .map(|item_type| ("item_type", item_type.as_str()))
      .into_iter()
      .collect()
  }
}

/// Query key types for backlog API calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BacklogQueryKey {
  /// Flat work item listing of a project, organized on arrival
  WorkItems {
    project_id: String,
    filter: WorkItemFilter,
  },
}

impl BacklogQueryKey {
  pub fn work_items(project_id: impl Into<String>, filter: WorkItemFilter) -> Self {
    Self::WorkItems {
      project_id: project_id.into(),
      filter,
    }
  }

  /// Stable cache key; everything belonging to a project shares
  /// [`project_prefix`].
  pub fn cache_key(&self) -> String {
    match self {
      Self::WorkItems { project_id, filter } => format!(
        "{}work_items:{}",
        project_prefix(project_id),
        filter_digest(filter)
      ),
    }
  }

  pub fn project_id(&self) -> &str {
    match self {
      Self::WorkItems { project_id, .. } => project_id,
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::WorkItems { project_id, filter } => match filter.item_type {
        Some(item_type) => format!("{} items of project {}", item_type, project_id),
        None => format!("work items of project {}", project_id),
      },
    }
  }
}

/// Prefix shared by every cache key of `project_id`.
///
/// The id is form-encoded so a `:` inside it cannot make one project's
/// prefix match another project's keys.
pub fn project_prefix(project_id: &str) -> String {
  let encoded: String = url::form_urlencoded::byte_serialize(project_id.as_bytes()).collect();
  format!("project:{}:", encoded)
}

/// First 16 hex chars of the SHA256 of the filter's JSON form.
fn filter_digest(filter: &WorkItemFilter) -> String {
  let json = serde_json::to_vec(filter).unwrap_or_default();
  let mut hasher = Sha256::new();
  hasher.update(&json);
  let mut digest = hex::encode(hasher.finalize());
  digest.truncate(16);
  digest
}
