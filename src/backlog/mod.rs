//! Project backlogs: work item model, hierarchy organization and the API
//! client with its caching facade.

mod api_types;
mod cache;
mod cached_client;
mod client;
mod hierarchy;
mod organize;
mod types;

pub use api_types::{NewWorkItem, WorkItemPatch};
pub use cache::{project_prefix, BacklogQueryKey, WorkItemFilter};
pub use cached_client::CachedBacklogClient;
pub use client::{ApiClient, BacklogApi};
pub use hierarchy::{Level, ProjectHierarchy, WorkItemStats};
pub use organize::{extract_roots, group_by_parent, parent_index};
pub use types::{HierarchyNode, ItemPriority, ItemStatus, ItemType, WorkItem};
