//! Cached backlog client that wraps a [`BacklogApi`] with transparent caching.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cache::{CacheCoordinator, CacheResult, CacheStats, CacheStore};
use crate::config::Config;
use crate::error::SyncResult;
use crate::jobs::{Job, JobStatus, JobTracker, RetryCoordinator, RetryEvent, RetryFailure};

use super::api_types::{NewWorkItem, WorkItemPatch};
use super::cache::{project_prefix, BacklogQueryKey, WorkItemFilter};
use super::client::{ApiClient, BacklogApi};
use super::hierarchy::{ProjectHierarchy, WorkItemStats};
use super::types::{ItemStatus, WorkItem};

/// Backlog client with caching, job polling and retried indexing.
///
/// Reads go through the hierarchy cache. Writes that keep an item in place
/// patch every cached view of its project; writes that change the shape of
/// the tree drop the project's views instead.
pub struct CachedBacklogClient<A: BacklogApi = ApiClient> {
  inner: Arc<A>,
  cache: CacheCoordinator<ProjectHierarchy>,
  retry: RetryCoordinator,
  tracker: JobTracker<A>,
}

impl CachedBacklogClient<ApiClient> {
  /// Create a new cached client talking to the configured API.
  pub fn new(config: &Config) -> Result<Self> {
    let api = ApiClient::new(config)?;
    Ok(Self::with_api(Arc::new(api), config))
  }
}

impl<A: BacklogApi> CachedBacklogClient<A> {
  pub fn with_api(api: Arc<A>, config: &Config) -> Self {
    let cache = CacheCoordinator::new(Arc::new(CacheStore::new())).with_ttl(config.cache_ttl());
    let tracker = JobTracker::new(Arc::clone(&api)).with_options(config.poll_options());

    Self {
      inner: api,
      cache,
      retry: RetryCoordinator::new(config.retry_policy()),
      tracker,
    }
  }

  pub fn api(&self) -> &Arc<A> {
    &self.inner
  }

  fn load(&self, key: &BacklogQueryKey) -> impl Future<Output = SyncResult<ProjectHierarchy>> {
    let fetch = match key {
      BacklogQueryKey::WorkItems { project_id, filter } => {
        self.inner.fetch_work_items(project_id, filter)
      }
    };
    async move { fetch.await.map(ProjectHierarchy::from_items) }
  }

  /// Organized work items of a project, served from cache while fresh.
  pub async fn project_hierarchy(
    &self,
    project_id: &str,
    filter: &WorkItemFilter,
    force_refresh: bool,
  ) -> SyncResult<CacheResult<Arc<ProjectHierarchy>>> {
    let key = BacklogQueryKey::work_items(project_id, filter.clone());
    self
      .cache
      .fetch_with_cache(&key.cache_key(), || self.load(&key), force_refresh)
      .await
  }

  /// Like [`project_hierarchy`](Self::project_hierarchy), but falls back to a
  /// stale view when the backend cannot be reached.
  pub async fn project_hierarchy_or_stale(
    &self,
    project_id: &str,
    filter: &WorkItemFilter,
    force_refresh: bool,
  ) -> SyncResult<CacheResult<Arc<ProjectHierarchy>>> {
    let key = BacklogQueryKey::work_items(project_id, filter.clone());
    self
      .cache
      .fetch_or_stale(&key.cache_key(), || self.load(&key), force_refresh)
      .await
  }

  /// Update an item on the server and fold the result into cached views.
  pub async fn update_work_item(&self, id: &str, patch: &WorkItemPatch) -> SyncResult<WorkItem> {
    let updated = self.inner.update_work_item(id, patch).await?;
    if patch.is_structural() {
      self.invalidate_project(&updated.project_id);
    } else {
      self.apply_item(&updated);
    }
    Ok(updated)
  }

  /// Change an item's review status, then refresh it in cached views.
  pub async fn update_status(&self, id: &str, status: ItemStatus) -> SyncResult<WorkItem> {
    self.inner.update_status(id, status).await?;
    let updated = self.inner.fetch_work_item(id).await?;
    self.apply_item(&updated);
    Ok(updated)
  }

  pub async fn create_work_item(&self, item: &NewWorkItem) -> SyncResult<WorkItem> {
    let created = self.inner.create_work_item(item).await?;
    self.invalidate_project(&created.project_id);
    Ok(created)
  }

  pub async fn delete_work_item(&self, project_id: &str, id: &str) -> SyncResult<()> {
    self.inner.delete_work_item(id).await?;
    self.invalidate_project(project_id);
    Ok(())
  }

  /// Patch `item` into every cached view of its project.
  ///
  /// Views that hold the item somewhere the patch cannot reach (an orphan,
  /// or a bucket it no longer belongs to) are dropped so they refetch.
  fn apply_item(&self, item: &WorkItem) {
    let prefix = project_prefix(&item.project_id);
    let patched = self.cache.apply_local_update(&prefix, item);

    let store = self.cache.store();
    let dropped = store
      .keys_with_prefix(&prefix)
      .into_iter()
      .filter(|key| {
        store
          .get(key)
          .is_some_and(|entry| entry.data.get(&item.id).is_some_and(|cached| cached != item))
      })
      .filter(|key| store.invalidate(key))
      .count();
    debug!(item_id = %item.id, patched, dropped, "Applied item update to cache");
  }

  /// Drop every cached view of a project. Returns how many were removed.
  pub fn invalidate_project(&self, project_id: &str) -> usize {
    let removed = self.cache.invalidate_prefix(&project_prefix(project_id));
    info!(project_id, removed, "Invalidated project cache");
    removed
  }

  /// Poll the job of an uploaded file until it settles.
  ///
  /// A finished job means new items exist server-side, so the job's project
  /// is invalidated before `on_update` sees the `done` snapshot.
  /// `on_update` runs under the tracker lock and must not call back into
  /// this client's job methods.
  pub fn watch_job<F>(&self, file_id: &str, mut on_update: F)
  where
    F: FnMut(&Job) + Send + 'static,
  {
    let cache = self.cache.clone();
    self.tracker.start(file_id, move |job| {
      if job.status == JobStatus::Done {
        if let Some(project_id) = &job.project_id {
          let removed = cache.invalidate_prefix(&project_prefix(project_id));
          debug!(project_id = %project_id, removed, "Job done, invalidated project cache");
        }
      }
      on_update(job);
    });
  }

  /// Channel flavor of [`watch_job`](Self::watch_job).
  pub fn job_updates(&self, file_id: &str) -> mpsc::UnboundedReceiver<Job> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.watch_job(file_id, move |job| {
      // Receiver may have been dropped
      let _ = tx.send(job.clone());
    });
    rx
  }

  pub fn stop_watching(&self, file_id: &str) -> bool {
    self.tracker.stop(file_id)
  }

  pub fn is_watching(&self, file_id: &str) -> bool {
    self.tracker.is_active(file_id)
  }

  /// Index a document, retrying with the configured policy.
  pub async fn index_document<N>(
    &self,
    project_id: &str,
    file_id: &str,
    on_event: N,
  ) -> SyncResult<String>
  where
    N: FnMut(&RetryEvent),
  {
    self
      .retry
      .run(
        file_id,
        || self.inner.index_document(project_id, file_id),
        on_event,
      )
      .await
  }

  /// Start a fresh indexing sequence after a previous one was exhausted.
  pub async fn retry_index_document<N>(
    &self,
    project_id: &str,
    failure: &RetryFailure,
    on_event: N,
  ) -> SyncResult<String>
  where
    N: FnMut(&RetryEvent),
  {
    let file_id = failure.subject.as_str();
    self
      .retry
      .retry_again(
        failure,
        || self.inner.index_document(project_id, file_id),
        on_event,
      )
      .await
  }

  pub fn is_indexing(&self, file_id: &str) -> bool {
    self.retry.is_running(file_id)
  }

  /// Aggregate counts over the project's unfiltered, cached item list.
  pub async fn stats(&self, project_id: &str) -> SyncResult<WorkItemStats> {
    let result = self
      .project_hierarchy(project_id, &WorkItemFilter::default(), false)
      .await?;
    Ok(result.data.stats())
  }

  pub fn cache_stats(&self) -> CacheStats {
    self.cache.stats()
  }
}
