use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::jobs::{Job, JobStatusSource};

use super::api_types::{ApiErrorBody, ApiMessage, NewWorkItem, WorkItemPatch};
use super::cache::WorkItemFilter;
use super::types::{ItemStatus, WorkItem};

/// Remote operations the cached client builds on.
///
/// Futures are `'static` so they can be moved into spawned poll loops and
/// retry sequences.
pub trait BacklogApi: JobStatusSource {
  /// Flat list of a project's work items, in server order.
  fn fetch_work_items(
    &self,
    project_id: &str,
    filter: &WorkItemFilter,
  ) -> BoxFuture<'static, SyncResult<Vec<WorkItem>>>;

  fn fetch_work_item(&self, id: &str) -> BoxFuture<'static, SyncResult<WorkItem>>;

  /// Returns the item as stored after the update.
  fn update_work_item(
    &self,
    id: &str,
    patch: &WorkItemPatch,
  ) -> BoxFuture<'static, SyncResult<WorkItem>>;

  fn update_status(&self, id: &str, status: ItemStatus) -> BoxFuture<'static, SyncResult<()>>;

  fn create_work_item(&self, item: &NewWorkItem) -> BoxFuture<'static, SyncResult<WorkItem>>;

  fn delete_work_item(&self, id: &str) -> BoxFuture<'static, SyncResult<()>>;

  /// Ask the backend to index an uploaded document; returns its message.
  fn index_document(&self, project_id: &str, file_id: &str)
    -> BoxFuture<'static, SyncResult<String>>;
}

/// Backlog HTTP API client
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  token: Option<String>,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let base = Url::parse(&config.api.url)
      .map_err(|e| eyre!("Invalid API url {}: {}", config.api.url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Self::from_parts(http, base, Config::api_token())
  }

  pub fn from_parts(http: reqwest::Client, base: Url, token: Option<String>) -> Result<Self> {
    if base.cannot_be_a_base() {
      return Err(eyre!("API url cannot be used as a base: {}", base));
    }
    Ok(Self { http, base, token })
  }

  /// Build `{base}/{segments...}`, percent-encoding every segment.
  fn endpoint(&self, segments: &[&str]) -> SyncResult<Url> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| SyncError::Transport(format!("invalid base url: {}", self.base)))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    debug!(%method, %url, "API request");
    let request = self.http.request(method, url);
    match &self.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  async fn send(request: RequestBuilder) -> SyncResult<reqwest::Response> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(error_for_status(status, body))
  }

  async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> SyncResult<T> {
    let response = Self::send(request).await?;
    response
      .json::<T>()
      .await
      .map_err(|e| SyncError::Decode(e.to_string()))
  }

  /// Job attached to an uploaded file. `NotFound` until the backend creates it.
  pub async fn get_file_job(&self, file_id: &str) -> SyncResult<Job> {
    let url = self.endpoint(&["files", file_id, "job"])?;
    Self::send_json(self.request(Method::GET, url)).await
  }

  pub async fn get_work_items(
    &self,
    project_id: &str,
    filter: &WorkItemFilter,
  ) -> SyncResult<Vec<WorkItem>> {
    let url = self.endpoint(&["projects", project_id, "work-items"])?;
    let request = self
      .request(Method::GET, url)
      .query(&filter.query_pairs());
    Self::send_json(request).await
  }

  pub async fn get_work_item(&self, id: &str) -> SyncResult<WorkItem> {
    let url = self.endpoint(&["work-items", id])?;
    Self::send_json(self.request(Method::GET, url)).await
  }

  pub async fn put_work_item(&self, id: &str, patch: &WorkItemPatch) -> SyncResult<WorkItem> {
    let url = self.endpoint(&["work-items", id])?;
    Self::send_json(self.request(Method::PUT, url).json(patch)).await
  }

  pub async fn patch_status(&self, id: &str, status: ItemStatus) -> SyncResult<()> {
    let url = self.endpoint(&["work-items", id, "status"])?;
    let request = self
      .request(Method::PATCH, url)
      .query(&[("new_status", status.as_str())]);
    Self::send(request).await?;
    Ok(())
  }

  pub async fn post_work_item(&self, item: &NewWorkItem) -> SyncResult<WorkItem> {
    let url = self.endpoint(&["projects", &item.project_id, "work-items"])?;
    Self::send_json(self.request(Method::POST, url).json(item)).await
  }

  pub async fn remove_work_item(&self, id: &str) -> SyncResult<()> {
    let url = self.endpoint(&["work-items", id])?;
    Self::send(self.request(Method::DELETE, url)).await?;
    Ok(())
  }

  pub async fn post_index(&self, project_id: &str, file_id: &str) -> SyncResult<String> {
    let url = self.endpoint(&["projects", project_id, "documents", file_id, "index"])?;
    let ack: ApiMessage = Self::send_json(self.request(Method::POST, url)).await?;
    Ok(ack.message)
  }
}

/// Map a non-2xx response to an error, keeping the body.
///
/// 404 bodies are unwrapped from FastAPI's `{"detail": ...}` when possible.
fn error_for_status(status: StatusCode, body: String) -> SyncError {
  if status == StatusCode::NOT_FOUND {
    let detail = serde_json::from_str::<ApiErrorBody>(&body)
      .map(|err| err.detail)
      .unwrap_or(body);
    SyncError::NotFound(detail)
  } else {
    SyncError::Transport(format!("{}: {}", status, body))
  }
}

impl JobStatusSource for ApiClient {
  fn fetch_job_status(&self, subject_id: &str) -> BoxFuture<'static, SyncResult<Job>> {
    let client = self.clone();
    let file_id = subject_id.to_string();
    async move { client.get_file_job(&file_id).await }.boxed()
  }
}

impl BacklogApi for ApiClient {
  fn fetch_work_items(
    &self,
    project_id: &str,
    filter: &WorkItemFilter,
  ) -> BoxFuture<'static, SyncResult<Vec<WorkItem>>> {
    let client = self.clone();
    let project_id = project_id.to_string();
    let filter = filter.clone();
    async move { client.get_work_items(&project_id, &filter).await }.boxed()
  }

  fn fetch_work_item(&self, id: &str) -> BoxFuture<'static, SyncResult<WorkItem>> {
    let client = self.clone();
    let id = id.to_string();
    async move { client.get_work_item(&id).await }.boxed()
  }

  fn update_work_item(
    &self,
    id: &str,
    patch: &WorkItemPatch,
  ) -> BoxFuture<'static, SyncResult<WorkItem>> {
    let client = self.clone();
    let id = id.to_string();
    let patch = patch.clone();
    async move { client.put_work_item(&id, &patch).await }.boxed()
  }

  fn update_status(&self, id: &str, status: ItemStatus) -> BoxFuture<'static, SyncResult<()>> {
    let client = self.clone();
    let id = id.to_string();
    async move { client.patch_status(&id, status).await }.boxed()
  }

  fn create_work_item(&self, item: &NewWorkItem) -> BoxFuture<'static, SyncResult<WorkItem>> {
    let client = self.clone();
    let item = item.clone();
    async move { client.post_work_item(&item).await }.boxed()
  }

  fn delete_work_item(&self, id: &str) -> BoxFuture<'static, SyncResult<()>> {
    let client = self.clone();
    let id = id.to_string();
    async move { client.remove_work_item(&id).await }.boxed()
  }

  fn index_document(
    &self,
    project_id: &str,
    file_id: &str,
  ) -> BoxFuture<'static, SyncResult<String>> {
    let client = self.clone();
    let project_id = project_id.to_string();
    let file_id = file_id.to_string();
    async move { client.post_index(&project_id, &file_id).await }.boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(base: &str) -> ApiClient {
    ApiClient::from_parts(reqwest::Client::new(), Url::parse(base).unwrap(), None).unwrap()
  }

  #[test]
  fn test_endpoint_appends_to_base_path() {
    let api = client("http://localhost:8000/api");
    assert_eq!(
      api.endpoint(&["files", "f1", "job"]).unwrap().as_str(),
      "http://localhost:8000/api/files/f1/job"
    );

    let api = client("http://localhost:8000/api/");
    assert_eq!(
      api.endpoint(&["work-items", "w1"]).unwrap().as_str(),
      "http://localhost:8000/api/work-items/w1"
    );
  }

  #[test]
  fn test_endpoint_encodes_segments() {
    let api = client("http://localhost:8000/api");
    assert_eq!(
      api.endpoint(&["work-items", "a/b c"]).unwrap().as_str(),
      "http://localhost:8000/api/work-items/a%2Fb%20c"
    );
  }

  #[test]
  fn test_rejects_non_base_url() {
    let base = Url::parse("mailto:ops@example.com").unwrap();
    assert!(ApiClient::from_parts(reqwest::Client::new(), base, None).is_err());
  }

  #[test]
  fn test_not_found_unwraps_detail() {
    let err = error_for_status(
      StatusCode::NOT_FOUND,
      r#"{"detail":"No job found for this file"}"#.to_string(),
    );
    assert_eq!(err.to_string(), "not found: No job found for this file");
    assert!(err.is_not_found());
  }

  #[test]
  fn test_other_statuses_keep_body() {
    let err = error_for_status(StatusCode::BAD_GATEWAY, "upstream down".to_string());
    assert!(matches!(err, SyncError::Transport(ref msg) if msg.contains("upstream down")));
    assert!(err.to_string().contains("502"));
  }

  #[tokio::test]
  async fn test_file_job_not_found_until_created() {
    let mut server = mockito::Server::new_async().await;
    let api = client(&format!("{}/api", server.url()));

    let missing = server
      .mock("GET", "/api/files/f1/job")
      .with_status(404)
      .with_header("content-type", "application/json")
      .with_body(r#"{"detail":"No AI job found for this file"}"#)
      .create_async()
      .await;

    let err = api.fetch_job_status("f1").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "not found: No AI job found for this file");
    missing.assert_async().await;
    missing.remove_async().await;

    let created = server
      .mock("GET", "/api/files/f1/job")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(
        r#"{"id":"j1","project_id":"p1","file_id":"f1","status":"failed","progress":40,"error_message":"bad pdf"}"#,
      )
      .create_async()
      .await;

    let job = api.fetch_job_status("f1").await.unwrap();
    assert_eq!(job.id, "j1");
    assert_eq!(job.status, crate::jobs::JobStatus::Failed);
    assert_eq!(job.error_message(), Some("bad pdf"));
    created.assert_async().await;
  }

  #[tokio::test]
  async fn test_status_update_sends_query_and_token() {
    let mut server = mockito::Server::new_async().await;
    let base = Url::parse(&format!("{}/api", server.url())).unwrap();
    let api = ApiClient::from_parts(reqwest::Client::new(), base, Some("secret".into())).unwrap();

    let mock = server
      .mock("PATCH", "/api/work-items/w1/status")
      .match_query(mockito::Matcher::UrlEncoded(
        "new_status".into(),
        "in_review".into(),
      ))
      .match_header("authorization", "Bearer secret")
      .with_status(200)
      .with_body(r#"{"message":"ok"}"#)
      .create_async()
      .await;

    api.update_status("w1", ItemStatus::InReview).await.unwrap();
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_malformed_body_is_a_decode_error() {
    let mut server = mockito::Server::new_async().await;
    let api = client(&format!("{}/api", server.url()));

    let _mock = server
      .mock("GET", "/api/work-items/w1")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"unexpected":true}"#)
      .create_async()
      .await;

    let err = api.fetch_work_item("w1").await.unwrap_err();
    assert!(matches!(err, SyncError::Decode(_)));
  }
}
