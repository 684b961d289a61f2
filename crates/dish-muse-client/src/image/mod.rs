//! Dish image generation.
//!
//! The primary backend is job based: [`ImageTaskApi::submit`] returns a task
//! id and [`poll_image`] queries it until a terminal state. Some deployments
//! instead answer synchronously with an inline `data:` URI, see
//! [`ImageClient::generate_inline`].

mod inline;
mod poll;

use std::fmt;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::chat::APP_ID_HEADER;
use crate::config::ClientConfig;
use crate::errors::ClientError;

pub use inline::{DataUri, extract_data_uri};
pub use poll::poll_image;

const SUBMIT_OPERATION: &str = "image submission";
const QUERY_OPERATION: &str = "image status query";

/// Opaque identifier of an image generation job.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend job state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Init,
    Wait,
    Running,
    Failed,
    Success,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Success)
    }
}

/// Snapshot of an image job as reported by one status query.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageJob {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Completion fraction reported by the backend.
    pub progress: f64,
    /// First result image, present once the job succeeded.
    pub result_url: Option<String>,
}

/// Job-based image backend.
#[async_trait::async_trait]
pub trait ImageTaskApi: Send + Sync {
    /// Starts a generation job for `prompt`. Never retried.
    async fn submit(&self, prompt: &str) -> Result<TaskId, ClientError>;

    /// Fetches the current state of a job.
    async fn query(&self, task_id: &TaskId) -> Result<ImageJob, ClientError>;
}

#[derive(serde::Deserialize)]
struct Envelope {
    status: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(serde::Deserialize)]
struct SubmitData {
    task_id: serde_json::Value,
}

#[derive(serde::Deserialize)]
struct QueryData {
    task_status: TaskStatus,
    #[serde(default)]
    task_progress_detail: Option<f64>,
    #[serde(default)]
    sub_task_result_list: Vec<SubTaskResult>,
}

#[derive(serde::Deserialize)]
struct SubTaskResult {
    #[serde(default)]
    final_image_list: Vec<FinalImage>,
}

#[derive(serde::Deserialize)]
struct FinalImage {
    #[serde(default)]
    img_url: Option<String>,
}

impl QueryData {
    fn first_image_url(&self) -> Option<String> {
        self.sub_task_result_list
            .first()?
            .final_image_list
            .first()?
            .img_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(ToOwned::to_owned)
    }
}

/// HTTP client for the image backend.
#[derive(Clone)]
pub struct ImageClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl ImageClient {
    /// Creates a client from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = config.http_client()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Submits `prompt` and polls the job with the configured policy.
    pub async fn generate(
        &self,
        prompt: &str,
        on_progress: impl FnMut(f64),
    ) -> Result<String, ClientError> {
        let task_id = self.submit(prompt).await?;
        poll_image(self, &task_id, &self.config.poll, on_progress).await
    }

    async fn post_envelope<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
        body: &serde_json::Value,
        fallback_msg: &str,
    ) -> Result<T, ClientError> {
        let response = self
            .http
            .post(url)
            .header(APP_ID_HEADER, &self.config.app_id)
            .timeout(self.config.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::transport(operation, e))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::transport(operation, e))?;
        decode_envelope(operation, status, &text, fallback_msg)
    }
}

#[async_trait::async_trait]
impl ImageTaskApi for ImageClient {
    async fn submit(&self, prompt: &str) -> Result<TaskId, ClientError> {
        let body = serde_json::json!({ "prompt": prompt });
        let data: SubmitData = self
            .post_envelope(
                SUBMIT_OPERATION,
                &self.config.image_submit_url,
                &body,
                "image generation request failed",
            )
            .await?;
        let task_id = task_id_from_value(&data.task_id)?;
        debug!(%task_id, "image job submitted");
        Ok(task_id)
    }

    async fn query(&self, task_id: &TaskId) -> Result<ImageJob, ClientError> {
        let body = serde_json::json!({ "task_id": task_id.as_str() });
        let data: QueryData = self
            .post_envelope(
                QUERY_OPERATION,
                &self.config.image_query_url,
                &body,
                "image status query failed",
            )
            .await?;
        Ok(ImageJob {
            task_id: task_id.clone(),
            status: data.task_status,
            progress: data.task_progress_detail.unwrap_or(0.0),
            result_url: data.first_image_url(),
        })
    }
}

fn decode_envelope<T: DeserializeOwned>(
    operation: &'static str,
    http_status: u16,
    text: &str,
    fallback_msg: &str,
) -> Result<T, ClientError> {
    let http_ok = (200..300).contains(&http_status);
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(_) if !http_ok => {
            return Err(ClientError::Http {
                operation,
                status: http_status,
                body: text.to_string(),
            });
        }
        Err(err) => {
            return Err(ClientError::protocol(format!(
                "invalid {operation} response: {err}"
            )));
        }
    };
    if envelope.status != 0 {
        let message = if envelope.msg.trim().is_empty() {
            fallback_msg.to_string()
        } else {
            envelope.msg
        };
        return Err(ClientError::Api {
            status: envelope.status,
            message,
        });
    }
    if !http_ok {
        return Err(ClientError::Http {
            operation,
            status: http_status,
            body: text.to_string(),
        });
    }
    serde_json::from_value(envelope.data)
        .map_err(|e| ClientError::protocol(format!("invalid {operation} payload: {e}")))
}

fn task_id_from_value(value: &serde_json::Value) -> Result<TaskId, ClientError> {
    let id = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    };
    if id.is_empty() {
        return Err(ClientError::protocol(
            "image submission response has no task_id",
        ));
    }
    Ok(TaskId(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ImageClient {
        ImageClient::new(
            ClientConfig::new("app-123")
                .image_submit_url(format!("{}/submit", server.uri()))
                .image_query_url(format!("{}/query", server.uri())),
        )
        .expect("client")
    }

    async fn mount_submit(server: &MockServer, status: u16, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/submit"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn submit_returns_task_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(header(APP_ID_HEADER, "app-123"))
            .and(body_json(serde_json::json!({"prompt": "braised pork"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": 0,
                "msg": "ok",
                "data": {"task_id": "task-42"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let task_id = client_for(&server).submit("braised pork").await.expect("submit");
        assert_eq!(task_id, TaskId::new("task-42"));
    }

    #[tokio::test]
    async fn submit_surfaces_server_message_exactly() {
        let server = MockServer::start().await;
        mount_submit(
            &server,
            200,
            serde_json::json!({"status": 999, "msg": "quota exceeded"}),
        )
        .await;

        let err = client_for(&server).submit("x").await.expect_err("should fail");
        assert_eq!(err.to_string(), "quota exceeded");
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn unauthorized_envelope_on_http_error_keeps_message() {
        let server = MockServer::start().await;
        mount_submit(
            &server,
            401,
            serde_json::json!({"status": 999, "msg": "app disabled"}),
        )
        .await;

        let err = client_for(&server).submit("x").await.expect_err("should fail");
        assert_eq!(
            err,
            ClientError::Api {
                status: 999,
                message: "app disabled".into()
            }
        );
    }

    #[tokio::test]
    async fn nonzero_status_without_message_uses_fallback() {
        let server = MockServer::start().await;
        mount_submit(&server, 200, serde_json::json!({"status": 3, "msg": ""})).await;

        let err = client_for(&server).submit("x").await.expect_err("should fail");
        assert_eq!(err.to_string(), "image generation request failed");
    }

    #[tokio::test]
    async fn plain_http_error_is_reported_as_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client_for(&server).submit("x").await.expect_err("should fail");
        assert!(matches!(err, ClientError::Http { status: 502, .. }));
    }

    #[tokio::test]
    async fn submit_transport_failure_is_generic_submission_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let client = ImageClient::new(
            ClientConfig::new("app").image_submit_url(format!("http://{addr}/submit")),
        )
        .expect("client");

        let err = client.submit("x").await.expect_err("should fail");
        assert!(matches!(
            err,
            ClientError::Transport {
                operation: SUBMIT_OPERATION,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn query_maps_status_progress_and_first_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(body_json(serde_json::json!({"task_id": "task-42"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": 0,
                "msg": "",
                "data": {
                    "log_id": 1,
                    "task_id": 42,
                    "task_status": "SUCCESS",
                    "task_progress_detail": 1.0,
                    "sub_task_result_list": [{
                        "sub_task_status": "SUCCESS",
                        "final_image_list": [
                            {"img_url": "https://img.example/dish.png", "width": 512, "height": 512},
                            {"img_url": "https://img.example/other.png"}
                        ]
                    }]
                }
            })))
            .mount(&server)
            .await;

        let job = client_for(&server)
            .query(&TaskId::new("task-42"))
            .await
            .expect("query");
        assert_eq!(job.status, TaskStatus::Success);
        assert_eq!(job.progress, 1.0);
        assert_eq!(job.result_url.as_deref(), Some("https://img.example/dish.png"));
    }

    #[test]
    fn running_job_without_results_has_no_url() {
        let job: QueryData = decode_envelope(
            QUERY_OPERATION,
            200,
            r#"{"status":0,"msg":"","data":{"task_status":"RUNNING","task_progress_detail":0.4}}"#,
            "image status query failed",
        )
        .expect("decode");
        assert_eq!(job.task_status, TaskStatus::Running);
        assert_eq!(job.first_image_url(), None);
    }

    #[test]
    fn numeric_task_ids_are_accepted() {
        assert_eq!(
            task_id_from_value(&serde_json::json!(1234)).expect("id"),
            TaskId::new("1234")
        );
        assert!(task_id_from_value(&serde_json::json!(null)).is_err());
    }
}
