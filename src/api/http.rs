//! HTTP implementation of [`AgentTransport`] against the agent backend.
//!
//! All endpoints return small JSON bodies except `/chat` and
//! `/get-final-result`, which switch to `text/plain` chunked transfer when the
//! backend streams the answer; classification happens on the response
//! content-type.

use super::{
    is_deferred_reply, AgentTransport, ChunkSource, FinalResult, PromptReply, UploadReceipt,
};
use crate::config::BackendConfig;
use crate::error::ApiError;
use crate::types::{ChatMessage, ProcessingStatus, SessionSummary, ThinkingStep};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// HTTP transport bound to one backend base URL.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

#[derive(Deserialize)]
struct ChatReplyBody {
    reply: String,
}

#[derive(Debug, Deserialize)]
struct FinalResultBody {
    result: Option<String>,
}

#[derive(Deserialize)]
struct SessionListBody {
    sessions: Vec<SessionSummary>,
}

#[derive(Deserialize)]
struct SaveSessionBody {
    session_id: String,
}

#[derive(Deserialize)]
struct SessionHistoryBody {
    chat_history: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct TitleBody {
    status: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct UploadBody {
    status: String,
    #[serde(default)]
    server_path: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct CurrentSessionBody {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    has_session: bool,
}

impl HttpTransport {
    /// Build a transport from resolved backend configuration.
    pub fn new(config: &BackendConfig) -> Self {
        // Fall back to reqwest defaults if builder creation fails for any reason.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Issue a bounded GET and parse the JSON body.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .http
            .get(self.url(path))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        parse_json_body(&response.text().await?)
    }
}

/// Map non-2xx responses to `ApiError::Status` with the body as context.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status(status.as_u16(), body))
}

/// Parse a JSON body, mapping decode failures to `InvalidResponse`.
fn parse_json_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

/// True when a response content-type announces a chunked text stream.
fn is_stream_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|value| value.starts_with("text/plain"))
}

fn response_is_stream(response: &reqwest::Response) -> bool {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    is_stream_content_type(content_type)
}

#[async_trait]
impl AgentTransport for HttpTransport {
    async fn send_prompt(&self, message: &str) -> Result<PromptReply, ApiError> {
        let response = self
            .http
            .post(self.url("chat"))
            .json(&json!({ "message": message }))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        if response_is_stream(&response) {
            return Ok(PromptReply::Stream(Box::new(HttpChunkSource::new(
                response,
            ))));
        }
        let body: ChatReplyBody = parse_json_body(&response.text().await?)?;
        if is_deferred_reply(&body.reply) {
            debug!("prompt classified as deferred");
            Ok(PromptReply::Deferred)
        } else {
            Ok(PromptReply::Immediate(body.reply))
        }
    }

    async fn fetch_reasoning_steps(&self) -> Result<Vec<ThinkingStep>, ApiError> {
        self.get_json("get-chat-history").await
    }

    async fn fetch_status(&self) -> Result<ProcessingStatus, ApiError> {
        self.get_json("get-processing-status").await
    }

    async fn fetch_final_result(&self) -> Result<FinalResult, ApiError> {
        // No per-request timeout here: a streamed result body may legitimately
        // take longer than the bounded-request budget.
        let response = self.http.get(self.url("get-final-result")).send().await?;
        let response = check_status(response).await?;
        if response_is_stream(&response) {
            return Ok(FinalResult::Stream(Box::new(HttpChunkSource::new(
                response,
            ))));
        }
        let body: FinalResultBody = parse_json_body(&response.text().await?)?;
        Ok(FinalResult::Json(body.result))
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ApiError> {
        let body: SessionListBody = self.get_json("sessions").await?;
        Ok(body.sessions)
    }

    async fn save_session(&self) -> Result<String, ApiError> {
        let response = self
            .http
            .post(self.url("save-session"))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: SaveSessionBody = parse_json_body(&response.text().await?)?;
        Ok(body.session_id)
    }

    async fn load_session(&self, session_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        let response = self
            .http
            .post(self.url("load-session"))
            .json(&json!({ "session_id": session_id }))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: SessionHistoryBody = parse_json_body(&response.text().await?)?;
        Ok(body.chat_history)
    }

    async fn new_chat(&self) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url("new-chat"))
            .timeout(self.request_timeout)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.url(&format!("session/{session_id}")))
            .timeout(self.request_timeout)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn generate_title(&self, session_id: &str) -> Result<String, ApiError> {
        let body: TitleBody = self
            .get_json(&format!("get-chat-title/{session_id}"))
            .await?;
        parse_title_body(body)
    }

    async fn upload_file(
        &self,
        name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadReceipt, ApiError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str(mime_type)?;
        let form = multipart::Form::new().part("file", part);
        let response = self
            .http
            .post(self.url("upload-file"))
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: UploadBody = parse_json_body(&response.text().await?)?;
        parse_upload_body(body)
    }

    async fn current_session(&self) -> Result<Option<String>, ApiError> {
        let body: CurrentSessionBody = self.get_json("current-session").await?;
        if body.has_session {
            Ok(body.session_id)
        } else {
            Ok(None)
        }
    }

    async fn list_model_files(&self) -> Result<Vec<String>, ApiError> {
        self.get_json("get-model-files").await
    }
}

fn parse_title_body(body: TitleBody) -> Result<String, ApiError> {
    if body.status != "success" {
        return Err(ApiError::InvalidResponse(
            body.message
                .unwrap_or_else(|| "title generation failed".to_string()),
        ));
    }
    body.title
        .filter(|title| !title.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidResponse("title response missing title".to_string()))
}

fn parse_upload_body(body: UploadBody) -> Result<UploadReceipt, ApiError> {
    if body.status != "success" {
        return Err(ApiError::InvalidResponse(
            body.message.unwrap_or_else(|| "upload failed".to_string()),
        ));
    }
    match (body.server_path, body.filename) {
        (Some(server_path), Some(filename)) => Ok(UploadReceipt {
            server_path,
            filename,
        }),
        _ => Err(ApiError::InvalidResponse(
            "upload response missing server_path/filename".to_string(),
        )),
    }
}

/// Chunked reader over one in-flight HTTP response body.
struct HttpChunkSource {
    response: reqwest::Response,
}

impl HttpChunkSource {
    fn new(response: reqwest::Response) -> Self {
        Self { response }
    }
}

#[async_trait]
impl ChunkSource for HttpChunkSource {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError> {
        let chunk = self.response.chunk().await?;
        Ok(chunk.map(|bytes| bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> HttpTransport {
        HttpTransport::new(&BackendConfig {
            base_url: "http://localhost:8001/".to_string(),
            request_timeout_secs: 30,
        })
    }

    #[test]
    fn url_joining_normalizes_slashes() {
        let t = transport();
        assert_eq!(t.url("chat"), "http://localhost:8001/chat");
        assert_eq!(t.url("/get-chat-history"), "http://localhost:8001/get-chat-history");
    }

    #[test]
    fn stream_content_type_detection() {
        assert!(is_stream_content_type(Some("text/plain")));
        assert!(is_stream_content_type(Some("text/plain; charset=utf-8")));
        assert!(!is_stream_content_type(Some("application/json")));
        assert!(!is_stream_content_type(None));
    }

    #[test]
    fn final_result_body_accepts_null_result() {
        let body: FinalResultBody = parse_json_body(r#"{"result": null}"#).expect("parse");
        assert_eq!(body.result, None);
        let body: FinalResultBody = parse_json_body(r#"{"result": "done"}"#).expect("parse");
        assert_eq!(body.result.as_deref(), Some("done"));
    }

    #[test]
    fn malformed_json_maps_to_invalid_response() {
        let err = parse_json_body::<FinalResultBody>("<html>oops</html>").unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[test]
    fn title_body_success_requires_title() {
        let ok = parse_title_body(TitleBody {
            status: "success".into(),
            title: Some("Trends in AI".into()),
            message: None,
        })
        .expect("title");
        assert_eq!(ok, "Trends in AI");

        let err = parse_title_body(TitleBody {
            status: "success".into(),
            title: None,
            message: None,
        })
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));

        let err = parse_title_body(TitleBody {
            status: "error".into(),
            title: None,
            message: Some("model unavailable".into()),
        })
        .unwrap_err();
        assert!(err.to_string().contains("model unavailable"));
    }

    #[test]
    fn upload_body_maps_error_message() {
        let receipt = parse_upload_body(UploadBody {
            status: "success".into(),
            server_path: Some("model_files/paper.pdf".into()),
            filename: Some("paper.pdf".into()),
            message: None,
        })
        .expect("receipt");
        assert_eq!(receipt.filename, "paper.pdf");

        let err = parse_upload_body(UploadBody {
            status: "error".into(),
            server_path: None,
            filename: None,
            message: Some("disk full".into()),
        })
        .unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn session_history_body_parses_role_content_pairs() {
        let body: SessionHistoryBody = parse_json_body(
            r#"{"chat_history": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ]}"#,
        )
        .expect("parse");
        assert_eq!(body.chat_history.len(), 2);
        assert_eq!(body.chat_history[1].content, "hello");
    }
}
