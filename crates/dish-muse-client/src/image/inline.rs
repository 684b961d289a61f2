use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::ImageClient;
use crate::chat::APP_ID_HEADER;
use crate::errors::ClientError;

const INLINE_OPERATION: &str = "inline image generation";

static DATA_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"data:image/([A-Za-z0-9.+-]+);base64,([A-Za-z0-9+/]+={0,2})")
        .expect("data URI pattern should compile")
});

/// An image embedded as `data:image/<subtype>;base64,<payload>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataUri {
    /// Image subtype, for example `png` or `svg+xml`.
    pub subtype: String,
    /// Base64 payload, not decoded.
    pub payload: String,
}

impl DataUri {
    pub fn mime_type(&self) -> String {
        format!("image/{}", self.subtype)
    }

    /// Renders the URI back to its textual form (usable as an `<img src>`).
    pub fn as_uri(&self) -> String {
        format!("data:image/{};base64,{}", self.subtype, self.payload)
    }

    /// Decodes the payload into raw image bytes.
    pub fn decode(&self) -> Result<Vec<u8>, ClientError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.payload)
            .map_err(|e| ClientError::protocol(format!("invalid base64 image payload: {e}")))
    }
}

/// Finds the first `data:image/<subtype>;base64,<payload>` URI in `text`.
///
/// This is the only place that knows the inline-image text contract.
pub fn extract_data_uri(text: &str) -> Option<DataUri> {
    let captures = DATA_URI.captures(text)?;
    Some(DataUri {
        subtype: captures.get(1)?.as_str().to_ascii_lowercase(),
        payload: captures.get(2)?.as_str().to_string(),
    })
}

#[derive(serde::Deserialize)]
struct InlineResponse {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(serde::Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(serde::Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(serde::Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl InlineResponse {
    fn first_data_uri(&self) -> Option<DataUri> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .find_map(extract_data_uri)
    }
}

impl ImageClient {
    /// Generates an image in one synchronous call against the inline-image
    /// endpoint. No polling is involved.
    pub async fn generate_inline(&self, prompt: &str) -> Result<DataUri, ClientError> {
        let url = self
            .config
            .image_inline_url
            .as_deref()
            .ok_or_else(|| ClientError::Config("no inline image endpoint configured".into()))?;
        let body = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}]
        });
        let response = self
            .http
            .post(url)
            .header(APP_ID_HEADER, &self.config.app_id)
            .timeout(self.config.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::transport(INLINE_OPERATION, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::transport(INLINE_OPERATION, e))?;
        let parsed: InlineResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(ClientError::Http {
                    operation: INLINE_OPERATION,
                    status: status.as_u16(),
                    body: text,
                });
            }
            Err(e) => {
                return Err(ClientError::protocol(format!(
                    "invalid {INLINE_OPERATION} response: {e}"
                )));
            }
        };
        if parsed.status != 0 {
            let message = if parsed.msg.trim().is_empty() {
                "image generation request failed".to_string()
            } else {
                parsed.msg
            };
            return Err(ClientError::Api {
                status: parsed.status,
                message,
            });
        }
        let image = parsed.first_data_uri().ok_or_else(|| ClientError::MissingResult {
            task_id: "inline".into(),
        })?;
        debug!(
            subtype = %image.subtype,
            payload_len = image.payload.len(),
            "inline image received"
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn extracts_data_uri_embedded_in_prose() {
        let text = "Here is your dish: ![dish](data:image/PNG;base64,aGVsbG8=) enjoy";
        let uri = extract_data_uri(text).expect("uri");
        assert_eq!(uri.subtype, "png");
        assert_eq!(uri.payload, "aGVsbG8=");
        assert_eq!(uri.mime_type(), "image/png");
        assert_eq!(uri.as_uri(), "data:image/png;base64,aGVsbG8=");
        assert_eq!(uri.decode().expect("decode"), b"hello");
    }

    #[test]
    fn non_image_or_missing_payload_is_ignored() {
        assert_eq!(extract_data_uri("data:text/plain;base64,aGk="), None);
        assert_eq!(extract_data_uri("data:image/png;base64,"), None);
        assert_eq!(extract_data_uri("no image here"), None);
    }

    #[test]
    fn svg_subtype_is_kept() {
        let uri = extract_data_uri("data:image/svg+xml;base64,PHN2Zz4=").expect("uri");
        assert_eq!(uri.mime_type(), "image/svg+xml");
    }

    fn inline_client(server: &MockServer) -> ImageClient {
        let config = ClientConfig::new("app").image_inline_url(format!("{}/inline", server.uri()));
        ImageClient::new(config).expect("client")
    }

    #[tokio::test]
    async fn generate_inline_returns_first_embedded_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inline"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": 0,
                "msg": "",
                "candidates": [{"content": {"parts": [
                    {"text": "Generating..."},
                    {"text": "done: data:image/jpeg;base64,/9j/4AAQ"}
                ]}}]
            })))
            .mount(&server)
            .await;

        let image = inline_client(&server)
            .generate_inline("steamed fish")
            .await
            .expect("image");
        assert_eq!(image.subtype, "jpeg");
        assert_eq!(image.payload, "/9j/4AAQ");
    }

    #[tokio::test]
    async fn generate_inline_without_image_is_missing_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inline"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": 0,
                "candidates": [{"content": {"parts": [{"text": "sorry"}]}}]
            })))
            .mount(&server)
            .await;

        let err = inline_client(&server)
            .generate_inline("x")
            .await
            .expect_err("no image");
        assert!(matches!(err, ClientError::MissingResult { .. }));
    }

    #[tokio::test]
    async fn generate_inline_requires_endpoint() {
        let client = ImageClient::new(ClientConfig::new("app")).expect("client");
        let err = client.generate_inline("x").await.expect_err("no endpoint");
        assert!(matches!(err, ClientError::Config(_)));
    }
}
