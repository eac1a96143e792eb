//! HTTP recognition endpoint client.

use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::{debug, error, info};

use super::{ImageUpload, Recognizer};
use crate::error::ViewerError;
use crate::normalize::RawPayload;

/// Posts the image as multipart field `file` and decodes the JSON answer.
pub struct HttpRecognizer {
    url: String,
    client: reqwest::Client,
}

impl HttpRecognizer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl Recognizer for HttpRecognizer {
    fn name(&self) -> &str {
        "http"
    }

    async fn recognize(&self, upload: &ImageUpload) -> Result<RawPayload, ViewerError> {
        let part = Part::bytes(upload.data.clone())
            .file_name(upload.filename.clone())
            .mime_str(&upload.mime)?;
        let form = Form::new().part("file", part);

        info!(
            "HttpRecognizer: sending {} ({} bytes) to {}",
            upload.filename,
            upload.data.len(),
            self.url
        );

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!("Recognition endpoint unreachable: {}", e);
                ViewerError::Transport(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!("Recognition endpoint error ({}): {}", status, body);
            let detail = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or_else(|| format!("server responded with {}", status));
            return Err(ViewerError::Transport(detail));
        }

        debug!(
            "HttpRecognizer: response ({} bytes): {}",
            body.len(),
            body.chars().take(300).collect::<String>()
        );
        serde_json::from_str(&body).map_err(|e| {
            error!("Undecodable recognition response: {}", e);
            ViewerError::Transport(format!("invalid response body: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Multipart, http::StatusCode, response::Json, routing::post, Router};
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/recognize", addr)
    }

    fn upload() -> ImageUpload {
        ImageUpload {
            filename: "a.png".to_string(),
            mime: "image/png".to_string(),
            data: vec![9, 9, 9],
        }
    }

    #[tokio::test]
    async fn test_posts_file_field_and_decodes() {
        let app = Router::new().route(
            "/recognize",
            post(|mut multipart: Multipart| async move {
                let field = multipart.next_field().await.unwrap().unwrap();
                let name = field.name().unwrap_or_default().to_string();
                let len = field.bytes().await.unwrap().len();
                Json(json!({"text": format!("{}:{}", name, len), "image": ""}))
            }),
        );
        let url = serve(app).await;
        let recognizer = HttpRecognizer::new(url, Duration::from_secs(5)).unwrap();
        let payload = recognizer.recognize(&upload()).await.unwrap();
        match payload.text {
            Some(crate::normalize::RawText::Plain(s)) => assert_eq!(s, "file:3"),
            other => panic!("unexpected text: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_success_is_transport_error() {
        let app = Router::new().route(
            "/recognize",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "engine crashed"})),
                )
            }),
        );
        let url = serve(app).await;
        let recognizer = HttpRecognizer::new(url, Duration::from_secs(5)).unwrap();
        let err = recognizer.recognize(&upload()).await.unwrap_err();
        assert!(matches!(err, ViewerError::Transport(ref m) if m == "engine crashed"));
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        let recognizer =
            HttpRecognizer::new("http://127.0.0.1:9/recognize", Duration::from_secs(2)).unwrap();
        let err = recognizer.recognize(&upload()).await.unwrap_err();
        assert!(matches!(err, ViewerError::Transport(_)));
    }
}
