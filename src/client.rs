//! HTTP client for the scan API, used by `leafcheck scan`.

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{ScanRecord, ScanUpdate};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {message}")]
    Server { status: StatusCode, message: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub scan_id: i64,
    pub image_key: String,
}

#[derive(Deserialize)]
struct ScanEnvelope {
    scan: ScanRecord,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: String,
}

pub struct ScanClient {
    base_url: String,
    http: reqwest::Client,
}

impl ScanClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8787`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<UploadReceipt, ClientError> {
        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime.essence_str())?;
        let form = Form::new().part("image", part);

        let resp = self
            .http
            .post(format!("{}/api/upload-scan", self.base_url))
            .multipart(form)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn update(&self, id: i64, update: &ScanUpdate) -> Result<(), ClientError> {
        let resp = self
            .http
            .put(format!("{}/api/scans/{id}", self.base_url))
            .json(update)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<ScanRecord, ClientError> {
        let resp = self
            .http
            .get(format!("{}/api/scans/{id}", self.base_url))
            .send()
            .await?;
        let envelope: ScanEnvelope = check(resp).await?.json().await?;
        Ok(envelope.scan)
    }
}

/// Turn non-2xx responses into `ClientError::Server` with the server's message.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&text)
        .map(|e| e.error)
        .unwrap_or(text);
    Err(ClientError::Server { status, message })
}
