//! Client for the HTTP background-removal service.

use std::time::Duration;

use log::{debug, error};
use rand::{distributions::Alphanumeric, Rng};
use thiserror::Error;

use crate::loader::{read_capped, MAX_BODY_BYTES};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000/remove-bg";
pub const FORM_FIELD: &str = "image";

#[derive(Debug, Error)]
pub enum RemovalError {
    #[error("background removal service returned status {0}")]
    Status(u16),
    #[error("background removal service unreachable: {0}")]
    Transport(String),
    #[error("failed to read response body: {0}")]
    Body(#[from] std::io::Error),
    #[error("background removal service returned an empty body")]
    EmptyBody,
    #[error("background removal response exceeds {0} bytes")]
    TooLarge(u64),
}

/// Anything that turns an uploaded photo into a cutout.
pub trait BackgroundRemover: Send + Sync {
    fn remove_background(&self, file_name: &str, bytes: &[u8]) -> Result<Vec<u8>, RemovalError>;
}

/// Posts the photo as `multipart/form-data` and returns the response body.
#[derive(Debug)]
pub struct RemovalClient {
    endpoint: String,
    agent: ureq::Agent,
    max_body: u64,
}

impl RemovalClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            endpoint: endpoint.into(),
            agent,
            max_body: MAX_BODY_BYTES,
        }
    }

    /// Caps the accepted response size. Larger bodies fail with
    /// [`RemovalError::TooLarge`].
    pub fn with_max_body(mut self, max_body: u64) -> Self {
        self.max_body = max_body;
        self
    }
}

impl BackgroundRemover for RemovalClient {
    fn remove_background(&self, file_name: &str, bytes: &[u8]) -> Result<Vec<u8>, RemovalError> {
        let boundary = multipart_boundary();
        let body = multipart_body(&boundary, FORM_FIELD, file_name, bytes);
        debug!(
            "POST {} ({} byte upload of {file_name})",
            self.endpoint,
            bytes.len()
        );

        let resp = self
            .agent
            .post(&self.endpoint)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={boundary}"),
            )
            .send_bytes(&body)
            .map_err(|err| match err {
                ureq::Error::Status(code, _) => {
                    error!("{} answered {code}", self.endpoint);
                    RemovalError::Status(code)
                }
                ureq::Error::Transport(transport) => {
                    error!("{} unreachable: {transport}", self.endpoint);
                    RemovalError::Transport(transport.to_string())
                }
            })?;

        let Some(cutout) = read_capped(resp.into_reader(), self.max_body)? else {
            error!("{} sent more than {} bytes", self.endpoint, self.max_body);
            return Err(RemovalError::TooLarge(self.max_body));
        };
        if cutout.is_empty() {
            return Err(RemovalError::EmptyBody);
        }
        Ok(cutout)
    }
}

pub fn multipart_boundary() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("----cutout{token}")
}

pub fn multipart_body(boundary: &str, field: &str, file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let file_name = file_name.replace('"', "_");
    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", guess_mime(&file_name)).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

fn guess_mime(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}
