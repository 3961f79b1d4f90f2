//! Blocking client for the Joplin Data API (the Web Clipper service).
//!
//! Endpoints used:
//! - `POST /resources` (multipart: `data` file + `props` JSON)
//! - `POST /notes`
//! - `GET /folders` (paginated)
//! - `GET /ping`

use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part as FormPart};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::JoplinConfig;
use crate::error::{MailjotError, Result};
use crate::import::NoteStore;
use crate::model::document::{Folder, Note};
use crate::transcode::sink::{ResourceStore, Upload};

/// Body returned by `GET /ping` on a running clipper service.
const PING_RESPONSE: &str = "JoplinClipperServer";

/// Upper bound on folder pages fetched, in case the server never clears `has_more`.
const MAX_FOLDER_PAGES: u32 = 1000;

/// Any created item: only the id matters to us.
#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

/// One page of a paginated listing.
#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    #[serde(default)]
    has_more: bool,
}

/// Joplin Data API client.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct JoplinClient {
    client: Client,
    base_url: String,
    token: String,
}

impl JoplinClient {
    /// Build a client from configuration. Fails if no token is configured.
    pub fn new(config: &JoplinConfig) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(MailjotError::InvalidConfig(
                "Joplin token is not set (use --token, JOPLIN_TOKEN or [joplin] token)".into(),
            ));
        }

        Self::build(config, config.token.trim().to_string())
    }

    /// A client without a token. Only `/ping` answers it.
    pub fn anonymous(config: &JoplinConfig) -> Result<Self> {
        Self::build(config, String::new())
    }

    fn build(config: &JoplinConfig, token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            token,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    /// Check that the clipper service is up.
    pub fn ping(&self) -> Result<()> {
        let response = self.client.get(self.endpoint("ping")).send()?;
        let status = response.status();
        let text = response.text()?;
        if status.is_success() && text.trim() == PING_RESPONSE {
            Ok(())
        } else {
            Err(MailjotError::NoteStore(format!(
                "unexpected ping response ({status}): {}",
                text.trim()
            )))
        }
    }

    /// Fetch every folder, following pagination.
    pub fn folders(&self) -> Result<Vec<Folder>> {
        let mut folders = Vec::new();

        for page in 1..=MAX_FOLDER_PAGES {
            let page = page.to_string();
            let response = self
                .client
                .get(self.endpoint("folders"))
                .query(&[
                    ("token", self.token.as_str()),
                    ("fields", "id,title,parent_id"),
                    ("page", page.as_str()),
                ])
                .send()?;
            let response = check_status(response).map_err(MailjotError::NoteStore)?;
            let listing: Page<Folder> = serde_json::from_str(&response.text()?)?;

            folders.extend(listing.items);
            if !listing.has_more {
                return Ok(folders);
            }
        }

        warn!(pages = MAX_FOLDER_PAGES, "Stopped paging through folders");
        Ok(folders)
    }
}

impl ResourceStore for JoplinClient {
    fn create_resource(&self, upload: &Upload<'_>) -> Result<String> {
        let fail = |reason: String| MailjotError::upload(upload.filename, reason);

        let props = serde_json::json!({
            "title": upload.filename,
            "filename": upload.filename,
        });
        let data = FormPart::bytes(upload.data.to_vec())
            .file_name(upload.filename.to_string())
            .mime_str(upload.mime_type)
            .map_err(|e| fail(e.to_string()))?;
        let form = Form::new()
            .part("data", data)
            .text("props", props.to_string());

        let response = self
            .client
            .post(self.endpoint("resources"))
            .query(&[("token", self.token.as_str())])
            .multipart(form)
            .send()
            .map_err(|e| fail(e.to_string()))?;
        let response = check_status(response).map_err(fail)?;

        let created: Created = response
            .json()
            .map_err(|e| fail(format!("invalid response: {e}")))?;
        Ok(created.id)
    }
}

impl NoteStore for JoplinClient {
    fn create_note(&self, note: &Note) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint("notes"))
            .query(&[("token", self.token.as_str())])
            .json(note)
            .send()?;
        let response = check_status(response).map_err(MailjotError::NoteStore)?;
        let created: Created = serde_json::from_str(&response.text()?)?;
        debug!(id = %created.id, title = %note.title, "Created note");
        Ok(created.id)
    }

    fn list_folders(&self) -> Result<Vec<Folder>> {
        self.folders()
    }
}

/// Pass through 2xx responses; turn anything else into a message with the body text.
fn check_status(response: Response) -> std::result::Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(format!("HTTP {status}: {}", body.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: &str) -> JoplinConfig {
        JoplinConfig {
            token: token.to_string(),
            ..JoplinConfig::default()
        }
    }

    #[test]
    fn test_new_requires_token() {
        assert!(matches!(
            JoplinClient::new(&config("  ")),
            Err(MailjotError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_anonymous_needs_no_token() {
        assert!(JoplinClient::anonymous(&config("")).is_ok());
    }

    #[test]
    fn test_endpoint() {
        let client = JoplinClient::new(&config("secret")).expect("client");
        assert_eq!(client.endpoint("notes"), "http://localhost:41184/notes");
    }

    #[test]
    fn test_page_deserialize() {
        let json = r#"{"items":[{"id":"f1","title":"Inbox","parent_id":""}],"has_more":false}"#;
        let page: Page<Folder> = serde_json::from_str(json).expect("parse");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "Inbox");
        assert!(!page.has_more);
    }
}
