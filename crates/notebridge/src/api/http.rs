//! reqwest implementation of [`NoteApi`].
//!
//! Every call is a form-encoded POST carrying the `token` field, except the
//! latest-note fetch which is a GET against the read API with the token in
//! the query string.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, RequestBuilder, Url};
use tracing::{debug, instrument, warn};

use super::{ApiError, BackupCount, Endpoint, NoteApi};

const SEND_TIMEOUT: Duration = Duration::from_secs(20);
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Note API client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpNoteApi {
    client: Client,
}

impl HttpNoteApi {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("notebridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    fn post(&self, url: Url, endpoint: &Endpoint, timeout: Duration) -> RequestBuilder {
        let request = self.client.post(url).timeout(timeout);
        with_basic_auth(request, endpoint)
    }

    fn cleanup_url(endpoint: &Endpoint) -> Url {
        let mut url = endpoint.url.clone();
        if endpoint.pretty {
            url.query_pairs_mut().append_pair("pretty", "1");
        }
        url
    }

    async fn cleanup_call(
        &self,
        endpoint: &Endpoint,
        fields: &[(&str, &str)],
    ) -> Result<String, ApiError> {
        let mut form = vec![("token", endpoint.credentials.token.as_str())];
        form.extend_from_slice(fields);

        let response = self
            .post(Self::cleanup_url(endpoint), endpoint, CLEANUP_TIMEOUT)
            .form(&form)
            .send()
            .await;
        read_body(response).await
    }
}

fn with_basic_auth(request: RequestBuilder, endpoint: &Endpoint) -> RequestBuilder {
    match &endpoint.credentials.basic {
        Some(basic) => request.basic_auth(&basic.user, Some(&basic.password)),
        None => request,
    }
}

/// Read a response body, turning non-success statuses into errors.
async fn read_body(
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<String, ApiError> {
    let response = response.map_err(|e| ApiError::Network(e.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::Network(e.to_string()))?;

    if !status.is_success() {
        warn!(status = status.as_u16(), "Remote call failed");
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    debug!(status = status.as_u16(), bytes = body.len(), "Remote call succeeded");
    Ok(body)
}

fn or_default(body: String, default: &str) -> String {
    if body.trim().is_empty() {
        default.to_string()
    } else {
        body
    }
}

#[async_trait]
impl NoteApi for HttpNoteApi {
    #[instrument(skip_all, fields(url = %endpoint.url, chars = text.chars().count()))]
    async fn send_text(&self, endpoint: &Endpoint, text: &str) -> Result<String, ApiError> {
        let response = self
            .post(endpoint.url.clone(), endpoint, SEND_TIMEOUT)
            .form(&[
                ("token", endpoint.credentials.token.as_str()),
                ("text", text),
            ])
            .send()
            .await;
        read_body(response).await.map(|body| or_default(body, "sent"))
    }

    #[instrument(skip_all, fields(url = %endpoint.url))]
    async fn test_connection(&self, endpoint: &Endpoint, text: &str) -> Result<String, ApiError> {
        let response = self
            .post(endpoint.url.clone(), endpoint, CONNECTION_TEST_TIMEOUT)
            .form(&[
                ("token", endpoint.credentials.token.as_str()),
                ("text", text),
            ])
            .send()
            .await;
        read_body(response).await.map(|body| or_default(body, "OK"))
    }

    #[instrument(skip_all, fields(url = %endpoint.url))]
    async fn fetch_latest_note(&self, endpoint: &Endpoint) -> Result<String, ApiError> {
        let mut url = Url::parse(&read_api_url(endpoint.url.as_str()))
            .map_err(|e| ApiError::UnexpectedResponse(format!("invalid read API URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("token", &endpoint.credentials.token)
            .append_pair("action", "latest_note");

        let request = with_basic_auth(self.client.get(url).timeout(FETCH_TIMEOUT), endpoint);
        read_body(request.send().await).await
    }

    #[instrument(skip_all, fields(url = %endpoint.url))]
    async fn delete_all_inbox(&self, endpoint: &Endpoint) -> Result<String, ApiError> {
        self.cleanup_call(endpoint, &[("confirm", "YES"), ("category", "INBOX")])
            .await
            .map(|body| or_default(body, "OK (empty response)"))
    }

    #[instrument(skip_all, fields(url = %endpoint.url))]
    async fn purge_backups(&self, endpoint: &Endpoint) -> Result<String, ApiError> {
        self.cleanup_call(endpoint, &[("purge_bak", "1"), ("confirm", "YES")])
            .await
            .map(|body| or_default(body, "OK (empty response)"))
    }

    #[instrument(skip_all, fields(url = %endpoint.url))]
    async fn backup_count(&self, endpoint: &Endpoint) -> Result<BackupCount, ApiError> {
        let body = self
            .cleanup_call(endpoint, &[("purge_bak", "1"), ("dry_run", "2")])
            .await?;

        match parse_backup_count(&body) {
            Some(count) => Ok(BackupCount {
                count,
                message: body,
            }),
            None if body.trim().is_empty() => {
                Err(ApiError::UnexpectedResponse("count not found".to_string()))
            }
            None => Err(ApiError::UnexpectedResponse(body)),
        }
    }
}

/// Map a configured note URL onto the read API.
///
/// `…/api.php` becomes `…/read_api.php`, and `…/api` or `…/api/` gain
/// `read_api.php`. Anything else is used as is. Matching ignores case.
#[must_use]
pub fn read_api_url(url: &str) -> String {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();

    if lower.ends_with("/api.php") {
        format!("{}/read_api.php", &url[..url.len() - "/api.php".len()])
    } else if lower.ends_with("/api/") {
        format!("{url}read_api.php")
    } else if lower.ends_with("/api") {
        format!("{url}/read_api.php")
    } else {
        url.to_string()
    }
}

fn count_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"(?i)"count"\s*:\s*(\d+)"#).ok())
        .as_ref()
}

/// Extract the backup count from a cleanup response.
///
/// Looks for a numeric `count` at the top level of a JSON object, then one
/// level down, and finally anywhere in the text.
#[must_use]
pub fn parse_backup_count(body: &str) -> Option<u64> {
    if body.trim().is_empty() {
        return None;
    }

    if let Ok(serde_json::Value::Object(root)) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(count) = root.get("count").and_then(serde_json::Value::as_u64) {
            return Some(count);
        }
        let nested = root
            .values()
            .filter_map(serde_json::Value::as_object)
            .find_map(|obj| obj.get("count").and_then(serde_json::Value::as_u64));
        if nested.is_some() {
            return nested;
        }
    }

    count_pattern()?
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
