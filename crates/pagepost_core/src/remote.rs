use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::AuthConfig;
use crate::error::{PostError, Result};
use crate::format::PageBody;

pub const DEFAULT_USER_AGENT: &str = concat!("pagepost/", env!("CARGO_PKG_VERSION"));

const REST_API_PATH: &str = "rest/api";
const MAX_ERROR_DETAIL_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageId(pub String);

impl PageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operations the publisher needs from the remote wiki.
///
/// Every call blocks. Failures abort the whole run; nothing is retried.
pub trait WikiApi {
    fn find_page(&mut self, space: &str, title: &str) -> Result<Option<PageId>>;
    /// Identity of the last editor, comparable with the configured author.
    fn get_last_editor(&mut self, id: &PageId) -> Result<String>;
    fn create_page(
        &mut self,
        space: &str,
        title: &str,
        body: &PageBody,
        parent: Option<&PageId>,
    ) -> Result<PageId>;
    fn update_page(
        &mut self,
        id: &PageId,
        title: &str,
        body: &PageBody,
        minor_edit: bool,
        comment: Option<&str>,
    ) -> Result<()>;
    fn get_space(&mut self, key: &str) -> Result<String>;
    fn attach_file(&mut self, id: &PageId, path: &Path) -> Result<()>;
    /// Browser URL of a page, `None` if it does not exist.
    fn page_url(&mut self, space: &str, title: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
pub struct ConfluenceClientConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub is_cloud: bool,
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl ConfluenceClientConfig {
    pub fn new(auth: &AuthConfig, password: String) -> Self {
        Self {
            base_url: auth.base_url.clone(),
            username: auth.username.clone(),
            password,
            is_cloud: auth.is_cloud,
            user_agent: env_value("PAGEPOST_USER_AGENT", DEFAULT_USER_AGENT),
            timeout_ms: env_value_u64("PAGEPOST_HTTP_TIMEOUT_MS", 30_000),
        }
    }
}

pub struct ConfluenceClient {
    client: Client,
    config: ConfluenceClientConfig,
    api_root: Url,
    request_count: usize,
}

impl ConfluenceClient {
    pub fn new(config: ConfluenceClientConfig) -> Result<Self> {
        let api_root = Url::parse(&format!(
            "{}/{REST_API_PATH}/",
            config.base_url.trim_end_matches('/')
        ))
        .map_err(|error| {
            PostError::type_error(
                "auth.confluence_url",
                format!("invalid URL {}: {error}", config.base_url),
            )
        })?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|source| PostError::RemoteConnection {
                url: config.base_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            config,
            api_root,
            request_count: 0,
        })
    }

    pub fn request_count(&self) -> usize {
        self.request_count
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_root.join(path).map_err(|error| PostError::RemoteApi {
            status: 0,
            detail: format!("invalid endpoint {path}: {error}"),
        })
    }

    fn send(&mut self, request: RequestBuilder, url: &Url) -> Result<Response> {
        self.request_count += 1;
        let response = request
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Accept", "application/json")
            .send()
            .map_err(|source| PostError::RemoteConnection {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(PostError::RemoteApi {
            status: status.as_u16(),
            detail: error_detail(&body),
        })
    }

    fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status().as_u16();
        response.json::<T>().map_err(|error| PostError::RemoteApi {
            status,
            detail: format!("failed to decode response: {error}"),
        })
    }

    fn get_json<T: DeserializeOwned>(&mut self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!("GET {url}");
        let request = self.client.get(url.clone()).query(query);
        let response = self.send(request, &url)?;
        Self::decode(response)
    }

    fn write_json<T: DeserializeOwned>(
        &mut self,
        method: reqwest::Method,
        path: &str,
        payload: &Value,
    ) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!("{method} {url}");
        let request = self.client.request(method, url.clone()).json(payload);
        let response = self.send(request, &url)?;
        Self::decode(response)
    }

    fn search_page(&mut self, space: &str, title: &str) -> Result<ContentSearchResponse> {
        self.get_json(
            "content",
            &[
                ("type", "page"),
                ("spaceKey", space),
                ("title", title),
                ("expand", "version"),
            ],
        )
    }

    fn get_content(&mut self, id: &PageId) -> Result<ContentItem> {
        self.get_json(&format!("content/{id}"), &[("expand", "version")])
    }
}

impl WikiApi for ConfluenceClient {
    fn find_page(&mut self, space: &str, title: &str) -> Result<Option<PageId>> {
        let response = self.search_page(space, title)?;
        Ok(response
            .results
            .into_iter()
            .next()
            .map(|item| PageId(item.id)))
    }

    fn get_last_editor(&mut self, id: &PageId) -> Result<String> {
        let content = self.get_content(id)?;
        let identity = content
            .version
            .and_then(|version| version.by)
            .and_then(|by| editor_identity(by, self.config.is_cloud));
        identity.ok_or_else(|| PostError::RemoteApi {
            status: 200,
            detail: format!("page {id} has no last editor information"),
        })
    }

    fn create_page(
        &mut self,
        space: &str,
        title: &str,
        body: &PageBody,
        parent: Option<&PageId>,
    ) -> Result<PageId> {
        let mut payload = json!({
            "type": "page",
            "title": title,
            "space": {"key": space},
            "body": body_payload(body),
        });
        if let Some(parent) = parent {
            payload["ancestors"] = json!([{"type": "page", "id": parent.as_str()}]);
        }
        info!("creating page '{title}' in space {space}");
        let created: ContentItem = self.write_json(reqwest::Method::POST, "content", &payload)?;
        Ok(PageId(created.id))
    }

    fn update_page(
        &mut self,
        id: &PageId,
        title: &str,
        body: &PageBody,
        minor_edit: bool,
        comment: Option<&str>,
    ) -> Result<()> {
        let current = self
            .get_content(id)?
            .version
            .map(|version| version.number)
            .unwrap_or(0);
        let payload = update_payload(id, title, body, current, minor_edit, comment);
        info!(
            "updating page {id} from version {current} to {}",
            current + 1
        );
        let _: ContentItem =
            self.write_json(reqwest::Method::PUT, &format!("content/{id}"), &payload)?;
        Ok(())
    }

    fn get_space(&mut self, key: &str) -> Result<String> {
        let space: SpaceResponse = self.get_json(&format!("space/{key}"), &[])?;
        Ok(match space.id {
            Value::String(id) => id,
            other => other.to_string(),
        })
    }

    fn attach_file(&mut self, id: &PageId, path: &Path) -> Result<()> {
        let url = self.endpoint(&format!("content/{id}/child/attachment"))?;
        let form = multipart::Form::new()
            .file("file", path)
            .map_err(|error| PostError::io(path, error))?;
        debug!("PUT {url} ({})", path.display());
        // Attachment uploads are rejected without this header.
        let request = self
            .client
            .put(url.clone())
            .header("X-Atlassian-Token", "no-check")
            .multipart(form);
        self.send(request, &url)?;
        Ok(())
    }

    fn page_url(&mut self, space: &str, title: &str) -> Result<Option<String>> {
        let response = self.search_page(space, title)?;
        let base = response
            .links
            .base
            .unwrap_or_else(|| self.config.base_url.clone());
        Ok(response
            .results
            .into_iter()
            .next()
            .and_then(|item| item.links.webui)
            .map(|webui| format!("{}{}", base.trim_end_matches('/'), webui)))
    }
}

/// Cloud instances identify editors by e-mail, server instances by username.
fn editor_identity(author: VersionAuthor, is_cloud: bool) -> Option<String> {
    if is_cloud {
        author.email
    } else {
        author.username
    }
}

fn update_payload(
    id: &PageId,
    title: &str,
    body: &PageBody,
    current: u64,
    minor_edit: bool,
    comment: Option<&str>,
) -> Value {
    let mut payload = json!({
        "id": id.as_str(),
        "type": "page",
        "title": title,
        "body": body_payload(body),
        "version": {"number": current + 1, "minorEdit": minor_edit},
    });
    if let Some(comment) = comment {
        payload["version"]["message"] = json!(comment);
    }
    payload
}

fn body_payload(body: &PageBody) -> Value {
    let representation = body.representation.as_str();
    let mut wrapper = serde_json::Map::new();
    wrapper.insert(
        representation.to_string(),
        json!({"value": body.content, "representation": representation}),
    );
    Value::Object(wrapper)
}

/// Prefer the `message` of a JSON error body, fall back to the raw text.
fn error_detail(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|payload| {
        payload
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    let detail = message.unwrap_or_else(|| body.trim().to_string());
    if detail.is_empty() {
        return "no details returned".to_string();
    }
    detail.chars().take(MAX_ERROR_DETAIL_CHARS).collect()
}

fn env_value(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Deserialize, Default)]
struct ContentSearchResponse {
    #[serde(default)]
    results: Vec<ContentItem>,
    #[serde(rename = "_links", default)]
    links: Links,
}

#[derive(Debug, Deserialize, Default)]
struct ContentItem {
    id: String,
    #[serde(default)]
    version: Option<VersionInfo>,
    #[serde(rename = "_links", default)]
    links: Links,
}

#[derive(Debug, Deserialize, Default)]
struct VersionInfo {
    #[serde(default)]
    number: u64,
    #[serde(default)]
    by: Option<VersionAuthor>,
}

#[derive(Debug, Deserialize, Default)]
struct VersionAuthor {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Links {
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    webui: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SpaceResponse {
    #[serde(default)]
    id: Value,
}
