//! Minimal Google Drive v3 client (service-account auth, folders, uploads).

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};

pub const DRIVE_API_URL: &str = "https://www.googleapis.com";
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
pub const TEXT_MIME_TYPE: &str = "text/plain";

const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;
const LIST_PAGE_SIZE: &str = "1000";

/// Storage operations the exporter needs.
#[async_trait]
pub trait CloudStorage: Send + Sync {
    /// Id of the folder `name` under `parent_id`, emptied if it already
    /// existed, created otherwise.
    async fn get_or_create_folder(&self, name: &str, parent_id: &str) -> Result<String>;

    /// Delete every direct child of `folder_id`; returns how many were deleted.
    async fn delete_all_children(&self, folder_id: &str) -> Result<usize>;

    /// Create a new text file; returns its id.
    async fn upload_text_file(&self, name: &str, content: &str, parent_id: &str) -> Result<String>;

    /// Create a new text file from a local file; returns its id.
    async fn upload_file_from_path(&self, path: &Path, name: &str, parent_id: &str)
        -> Result<String>;
}

/// Fields of a service-account JSON key that matter for token exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::AuthError(format!("cannot read credentials {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Signed RS256 assertion for the JWT bearer grant.
    fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            iss: &self.client_email,
            scope: DRIVE_SCOPE,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + TOKEN_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())?;
        Ok(jsonwebtoken::encode(&header, &claims, &key)?)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    parents: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Authenticated Drive connection.
pub struct DriveClient {
    http: Client,
    base_url: String,
    key: Option<ServiceAccountKey>,
    token: Mutex<AccessToken>,
}

impl DriveClient {
    /// Authenticate with the service-account key named in the config.
    pub async fn authenticate(config: &Config) -> Result<Self> {
        info!("Authenticating with Google Drive...");
        let key = ServiceAccountKey::from_file(&config.google_credentials_path)?;
        let base_url =
            std::env::var("DRIVE_API_URL").unwrap_or_else(|_| DRIVE_API_URL.to_string());
        let client = Self::with_service_account(key, base_url).await?;
        info!("Google Drive authentication completed");
        Ok(client)
    }

    /// Exchange a service-account key for a token against `base_url`.
    pub async fn with_service_account<S: Into<String>>(
        key: ServiceAccountKey,
        base_url: S,
    ) -> Result<Self> {
        let http = build_http()?;
        let token = fetch_token(&http, &key).await?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            key: Some(key),
            token: Mutex::new(token),
        })
    }

    /// Use a pre-issued bearer token (primarily for tests).
    pub fn with_token<S1: Into<String>, S2: Into<String>>(token: S1, base_url: S2) -> Result<Self> {
        Ok(Self {
            http: build_http()?,
            base_url: base_url.into(),
            key: None,
            token: Mutex::new(AccessToken {
                value: token.into(),
                expires_at: DateTime::<Utc>::MAX_UTC,
            }),
        })
    }

    async fn bearer(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(key) = &self.key {
            if !token.is_fresh(Utc::now()) {
                debug!("Refreshing Google access token");
                *token = fetch_token(&self.http, key).await?;
            }
        }
        Ok(token.value.clone())
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.base_url)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/drive/v3/files", self.base_url)
    }

    /// All files matching `query`, following pagination.
    pub async fn list_files(&self, query: &str) -> Result<Vec<DriveFile>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.to_string()),
                ("spaces", "drive".to_string()),
                ("fields", "nextPageToken, files(id, name)".to_string()),
                ("pageSize", LIST_PAGE_SIZE.to_string()),
            ];
            if let Some(token) = page_token.take() {
                params.push(("pageToken", token));
            }

            let response = self
                .http
                .get(self.files_url())
                .bearer_auth(self.bearer().await?)
                .query(&params)
                .send()
                .await?;
            let page: FileList = check(response, "list files").await?.json().await?;

            files.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(files)
    }

    /// Create a folder and return its id.
    pub async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        info!(folder = name, "Creating Google Drive folder");
        let metadata = FileMetadata {
            name,
            mime_type: Some(FOLDER_MIME_TYPE),
            parents: [parent_id],
        };
        let response = self
            .http
            .post(self.files_url())
            .bearer_auth(self.bearer().await?)
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await?;
        let created: CreatedFile = check(response, "create folder").await?.json().await?;
        info!(folder = name, id = %created.id, "Folder created");
        Ok(created.id)
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/{}", self.files_url(), file_id))
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;
        check(response, "delete file").await?;
        Ok(())
    }

    /// Multipart upload of `content` as a new file.
    pub async fn upload_bytes(
        &self,
        name: &str,
        content: &[u8],
        mime_type: Option<&str>,
        parent_id: &str,
    ) -> Result<String> {
        let metadata = FileMetadata {
            name,
            mime_type,
            parents: [parent_id],
        };
        let boundary = format!("tg_drive_backup_{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related(&boundary, &serde_json::to_vec(&metadata)?, content);

        let response = self
            .http
            .post(self.upload_url())
            .bearer_auth(self.bearer().await?)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;
        let created: CreatedFile = check(response, "upload file").await?.json().await?;
        Ok(created.id)
    }
}

#[async_trait]
impl CloudStorage for DriveClient {
    async fn get_or_create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        info!(folder = name, "Checking whether the folder already exists");
        let existing = self.list_files(&folder_query(name, parent_id)).await?;

        match existing.into_iter().next() {
            Some(folder) => {
                info!(folder = name, id = %folder.id, "Folder exists, clearing it");
                self.delete_all_children(&folder.id).await?;
                Ok(folder.id)
            }
            None => self.create_folder(name, parent_id).await,
        }
    }

    async fn delete_all_children(&self, folder_id: &str) -> Result<usize> {
        let children = self.list_files(&children_query(folder_id)).await?;
        for child in &children {
            debug!(id = %child.id, name = ?child.name, "Deleting file");
            self.delete_file(&child.id).await?;
        }
        Ok(children.len())
    }

    async fn upload_text_file(&self, name: &str, content: &str, parent_id: &str) -> Result<String> {
        self.upload_bytes(name, content.as_bytes(), Some(TEXT_MIME_TYPE), parent_id)
            .await
    }

    async fn upload_file_from_path(
        &self,
        path: &Path,
        name: &str,
        parent_id: &str,
    ) -> Result<String> {
        let content = tokio::fs::read(path).await?;
        self.upload_bytes(name, &content, None, parent_id).await
    }
}

fn build_http() -> Result<Client> {
    Client::builder()
        .user_agent(format!("tg_drive_backup/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::HttpError(format!("Failed to build HTTP client: {}", e)))
}

async fn fetch_token(http: &Client, key: &ServiceAccountKey) -> Result<AccessToken> {
    let now = Utc::now();
    let assertion = key.assertion(now)?;

    let response = http
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await
        .map_err(|e| Error::AuthError(format!("token request failed: {}", e)))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| Error::AuthError(format!("cannot read token response: {}", e)))?;
    if !status.is_success() {
        return Err(Error::AuthError(format!(
            "token endpoint returned HTTP {}: {}",
            status.as_u16(),
            text
        )));
    }

    let token: TokenResponse = serde_json::from_str(&text)
        .map_err(|e| Error::AuthError(format!("invalid token response: {}", e)))?;

    Ok(AccessToken {
        value: token.access_token,
        expires_at: now + Duration::seconds(token.expires_in.unwrap_or(TOKEN_LIFETIME_SECS)),
    })
}

async fn check(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::DriveError(format!(
        "{} failed with HTTP {}: {}",
        action,
        status.as_u16(),
        body
    )))
}

/// Escape a literal for the Drive query language.
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Query for a non-trashed folder called `name` directly under `parent_id`.
pub fn folder_query(name: &str, parent_id: &str) -> String {
    format!(
        "name = '{}' and '{}' in parents and mimeType = '{}' and trashed = false",
        escape_query_value(name),
        escape_query_value(parent_id),
        FOLDER_MIME_TYPE
    )
}

/// Query for every non-trashed direct child of `folder_id`.
pub fn children_query(folder_id: &str) -> String {
    format!(
        "'{}' in parents and trashed = false",
        escape_query_value(folder_id)
    )
}

fn multipart_related(boundary: &str, metadata: &[u8], content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", TEXT_MIME_TYPE).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}
