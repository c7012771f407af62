// ABOUTME: HTTP client for the source system's export endpoint
// ABOUTME: Sends the shared secret header and maps transport/auth failures to structured errors

use super::{Manifest, Source};
use crate::config::SourceConfig;
use crate::dump::{IdentityRecord, Record};
use crate::error::{MigrateError, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Header carrying the shared secret expected by the export endpoint
pub const SECRET_HEADER: &str = "x-migration-secret";

const USER_AGENT: &str = concat!("dump-migrator/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct IdentityPage {
    #[serde(default, alias = "users")]
    identities: Vec<IdentityRecord>,
}

#[derive(Debug, Deserialize)]
struct RowPage {
    #[serde(default, alias = "data")]
    rows: Vec<Record>,
}

/// Source backed by the old system's export API
///
/// Requests are `GET <url>?action=<summary|identities|export>&page=&limit=`.
/// No request timeout is set; cancellation belongs to the caller.
pub struct HttpSource {
    http_client: reqwest::Client,
    url: String,
    secret: String,
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource")
            .field("url", &self.url)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl HttpSource {
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(MigrateError::Config(format!(
                "source url must start with http:// or https://, got '{}'",
                url
            )));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MigrateError::SourceTransport(e.to_string()))?;

        Ok(Self {
            http_client,
            url,
            secret: secret.into(),
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Self::new(config.url.clone(), config.secret()?)
    }

    async fn get<T: DeserializeOwned>(&self, params: &[(&str, String)]) -> Result<T> {
        tracing::debug!("Requesting source {:?}", params);

        let response = self
            .http_client
            .get(&self.url)
            .header(SECRET_HEADER, &self.secret)
            .query(params)
            .send()
            .await
            .map_err(|e| MigrateError::SourceTransport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(MigrateError::SourceUnauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MigrateError::SourceStatus {
                status: status.as_u16(),
                body: crate::utils::sanitize_for_display(&body),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| MigrateError::SourceDecode(e.to_string()))
    }
}

impl Source for HttpSource {
    async fn summary(&self) -> Result<Manifest> {
        let manifest: Manifest = self.get(&[("action", "summary".to_string())]).await?;
        tracing::info!(
            "Source reports {} table(s){}",
            manifest.tables.len(),
            manifest
                .identity_count
                .map(|n| format!(" and {} identities", n))
                .unwrap_or_default()
        );
        Ok(manifest)
    }

    async fn identities_page(&self, page: usize, limit: usize) -> Result<Vec<IdentityRecord>> {
        let body: IdentityPage = self
            .get(&[
                ("action", "identities".to_string()),
                ("page", page.to_string()),
                ("limit", limit.to_string()),
            ])
            .await?;
        Ok(body.identities)
    }

    async fn export_page(&self, table: &str, page: usize, limit: usize) -> Result<Vec<Record>> {
        let body: RowPage = self
            .get(&[
                ("action", "export".to_string()),
                ("table", table.to_string()),
                ("page", page.to_string()),
                ("limit", limit.to_string()),
            ])
            .await?;
        Ok(body.rows)
    }
}
