// ABOUTME: Account-management admin API client for provisioning destination identities
// ABOUTME: Looks accounts up by email across paginated listings and creates pre-verified users

use super::{emails_match, IdentityProvider, NewIdentity};
use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::{MigrateError, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

const ADMIN_USERS_PATH: &str = "/auth/v1/admin/users";
const USER_AGENT: &str = concat!("dump-migrator/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct AdminUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdminUserList {
    #[serde(default)]
    users: Vec<AdminUser>,
}

/// Identity provider backed by the destination's admin users endpoint
///
/// The service key is sent both as `apikey` and as a bearer token.
pub struct AdminIdentityProvider {
    http_client: reqwest::Client,
    base_url: String,
    service_key: String,
    page_size: usize,
}

impl AdminIdentityProvider {
    pub fn new(base_url: &str, service_key: impl Into<String>) -> Result<Self> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(MigrateError::Config(format!(
                "admin_url must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MigrateError::DestinationUnavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    fn users_url(&self) -> String {
        format!("{}{}", self.base_url, ADMIN_USERS_PATH)
    }

    /// Map an HTTP failure to the error taxonomy; auth failures are fatal
    async fn failure(response: reqwest::Response) -> MigrateError {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return MigrateError::DestinationUnauthorized(status.as_u16());
        }
        let body = response.text().await.unwrap_or_default();
        MigrateError::DestinationRejected(format!(
            "HTTP {}: {}",
            status.as_u16(),
            crate::utils::sanitize_for_display(&body)
        ))
    }

    async fn list_page(&self, page: usize) -> Result<Vec<AdminUser>> {
        let response = self
            .http_client
            .get(self.users_url())
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .query(&[("page", page), ("per_page", self.page_size)])
            .send()
            .await
            .map_err(|e| MigrateError::DestinationUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let list: AdminUserList = response
            .json()
            .await
            .map_err(|e| MigrateError::DestinationRejected(format!("bad user list: {}", e)))?;
        Ok(list.users)
    }
}

/// Request body for creating a confirmed account
fn create_payload(identity: &NewIdentity) -> Value {
    let mut payload = json!({
        "email": identity.email,
        "email_confirm": true,
    });
    if let Some(password) = &identity.password {
        payload["password"] = json!(password);
    }
    if let Some(metadata) = &identity.metadata {
        payload["user_metadata"] = metadata.clone();
    }
    payload
}

impl IdentityProvider for AdminIdentityProvider {
    async fn find_by_email(&self, email: &str) -> Result<Option<String>> {
        // The admin listing pages from 1 and ends with an empty page
        let mut page = 1;
        loop {
            let users = self.list_page(page).await?;
            if users.is_empty() {
                return Ok(None);
            }

            if let Some(user) = users
                .iter()
                .find(|user| user.email.as_deref().is_some_and(|e| emails_match(e, email)))
            {
                return Ok(Some(user.id.clone()));
            }

            // A short page is not the end; the server may cap per_page
            page += 1;
        }
    }

    async fn create(&self, identity: &NewIdentity) -> Result<String> {
        let response = self
            .http_client
            .post(self.users_url())
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&create_payload(identity))
            .send()
            .await
            .map_err(|e| MigrateError::DestinationUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let user: AdminUser = response
            .json()
            .await
            .map_err(|e| MigrateError::DestinationRejected(format!("bad user response: {}", e)))?;
        Ok(user.id)
    }
}
