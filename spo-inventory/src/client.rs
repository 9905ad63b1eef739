#![doc = "REST client for SharePoint Online: implements the core Connector and Lister traits over HTTPS."]
//
//! # SharePoint Online client
//!
//! [`SharePointClient`] is the production implementation of
//! [`spo_inventory_core::contract::Connector`] and [`spo_inventory_core::contract::Lister`].
//!
//! ## Credentials
//! Read from the environment by [`SharePointClient::from_env`]:
//! - `SPO_ACCESS_TOKEN`: a ready bearer token, used for every request as is.
//! - `SPO_CLIENT_ID` + `SPO_CLIENT_SECRET`: OAuth2 client credentials, exchanged per origin
//!   (`https://<tenant>.sharepoint.com`, `https://<tenant>-my.sharepoint.com`, ...).
//! - `SPO_AUTHORITY`: token authority, defaults to `https://login.microsoftonline.com`.
//!
//! Tokens are cached per origin until shortly before they expire.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, Url};
use serde_json::{json, Value};
use spo_inventory_core::contract::{
    Connector, Lister, PlatformError, SiteConnection, SiteQuery, TenantConnection,
};
use spo_inventory_core::records::{ListItem, SiteRecord};
use std::collections::{HashMap, HashSet};
use std::env;
use std::sync::Mutex;

pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

const ODATA_JSON: &str = "application/json;odata=nometadata";

const ITEM_SELECT: &str = "UniqueId,Title,FileLeafRef,FileRef,File_x0020_Type,File_x0020_Size,\
SMTotalFileStreamSize,Created,Modified,_IsCurrentVersion,IsCheckedoutToLocal,\
Author/Title,Author/EMail,Editor/Title,Editor/EMail,CheckoutUser/Title,CheckoutUser/EMail,\
SharedWithUsers/Title,SharedWithUsers/EMail";

/// Tokens are renewed this long before the reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

const ITEM_EXPAND: &str = "Author,Editor,CheckoutUser,SharedWithUsers";

/// `IncludePersonalSite` values of the tenant site filter.
const PERSONAL_INCLUDE: u8 = 1;
const PERSONAL_EXCLUDE: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Pre-acquired bearer token.
    Static(String),
    ClientSecret {
        client_id: String,
        client_secret: String,
    },
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn from_response(body: &Value) -> Result<Self, PlatformError> {
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| PlatformError::Auth("token response has no access_token".into()))?
            .to_string();
        let expires_in = body.get("expires_in").and_then(Value::as_i64).unwrap_or(3600);
        Ok(Self {
            access_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        })
    }

    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS)
    }
}

pub struct SharePointClient {
    http: reqwest::Client,
    authority: String,
    credentials: Option<Credentials>,
    tokens: Mutex<HashMap<String, CachedToken>>,
}

impl SharePointClient {
    pub fn new(authority: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self {
            http: reqwest::Client::new(),
            authority: authority.into().trim_end_matches('/').to_string(),
            credentials,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // loads environment variables from .env if present
        let var = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());

        let credentials = match (
            var("SPO_ACCESS_TOKEN"),
            var("SPO_CLIENT_ID"),
            var("SPO_CLIENT_SECRET"),
        ) {
            (Some(token), _, _) => Some(Credentials::Static(token)),
            (None, Some(client_id), Some(client_secret)) => Some(Credentials::ClientSecret {
                client_id,
                client_secret,
            }),
            _ => None,
        };
        let authority = var("SPO_AUTHORITY").unwrap_or_else(|| DEFAULT_AUTHORITY.to_string());

        let mode = match &credentials {
            Some(Credentials::Static(_)) => "static-token",
            Some(Credentials::ClientSecret { .. }) => "client-secret",
            None => "none",
        };
        tracing::info!(authority = %authority, credentials = mode, "Initialized SharePointClient from environment");
        Self::new(authority, credentials)
    }

    fn consent_client_id(&self) -> Option<String> {
        match &self.credentials {
            Some(Credentials::ClientSecret { client_id, .. }) => Some(client_id.clone()),
            _ => env::var("SPO_CLIENT_ID").ok().filter(|v| !v.trim().is_empty()),
        }
    }

    /// `contoso` → `contoso.onmicrosoft.com`; full domains pass through.
    fn tenant_domain(tenant: &str) -> String {
        if tenant.contains('.') {
            tenant.to_string()
        } else {
            format!("{tenant}.onmicrosoft.com")
        }
    }

    async fn token_for(&self, tenant: &str, resource_url: &str) -> Result<String, PlatformError> {
        let (client_id, client_secret) = match &self.credentials {
            None => {
                return Err(PlatformError::Auth(
                    "no credentials: set SPO_ACCESS_TOKEN or SPO_CLIENT_ID and SPO_CLIENT_SECRET"
                        .to_string(),
                ))
            }
            Some(Credentials::Static(token)) => return Ok(token.clone()),
            Some(Credentials::ClientSecret {
                client_id,
                client_secret,
            }) => (client_id, client_secret),
        };

        let origin = origin_of(resource_url)?;
        let cached = self.tokens.lock().ok().and_then(|t| t.get(&origin).cloned());
        match cached {
            Some(token) if !token.is_expired() => return Ok(token.access_token),
            Some(_) => tracing::debug!(origin = %origin, "Cached access token expired"),
            None => {}
        }

        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority,
            Self::tenant_domain(tenant)
        );
        tracing::info!(origin = %origin, token_url = %token_url, "Requesting access token");
        let scope = format!("{origin}/.default");
        let request = self.http.post(&token_url).form(&[
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("scope", scope.as_str()),
        ]);
        let body = self.send_json(request, &token_url).await.map_err(|e| match e {
            PlatformError::Http { status, body, .. } => {
                PlatformError::Auth(format!("token request rejected ({status}): {body}"))
            }
            other => other,
        })?;
        let token = CachedToken::from_response(&body)?;
        let access_token = token.access_token.clone();

        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(origin, token);
        }
        Ok(access_token)
    }

    async fn send_json(&self, request: RequestBuilder, url: &str) -> Result<Value, PlatformError> {
        let response = request
            .header(ACCEPT, ODATA_JSON)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, url = %url, "Request failed");
                PlatformError::Transport(e.to_string())
            })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        if !status.is_success() {
            tracing::error!(status = %status, url = %url, "SharePoint returned error. Response body: {text}");
            return Err(PlatformError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|e| PlatformError::Decode(format!("{url}: {e}")))
    }

    async fn get_json(&self, url: &str, token: &str) -> Result<Value, PlatformError> {
        let request = self.http.get(url).bearer_auth(token);
        self.send_json(request, url).await
    }

    /// Confirms the token is accepted by the web at `site_url`.
    async fn probe_web(&self, site_url: &str, token: &str) -> Result<(), PlatformError> {
        let url = format!("{site_url}/_api/web?$select=Url");
        self.get_json(&url, token).await.map(|_| ())
    }
}

fn origin_of(url: &str) -> Result<String, PlatformError> {
    let parsed = Url::parse(url).map_err(|e| PlatformError::Decode(format!("invalid URL {url}: {e}")))?;
    Ok(parsed.origin().ascii_serialization())
}

/// OData string literal: single quotes are doubled.
fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait]
impl Connector for SharePointClient {
    async fn request_management_consent(&self, tenant: &str) -> Result<String, PlatformError> {
        let client_id = self.consent_client_id().ok_or_else(|| {
            PlatformError::Auth("SPO_CLIENT_ID is required to request management consent".into())
        })?;
        let url = format!(
            "{}/{}/adminconsent?client_id={}",
            self.authority,
            Self::tenant_domain(tenant),
            client_id
        );
        tracing::info!(consent_url = %url, "Management consent URL prepared");
        Ok(format!(
            "Grant tenant management consent by opening {url} as a tenant administrator"
        ))
    }

    async fn connect_admin(
        &self,
        tenant: &str,
        admin_url: &str,
    ) -> Result<TenantConnection, PlatformError> {
        let admin_url = admin_url.trim_end_matches('/');
        tracing::info!(tenant, admin_url, "Connecting to tenant admin endpoint");
        let token = self.token_for(tenant, admin_url).await?;
        self.probe_web(admin_url, &token).await?;
        Ok(TenantConnection {
            tenant: tenant.to_string(),
            admin_url: admin_url.to_string(),
            access_token: token,
        })
    }

    async fn connect_site(
        &self,
        tenant: &TenantConnection,
        site_url: &str,
    ) -> Result<SiteConnection, PlatformError> {
        let site_url = site_url.trim_end_matches('/');
        tracing::debug!(site_url, "Connecting to site");
        let token = self.token_for(&tenant.tenant, site_url).await?;
        self.probe_web(site_url, &token).await?;
        Ok(SiteConnection {
            site_url: site_url.to_string(),
            access_token: token,
        })
    }
}

#[async_trait]
impl Lister for SharePointClient {
    async fn list_sites(
        &self,
        tenant: &TenantConnection,
        query: &SiteQuery,
    ) -> Result<Vec<SiteRecord>, PlatformError> {
        let url = format!(
            "{}/_api/SPO.Tenant/GetSitePropertiesFromSharePointByFilters",
            tenant.admin_url
        );
        let include_personal = if query.personal {
            PERSONAL_INCLUDE
        } else {
            PERSONAL_EXCLUDE
        };

        let mut sites = Vec::new();
        let mut start_index: Option<String> = None;
        loop {
            let body = json!({
                "speFilter": {
                    "Filter": query.filter,
                    "IncludePersonalSite": include_personal,
                    "IncludeDetail": false,
                    "StartIndex": start_index,
                }
            });
            let request = self
                .http
                .post(&url)
                .bearer_auth(&tenant.access_token)
                .header(CONTENT_TYPE, ODATA_JSON)
                .json(&body);
            let page = self.send_json(request, &url).await?;

            let entries = page
                .get("value")
                .or_else(|| page.get("_Child_Items_"))
                .and_then(Value::as_array)
                .ok_or_else(|| PlatformError::Decode(format!("{url}: no site list in response")))?;
            sites.extend(
                entries
                    .iter()
                    .filter_map(|e| e.get("Url").and_then(Value::as_str))
                    .map(|u| SiteRecord::new(u, query.personal)),
            );

            let next = page
                .get("NextStartIndexFromSharePoint")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            if next.is_none() || next == start_index {
                break;
            }
            start_index = next;
        }

        tracing::info!(filter = %query.filter, personal = query.personal, count = sites.len(), "Fetched sites");
        Ok(sites)
    }

    async fn list_items(
        &self,
        site: &SiteConnection,
        library: &str,
        page_size: u32,
    ) -> Result<Vec<ListItem>, PlatformError> {
        let mut next = Some(format!(
            "{}/_api/web/lists/GetByTitle('{}')/items?$top={}&$select={}&$expand={}",
            site.site_url,
            odata_literal(library),
            page_size,
            ITEM_SELECT,
            ITEM_EXPAND
        ));

        let mut items = Vec::new();
        let mut seen = HashSet::new();
        while let Some(url) = next.take() {
            if !seen.insert(url.clone()) {
                tracing::warn!(site = %site.site_url, url = %url, "Item paging repeated a link; stopping");
                break;
            }
            let page = self.get_json(&url, &site.access_token).await?;
            let values = page
                .get("value")
                .and_then(Value::as_array)
                .ok_or_else(|| PlatformError::Decode(format!("{url}: no item list in response")))?;
            items.extend(values.iter().cloned().filter_map(ListItem::from_value));
            tracing::debug!(site = %site.site_url, fetched = items.len(), "Fetched item page");

            next = page
                .get("odata.nextLink")
                .or_else(|| page.get("@odata.nextLink"))
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        Ok(items)
    }
}
