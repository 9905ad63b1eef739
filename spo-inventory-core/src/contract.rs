//! # contract: interfaces to the SharePoint Online tenant
//!
//! The inventory pipeline talks to the platform through two traits:
//!
//! - [`Connector`] establishes the tenant admin connection and per-site connections.
//! - [`Lister`] enumerates sites and document library items.
//!
//! Connections are plain values ([`TenantConnection`], [`SiteConnection`]) carrying the
//! endpoint and bearer token, so an implementation is free to cache or refresh tokens
//! internally. All failures are reported as [`PlatformError`].
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall`; with the default `test-export-mocks` feature
//! the generated `MockConnector` and `MockLister` are available to integration tests.

use async_trait::async_trait;
#[allow(unused_imports)]
use mockall::{automock, predicate::*};

use crate::records::{ListItem, SiteRecord};

/// Authenticated handle on the tenant admin endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantConnection {
    pub tenant: String,
    pub admin_url: String,
    pub access_token: String,
}

/// Authenticated handle on a single site, derived from the tenant credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConnection {
    pub site_url: String,
    pub access_token: String,
}

/// Server-side site selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteQuery {
    /// Filter expression evaluated by the tenant, e.g. `Url -like '/sites/'`.
    pub filter: String,
    /// Restrict the listing to OneDrive personal sites.
    pub personal: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Establishes tenant and site connections.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// One-time tenant management consent. Returns an operator-facing message
    /// (e.g. the consent URL to open).
    async fn request_management_consent(&self, tenant: &str) -> Result<String, PlatformError>;

    /// Connect to the tenant admin endpoint.
    async fn connect_admin(
        &self,
        tenant: &str,
        admin_url: &str,
    ) -> Result<TenantConnection, PlatformError>;

    /// Connect to one site using the tenant credential.
    async fn connect_site(
        &self,
        tenant: &TenantConnection,
        site_url: &str,
    ) -> Result<SiteConnection, PlatformError>;
}

/// Enumerates sites and library items.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Lister: Send + Sync {
    /// List sites matching the query. Returned records carry `personal == query.personal`.
    async fn list_sites(
        &self,
        tenant: &TenantConnection,
        query: &SiteQuery,
    ) -> Result<Vec<SiteRecord>, PlatformError>;

    /// List every item of the named library, fetching `page_size` items per request.
    async fn list_items(
        &self,
        site: &SiteConnection,
        library: &str,
        page_size: u32,
    ) -> Result<Vec<ListItem>, PlatformError>;
}
