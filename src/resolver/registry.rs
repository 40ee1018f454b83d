//! Registry families
//!
//! Each registry family knows how to find the latest published version of a
//! dependency. The resolver picks one through a scheme table; schemes with no
//! registered family fall back to a no-op that never reports an update.

use crate::specifier::Dependency;
use crate::{Error, Result, version};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_NPM_REGISTRY: &str = "https://registry.npmjs.org";
pub const DEFAULT_JSR_REGISTRY: &str = "https://jsr.io";

/// Trait for registry families
///
/// `latest` returns the candidate version token, or `None` when the registry
/// has nothing to offer. Prerelease filtering and comparison against the
/// current version happen in the resolver.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Registry family name (for logging)
    fn registry_name(&self) -> &str;

    /// Find the latest candidate version for a dependency
    async fn latest(&self, dependency: &Dependency) -> Result<Option<String>>;
}

/// Base URLs of the metadata registries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryEndpoints {
    pub npm: String,
    pub jsr: String,
}

impl Default for RegistryEndpoints {
    fn default() -> Self {
        Self {
            npm: DEFAULT_NPM_REGISTRY.to_string(),
            jsr: DEFAULT_JSR_REGISTRY.to_string(),
        }
    }
}

/// npm-style registry: `{"dist-tags": {"latest": "..."}}`
pub struct NpmRegistry {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct NpmPackument {
    #[serde(rename = "dist-tags")]
    dist_tags: NpmDistTags,
}

#[derive(Deserialize)]
struct NpmDistTags {
    latest: String,
}

impl NpmRegistry {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn package_url(&self, name: &str) -> String {
        // Scoped packages keep the `@` but escape the separator
        let encoded = if name.starts_with('@') {
            name.replacen('/', "%2f", 1)
        } else {
            name.to_string()
        };
        format!("{}/{}", self.base_url.trim_end_matches('/'), encoded)
    }
}

#[async_trait]
impl Registry for NpmRegistry {
    fn registry_name(&self) -> &str {
        "npm"
    }

    async fn latest(&self, dependency: &Dependency) -> Result<Option<String>> {
        let url = self.package_url(&dependency.name);
        let packument: NpmPackument = fetch_json(&self.client, &url, &dependency.name).await?;
        Ok(Some(packument.dist_tags.latest))
    }
}

/// JSR-style registry: `{"versions": {"1.0.0": {"yanked": false}}}`
pub struct JsrRegistry {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct JsrMeta {
    versions: HashMap<String, JsrVersionInfo>,
}

#[derive(Deserialize)]
struct JsrVersionInfo {
    #[serde(default)]
    yanked: bool,
}

impl JsrRegistry {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Registry for JsrRegistry {
    fn registry_name(&self) -> &str {
        "jsr"
    }

    async fn latest(&self, dependency: &Dependency) -> Result<Option<String>> {
        let url = format!(
            "{}/{}/meta.json",
            self.base_url.trim_end_matches('/'),
            dependency.name
        );
        let meta: JsrMeta = fetch_json(&self.client, &url, &dependency.name).await?;

        let latest = meta
            .versions
            .into_iter()
            .filter(|(_, info)| !info.yanked)
            .filter_map(|(token, _)| version::parse(&token).map(|v| (v, token)))
            .filter(|(v, _)| v.pre.is_empty())
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, token)| token);

        Ok(latest)
    }
}

/// Registry discovered through redirects of an unversioned URL
///
/// Hosts such as `deno.land` redirect `https://deno.land/x/foo` to the
/// latest `https://deno.land/x/foo@v1.2.3`.
pub struct RedirectRegistry {
    client: reqwest::Client,
}

impl RedirectRegistry {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Registry for RedirectRegistry {
    fn registry_name(&self) -> &str {
        "redirect"
    }

    async fn latest(&self, dependency: &Dependency) -> Result<Option<String>> {
        let base = dependency.base().to_uri();
        let response = self.client.head(&base).send().await?;

        if !response.status().is_success() {
            tracing::debug!("HEAD {} returned {}", base, response.status());
            return Ok(None);
        }

        let requested = url::Url::parse(&base)
            .map_err(|e| Error::InvalidSpecifier(format!("{}: {}", base, e)))?;
        if response.url() == &requested {
            tracing::debug!("{} did not redirect", base);
            return Ok(None);
        }

        let redirected = Dependency::parse(response.url().as_str())?;
        if redirected.name != dependency.name {
            tracing::debug!("{} redirected to another package: {}", base, redirected.name);
            return Ok(None);
        }
        Ok(redirected.version)
    }
}

/// Registry for schemes nobody publishes to (`file:`, `data:`, ...)
pub struct NoopRegistry;

#[async_trait]
impl Registry for NoopRegistry {
    fn registry_name(&self) -> &str {
        "noop"
    }

    async fn latest(&self, _dependency: &Dependency) -> Result<Option<String>> {
        Ok(None)
    }
}

async fn fetch_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    name: &str,
) -> Result<T> {
    tracing::debug!("GET {}", url);
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(Error::NotFound(name.to_string()));
    }
    if !status.is_success() {
        return Err(Error::Resolution {
            name: name.to_string(),
            message: format!("GET {} returned {}", url, status),
        });
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| Error::MalformedRegistryResponse {
        name: name.to_string(),
        message: e.to_string(),
    })
}

/// Scheme to registry table
pub struct RegistryTable {
    registries: HashMap<String, Arc<dyn Registry>>,
    fallback: Arc<dyn Registry>,
}

impl Default for RegistryTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryTable {
    /// Create a table where every scheme resolves to the no-op registry
    pub fn new() -> Self {
        Self {
            registries: HashMap::new(),
            fallback: Arc::new(NoopRegistry),
        }
    }

    /// Register a registry for a scheme
    pub fn register(&mut self, scheme: &str, registry: Arc<dyn Registry>) {
        self.registries.insert(scheme.to_ascii_lowercase(), registry);
    }

    /// Find the registry for a scheme
    pub fn find(&self, scheme: &str) -> &dyn Registry {
        self.registries
            .get(scheme)
            .unwrap_or(&self.fallback)
            .as_ref()
    }
}

/// Create a table with the built-in registry families
pub fn default_table(endpoints: &RegistryEndpoints) -> Result<RegistryTable> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("molt/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let mut table = RegistryTable::new();
    table.register("npm", Arc::new(NpmRegistry::new(client.clone(), &endpoints.npm)));
    table.register("jsr", Arc::new(JsrRegistry::new(client.clone(), &endpoints.jsr)));
    let redirect: Arc<dyn Registry> = Arc::new(RedirectRegistry::new(client));
    table.register("http", redirect.clone());
    table.register("https", redirect);
    Ok(table)
}
