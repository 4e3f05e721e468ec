// src/repository/mod.rs

//! AUR RPC client
//!
//! This module provides functionality for:
//! - Searching the Arch User Repository by name, description, maintainer
//!   or dependency field
//! - Fetching full package records for a list of names
//!
//! Every request is a GET against `rpc.php` with protocol version 5.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Default AUR endpoint
pub const DEFAULT_BASE_URL: &str = "https://aur.archlinux.org/rpc.php?";

/// RPC protocol version sent with every request
const RPC_VERSION: &str = "5";

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A package as reported by the AUR
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Pkg {
    #[serde(rename = "ID")]
    pub id: i64,
    pub name: String,
    #[serde(rename = "PackageBaseID")]
    pub package_base_id: i64,
    pub package_base: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "URL", default)]
    pub url: Option<String>,
    #[serde(default)]
    pub num_votes: i64,
    #[serde(default)]
    pub popularity: f64,
    /// Unix time the package was flagged out of date
    #[serde(default)]
    pub out_of_date: Option<i64>,
    #[serde(default)]
    pub maintainer: Option<String>,
    #[serde(default)]
    pub first_submitted: i64,
    #[serde(default)]
    pub last_modified: i64,
    #[serde(rename = "URLPath", default)]
    pub url_path: Option<String>,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub make_depends: Vec<String>,
    #[serde(default)]
    pub check_depends: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub replaces: Vec<String>,
    #[serde(default)]
    pub opt_depends: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub license: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    results: Vec<Pkg>,
}

/// Field a search matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum By {
    Name,
    #[default]
    NameDesc,
    Maintainer,
    Depends,
    MakeDepends,
    OptDepends,
    CheckDepends,
    /// Let the server pick (it searches name and description)
    None,
}

impl By {
    /// Value of the `by` query parameter; `None` for [`By::None`]
    pub fn as_param(&self) -> Option<&'static str> {
        match self {
            By::Name => Some("name"),
            By::NameDesc => Some("name-desc"),
            By::Maintainer => Some("maintainer"),
            By::Depends => Some("depends"),
            By::MakeDepends => Some("makedepends"),
            By::OptDepends => Some("optdepends"),
            By::CheckDepends => Some("checkdepends"),
            By::None => None,
        }
    }
}

impl fmt::Display for By {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_param().unwrap_or("none"))
    }
}

impl FromStr for By {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok(By::Name),
            "name-desc" => Ok(By::NameDesc),
            "maintainer" => Ok(By::Maintainer),
            "depends" => Ok(By::Depends),
            "makedepends" => Ok(By::MakeDepends),
            "optdepends" => Ok(By::OptDepends),
            "checkdepends" => Ok(By::CheckDepends),
            "none" => Ok(By::None),
            other => Err(format!("unknown search field: {}", other)),
        }
    }
}

/// Client for the AUR RPC interface
pub struct Client {
    http: HttpClient,
    base_url: String,
    user_agent: String,
}

impl Client {
    /// Create a client for the public AUR
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a client for another endpoint
    ///
    /// `https://host/` and `https://host` both become `https://host/rpc.php?`.
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let http = HttpClient::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url),
            user_agent: format!("pacbind/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Override the User-Agent header sent with each request
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Search packages by `by`
    pub fn search(&self, query: &str, by: By) -> Result<Vec<Pkg>> {
        let mut params = vec![("type", "search".to_string()), ("arg", query.to_string())];
        if let Some(field) = by.as_param() {
            params.push(("by", field.to_string()));
        }
        let results = self.get(&params)?;
        info!("AUR search for '{}' returned {} packages", query, results.len());
        Ok(results)
    }

    /// Fetch full records for the named packages
    ///
    /// Names the AUR does not know are silently missing from the result.
    pub fn info<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Pkg>> {
        let mut params = vec![("type", "info".to_string())];
        params.extend(names.iter().map(|name| ("arg[]", name.as_ref().to_string())));
        let results = self.get(&params)?;
        debug!("AUR info returned {} of {} packages", results.len(), names.len());
        Ok(results)
    }

    fn get(&self, params: &[(&str, String)]) -> Result<Vec<Pkg>> {
        let mut query: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        query.push(("v", RPC_VERSION));

        debug!("GET {} {:?}", self.base_url, query);
        let response = self
            .http
            .get(&self.base_url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&query)
            .send()?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Err(Error::ServiceUnavailable);
        }

        let body: RpcResponse = response.json()?;
        match body.error {
            Some(message) if !message.is_empty() => Err(Error::Payload {
                status: status.as_u16(),
                message,
            }),
            _ => Ok(body.results),
        }
    }
}

fn normalize_base_url(base_url: &str) -> String {
    if base_url.ends_with("rpc.php?") {
        return base_url.to_string();
    }
    let mut url = base_url.to_string();
    if !url.ends_with('/') {
        url.push('/');
    }
    url.push_str("rpc.php?");
    url
}
