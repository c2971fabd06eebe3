// ============================================================================
// Route Table
// ============================================================================
//
// Longest-prefix dispatch of request paths to backend services.
//
// A path matches a prefix when it equals the prefix or continues it with a
// '/' segment boundary ("/events" matches "/events/3" but not "/eventsfoo").
// Entries are sorted once, longest first, so resolution does not depend on
// the order in which services were declared.
//
// The auth requirement of a request is, in order:
//   1. the override for the exact request path
//   2. the override for the matched prefix
//   3. the owning service's default
//
// ============================================================================

use reqwest::Url;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

use crate::config::GatewayConfig;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RouteConfigError {
    #[error("service '{0}' declares an empty path prefix")]
    EmptyPrefix(String),

    #[error("prefix '{0}' must start with '/'")]
    MissingLeadingSlash(String),

    #[error("prefix '{0}' must not end with '/'")]
    TrailingSlash(String),

    #[error("prefix '{0}' is declared more than once")]
    DuplicatePrefix(String),

    #[error("service '{service}' has an invalid base URL '{url}'")]
    InvalidBackend { service: String, url: String },
}

/// One dispatchable prefix
#[derive(Debug, Clone)]
pub struct RouteTarget {
    /// Name of the owning service (for logs)
    pub service: String,
    pub prefix: String,
    /// Base URL without trailing slash
    pub backend: Url,
    /// Service default, before overrides
    pub requires_auth: bool,
}

impl RouteTarget {
    fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Base URL of the backend as a string without trailing slash
    pub fn base_url(&self) -> &str {
        self.backend.as_str().trim_end_matches('/')
    }
}

/// Outcome of resolving a request path
#[derive(Debug, Clone, Copy)]
pub struct RouteMatch<'a> {
    pub target: &'a RouteTarget,
    pub requires_auth: bool,
}

/// Immutable dispatch table built once at startup
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<RouteTarget>,
    overrides: HashMap<String, bool>,
}

impl RouteTable {
    pub fn new(
        mut entries: Vec<RouteTarget>,
        overrides: HashMap<String, bool>,
    ) -> Result<Self, RouteConfigError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            validate_prefix(&entry.service, &entry.prefix)?;
            if !seen.insert(entry.prefix.clone()) {
                return Err(RouteConfigError::DuplicatePrefix(entry.prefix.clone()));
            }
        }

        entries.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });

        Ok(Self { entries, overrides })
    }

    /// Build the table from the gateway's service configuration
    pub fn from_config(config: &GatewayConfig) -> Result<Self, RouteConfigError> {
        Self::from_services(&config.services, &config.auth_overrides)
    }

    pub fn from_services(
        services: &BTreeMap<String, crate::config::ServiceConfig>,
        overrides: &BTreeMap<String, bool>,
    ) -> Result<Self, RouteConfigError> {
        let mut entries = Vec::new();

        for (name, service) in services {
            let backend = Url::parse(service.url.trim_end_matches('/'))
                .ok()
                .filter(|url| url.host_str().is_some())
                .ok_or_else(|| RouteConfigError::InvalidBackend {
                    service: name.clone(),
                    url: service.url.clone(),
                })?;

            for prefix in &service.paths {
                entries.push(RouteTarget {
                    service: name.clone(),
                    prefix: prefix.clone(),
                    backend: backend.clone(),
                    requires_auth: service.requires_auth,
                });
            }
        }

        let overrides = overrides
            .iter()
            .map(|(path, required)| (path.clone(), *required))
            .collect();

        Self::new(entries, overrides)
    }

    /// Longest matching prefix for `path`
    pub fn resolve(&self, path: &str) -> Option<&RouteTarget> {
        self.entries.iter().find(|entry| entry.matches(path))
    }

    /// Whether a request for `path` dispatched to `target` needs a session
    pub fn requires_auth(&self, path: &str, target: &RouteTarget) -> bool {
        self.overrides
            .get(path)
            .or_else(|| self.overrides.get(&target.prefix))
            .copied()
            .unwrap_or(target.requires_auth)
    }

    /// Resolve target and auth requirement in one step
    pub fn route(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.resolve(path).map(|target| RouteMatch {
            target,
            requires_auth: self.requires_auth(path, target),
        })
    }

    pub fn entries(&self) -> &[RouteTarget] {
        &self.entries
    }
}

fn validate_prefix(service: &str, prefix: &str) -> Result<(), RouteConfigError> {
    if prefix.is_empty() {
        return Err(RouteConfigError::EmptyPrefix(service.to_string()));
    }
    if !prefix.starts_with('/') {
        return Err(RouteConfigError::MissingLeadingSlash(prefix.to_string()));
    }
    if prefix.len() > 1 && prefix.ends_with('/') {
        return Err(RouteConfigError::TrailingSlash(prefix.to_string()));
    }
    Ok(())
}

/// Resolve `.` and `..` segments (plain or `%2e`-encoded) in a request path.
///
/// Routing and forwarding both use the result, so the backend never sees a
/// path other than the one the route table matched. Returns `None` for paths
/// that climb above the root or carry encoded or backslash separators.
pub fn normalize_path(path: &str) -> Option<String> {
    if !path.starts_with('/') {
        return None;
    }
    let lowered = path.to_ascii_lowercase();
    if path.contains('\\') || lowered.contains("%2f") || lowered.contains("%5c") {
        return None;
    }

    let segments: Vec<&str> = path[1..].split('/').collect();
    let last = segments.len() - 1;
    let mut output: Vec<&str> = Vec::with_capacity(segments.len());

    for (i, segment) in segments.into_iter().enumerate() {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        match decoded.as_str() {
            "." => {}
            ".." => {
                output.pop()?;
            }
            _ => {
                output.push(segment);
                continue;
            }
        }
        // A trailing dot segment leaves a trailing slash
        if i == last {
            output.push("");
        }
    }

    Some(format!("/{}", output.join("/")))
}
