//! Static registry of named backend services.

use crate::config::{ConfigError, ServiceSettings};
use reqwest::Url;
use serde::Serialize;
use std::collections::HashMap;

/// A named backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceEntry {
    name: String,
    base_url: String,
}

impl ServiceEntry {
    /// Create an entry, validating the name and base URL
    pub fn new(name: impl Into<String>, base_url: impl AsRef<str>) -> Result<Self, ConfigError> {
        let name = name.into();
        validate_name(&name)?;
        let base_url = normalize_base_url(&name, base_url.as_ref())?;
        Ok(Self { name, base_url })
    }

    /// Service name, also the path segment under `/api/`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Prefix routed to this service
    pub fn route_prefix(&self) -> String {
        format!("/api/{}", self.name)
    }
}

/// Ordered, immutable name → entry mapping.
///
/// Built once at startup and shared read-only by the proxy, the health
/// aggregator and the front door.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    entries: Vec<ServiceEntry>,
    index: HashMap<String, usize>,
}

impl ServiceRegistry {
    /// Build the registry from configured services, letting `{NAME}_URL`
    /// environment variables override each service's URL.
    ///
    /// A service without an override keeps its configured URL. Fails only on
    /// an empty service list or an invalid entry.
    pub fn load(
        services: &[ServiceSettings],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let entries = services
            .iter()
            .map(|service| {
                let url = env(&env_var_for(&service.name)).unwrap_or_else(|| service.url.clone());
                ServiceEntry::new(service.name.clone(), url)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_entries(entries)
    }

    /// Build the registry from already validated entries
    pub fn from_entries(entries: Vec<ServiceEntry>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::NoServices);
        }

        let mut index = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if index.insert(entry.name.clone(), position).is_some() {
                return Err(ConfigError::DuplicateService(entry.name.clone()));
            }
        }

        Ok(Self { entries, index })
    }

    /// Entries in configuration order
    pub fn entries(&self) -> &[ServiceEntry] {
        &self.entries
    }

    /// Service names in configuration order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(ServiceEntry::name).collect()
    }

    pub fn lookup(&self, name: &str) -> Option<&ServiceEntry> {
        self.index.get(name).map(|&position| &self.entries[position])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Environment variable overriding a service's URL: `work-history` → `WORK_HISTORY_URL`
pub fn env_var_for(name: &str) -> String {
    format!("{}_URL", name.to_ascii_uppercase().replace('-', "_"))
}

fn validate_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidService {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid("name must be a single URL path segment"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name must not be a relative path segment"));
    }
    Ok(())
}

fn normalize_base_url(name: &str, raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidService {
        name: name.to_string(),
        reason,
    };

    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|e| invalid(format!("invalid URL {trimmed:?}: {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("URL has no host".to_string()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("URL must not carry a query or fragment".to_string()));
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_services;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_apply_without_env() {
        let registry = ServiceRegistry::load(&default_services(), no_env).unwrap();

        assert_eq!(registry.len(), 5);
        assert_eq!(
            registry.names(),
            vec!["serena", "context7", "playwright", "work-history", "sequential-thinking"]
        );
        assert_eq!(
            registry.lookup("work-history").unwrap().base_url(),
            "http://work-history:8083"
        );
    }

    #[test]
    fn test_env_overrides_single_service() {
        let env: HashMap<&str, &str> = [("CONTEXT7_URL", "http://localhost:18081/")].into();
        let registry =
            ServiceRegistry::load(&default_services(), |k| env.get(k).map(|v| v.to_string()))
                .unwrap();

        assert_eq!(registry.lookup("context7").unwrap().base_url(), "http://localhost:18081");
        // Others fall back to their defaults
        assert_eq!(registry.lookup("serena").unwrap().base_url(), "http://serena:8080");
    }

    #[test]
    fn test_env_var_names() {
        assert_eq!(env_var_for("serena"), "SERENA_URL");
        assert_eq!(env_var_for("context7"), "CONTEXT7_URL");
        assert_eq!(env_var_for("work-history"), "WORK_HISTORY_URL");
        assert_eq!(env_var_for("sequential-thinking"), "SEQUENTIAL_THINKING_URL");
    }

    #[test]
    fn test_empty_service_list_is_a_fault() {
        assert!(matches!(
            ServiceRegistry::load(&[], no_env),
            Err(ConfigError::NoServices)
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let services = vec![
            ServiceSettings { name: "a".into(), url: "http://a:1".into() },
            ServiceSettings { name: "a".into(), url: "http://a:2".into() },
        ];
        assert!(matches!(
            ServiceRegistry::load(&services, no_env),
            Err(ConfigError::DuplicateService(name)) if name == "a"
        ));
    }

    #[test]
    fn test_invalid_names_rejected() {
        for name in ["", "a/b", "with space", "..", "ü"] {
            assert!(ServiceEntry::new(name, "http://x:1").is_err(), "{name:?} accepted");
        }
        assert!(ServiceEntry::new("ok_name-1.v2", "http://x:1").is_ok());
    }

    #[test]
    fn test_invalid_urls_rejected() {
        for url in ["serena:8080", "ftp://serena:21", "http://", "not a url", "http://x:1/?q=1"] {
            assert!(ServiceEntry::new("svc", url).is_err(), "{url:?} accepted");
        }
    }

    #[test]
    fn test_bad_env_override_is_a_fault() {
        let result = ServiceRegistry::load(&default_services(), |k| {
            (k == "SERENA_URL").then(|| "serena".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidService { name, .. }) if name == "serena"));
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = ServiceRegistry::load(&default_services(), no_env).unwrap();
        assert!(registry.lookup("unknown").is_none());
        assert_eq!(registry.lookup("serena").unwrap().route_prefix(), "/api/serena");
    }
}
