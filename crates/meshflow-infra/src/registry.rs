//! Service registry file loader.
//!
//! Accepted layouts:
//!
//! - JSON list: `[ { "name": ..., "endpoint": ... }, ... ]`
//! - JSON object: `{ "services": [ ... ] }`
//! - TOML (`.toml` extension): `[[services]]` tables
//!
//! The result is an [`InMemoryDirectory`] the engine resolves service names
//! against.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use meshflow_core::directory::InMemoryDirectory;
use meshflow_types::service::ServiceDescriptor;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read registry {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse registry {}: {detail}", path.display())]
    Parse { path: PathBuf, detail: String },

    #[error("service '{0}' is registered more than once")]
    DuplicateService(String),

    #[error("service '{0}' has an empty name or endpoint")]
    IncompleteService(String),
}

/// Registry document layouts.
#[derive(Deserialize)]
#[serde(untagged)]
enum RegistryDocument {
    List(Vec<ServiceDescriptor>),
    Wrapped { services: Vec<ServiceDescriptor> },
}

impl RegistryDocument {
    fn into_services(self) -> Vec<ServiceDescriptor> {
        match self {
            RegistryDocument::List(services) | RegistryDocument::Wrapped { services } => services,
        }
    }
}

#[derive(Deserialize)]
struct TomlRegistry {
    #[serde(default)]
    services: Vec<ServiceDescriptor>,
}

/// Parse registry content. `toml` selects the TOML layout.
pub fn parse_registry(content: &str, toml: bool) -> Result<Vec<ServiceDescriptor>, String> {
    if toml {
        toml::from_str::<TomlRegistry>(content)
            .map(|r| r.services)
            .map_err(|e| e.to_string())
    } else {
        serde_json::from_str::<RegistryDocument>(content)
            .map(RegistryDocument::into_services)
            .map_err(|e| e.to_string())
    }
}

/// Check names are unique and entries are complete.
pub fn check_services(services: &[ServiceDescriptor]) -> Result<(), RegistryError> {
    let mut seen = BTreeSet::new();
    for service in services {
        if service.name.trim().is_empty() || service.endpoint.trim().is_empty() {
            return Err(RegistryError::IncompleteService(service.name.clone()));
        }
        if !seen.insert(service.name.as_str()) {
            return Err(RegistryError::DuplicateService(service.name.clone()));
        }
    }
    Ok(())
}

/// Load a registry file into an in-memory directory.
pub async fn load_registry(path: &Path) -> Result<InMemoryDirectory, RegistryError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let services = parse_registry(&content, is_toml).map_err(|detail| RegistryError::Parse {
        path: path.to_path_buf(),
        detail,
    })?;
    check_services(&services)?;

    tracing::debug!(
        path = %path.display(),
        services = services.len(),
        "loaded service registry"
    );
    Ok(services.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use meshflow_core::directory::ServiceDirectory;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn parse_json_list_and_wrapped_forms() {
        let list = r#"[{"name": "a", "endpoint": "http://a"}]"#;
        let wrapped = r#"{"services": [{"name": "a", "endpoint": "http://a", "cost": 0.5}]}"#;
        assert_eq!(parse_registry(list, false).unwrap()[0].name, "a");
        let services = parse_registry(wrapped, false).unwrap();
        assert!((services[0].cost - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_toml_services() {
        let content = r#"
[[services]]
name = "fetch"
endpoint = "http://fetch"
fallback_endpoints = ["http://fetch-b"]
retry_limit = 2

[services.output_schema.properties.id]
type = "integer"

[[services]]
name = "enrich"
endpoint = "http://enrich"
"#;
        let services = parse_registry(content, true).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].fallback_endpoints, vec!["http://fetch-b"]);
        assert_eq!(services[0].retry_limit, Some(2));
        assert!(!services[0].output_schema.is_open());
        assert!(services[1].output_schema.is_open());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_registry("{\"nope\": 1}", false).is_err());
        assert!(parse_registry("[[services]]\nname = 1", true).is_err());
    }

    #[test]
    fn check_services_rejects_duplicates_and_blanks() {
        let dup = vec![
            ServiceDescriptor::new("a", "http://a"),
            ServiceDescriptor::new("a", "http://b"),
        ];
        assert!(matches!(
            check_services(&dup),
            Err(RegistryError::DuplicateService(name)) if name == "a"
        ));

        let blank = vec![ServiceDescriptor::new("a", " ")];
        assert!(matches!(
            check_services(&blank),
            Err(RegistryError::IncompleteService(_))
        ));
    }

    #[tokio::test]
    async fn load_registry_from_json_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");
        tokio::fs::write(
            &path,
            r#"{"services": [
                {"name": "b", "endpoint": "http://b"},
                {"name": "a", "endpoint": "http://a"}
            ]}"#,
        )
        .await
        .unwrap();

        let directory = load_registry(&path).await.unwrap();
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.lookup("a").unwrap().endpoint, "http://a");
        assert_eq!(directory.list()[0].name, "a");
    }

    #[tokio::test]
    async fn load_registry_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = load_registry(&tmp.path().join("missing.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
        assert!(err.to_string().contains("missing.json"));
    }
}
