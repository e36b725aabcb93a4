//! Service directory port.
//!
//! The directory is the read-only registry the validator resolves service
//! names against. It is shared across runs and never mutated by the engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use meshflow_types::service::ServiceDescriptor;

/// Read-only lookup of service descriptors by name.
pub trait ServiceDirectory: Send + Sync {
    /// Look up a descriptor by its registry name.
    fn lookup(&self, name: &str) -> Option<Arc<ServiceDescriptor>>;

    /// Every registered descriptor, sorted by name.
    fn list(&self) -> Vec<Arc<ServiceDescriptor>>;
}

/// A directory backed by an in-memory map.
///
/// Later registrations with the same name replace earlier ones.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    services: BTreeMap<String, Arc<ServiceDescriptor>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ServiceDescriptor) {
        self.services
            .insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    pub fn with_service(mut self, descriptor: ServiceDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl FromIterator<ServiceDescriptor> for InMemoryDirectory {
    fn from_iter<I: IntoIterator<Item = ServiceDescriptor>>(iter: I) -> Self {
        let mut directory = Self::new();
        for descriptor in iter {
            directory.register(descriptor);
        }
        directory
    }
}

impl ServiceDirectory for InMemoryDirectory {
    fn lookup(&self, name: &str) -> Option<Arc<ServiceDescriptor>> {
        self.services.get(name).cloned()
    }

    fn list(&self) -> Vec<Arc<ServiceDescriptor>> {
        self.services.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_list_sorted() {
        let directory: InMemoryDirectory = [
            ServiceDescriptor::new("zeta", "http://z"),
            ServiceDescriptor::new("alpha", "http://a"),
        ]
        .into_iter()
        .collect();

        assert_eq!(directory.len(), 2);
        assert_eq!(directory.lookup("alpha").unwrap().endpoint, "http://a");
        assert!(directory.lookup("missing").is_none());

        let names: Vec<_> = directory.list().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_register_replaces_existing() {
        let directory = InMemoryDirectory::new()
            .with_service(ServiceDescriptor::new("svc", "http://old"))
            .with_service(ServiceDescriptor::new("svc", "http://new"));
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.lookup("svc").unwrap().endpoint, "http://new");
    }
}
