//! Service registry.
//!
//! Services are long-lived collaborators of a build (loaded maps, parsed
//! component libraries, the lint run). Each declares the services it needs;
//! the registry initializes them in dependency order and disposes them in
//! reverse. Ordering problems are reported before any service initializes.

use async_trait::async_trait;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::graph::{topological_order, GraphError};

// ═══════════════════════════════════════════════════════════════════════════════
// RESOURCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Values published by services, keyed by type.
#[derive(Clone, Default)]
pub struct Resources {
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.clone().downcast::<T>().ok())
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("len", &self.values.len())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE CONTRACT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub version: String,
    pub dependencies: Vec<String>,
}

impl ServiceDescriptor {
    pub fn new(name: &str, dependencies: &[&str]) -> Self {
        ServiceDescriptor {
            name: name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Failed(String),
    #[error("missing resource: {0}")]
    MissingResource(&'static str),
}

#[async_trait]
pub trait Service: Send + Sync {
    fn descriptor(&self) -> &ServiceDescriptor;

    /// Runs after every dependency has initialized.
    async fn initialize(&mut self, resources: &mut Resources) -> Result<(), ServiceError>;

    async fn execute(&mut self, _resources: &mut Resources) -> Result<Value, ServiceError> {
        Ok(Value::Null)
    }

    async fn dispose(&mut self) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Fetch a resource a dependency was expected to publish.
pub fn require<T: Any + Send + Sync>(resources: &Resources) -> Result<Arc<T>, ServiceError> {
    resources
        .get::<T>()
        .ok_or(ServiceError::MissingResource(std::any::type_name::<T>()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("service `{0}` is already registered")]
    Duplicate(String),
    #[error("service `{0}` is not registered")]
    NotFound(String),
    #[error(transparent)]
    Dependency(#[from] GraphError),
    #[error("service `{name}` failed to {phase}: {source}")]
    Service {
        name: String,
        phase: &'static str,
        #[source]
        source: ServiceError,
    },
}

#[derive(Default)]
pub struct ServiceRegistry {
    services: Vec<Box<dyn Service>>,
    /// Names in initialization order
    initialized: Vec<String>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: Box<dyn Service>) -> Result<(), RegistryError> {
        let name = &service.descriptor().name;
        if self.services.iter().any(|s| &s.descriptor().name == name) {
            return Err(RegistryError::Duplicate(name.clone()));
        }
        self.services.push(service);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Initialization order; fails on unknown dependencies or cycles.
    pub fn resolve_order(&self) -> Result<Vec<String>, RegistryError> {
        let nodes: Vec<(String, Vec<String>)> = self
            .services
            .iter()
            .map(|s| {
                let d = s.descriptor();
                (d.name.clone(), d.dependencies.clone())
            })
            .collect();
        Ok(topological_order(&nodes)?)
    }

    fn position(&self, name: &str) -> Result<usize, RegistryError> {
        self.services
            .iter()
            .position(|s| s.descriptor().name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub async fn initialize_all(
        &mut self,
        resources: &mut Resources,
    ) -> Result<Vec<String>, RegistryError> {
        let order = self.resolve_order()?;

        for name in &order {
            let index = self.position(name)?;
            log::debug!("initializing service `{}`", name);
            self.services[index]
                .initialize(resources)
                .await
                .map_err(|source| RegistryError::Service {
                    name: name.clone(),
                    phase: "initialize",
                    source,
                })?;
            self.initialized.push(name.clone());
        }

        Ok(order)
    }

    pub async fn execute(
        &mut self,
        name: &str,
        resources: &mut Resources,
    ) -> Result<Value, RegistryError> {
        let index = self.position(name)?;
        self.services[index]
            .execute(resources)
            .await
            .map_err(|source| RegistryError::Service {
                name: name.to_string(),
                phase: "execute",
                source,
            })
    }

    /// Dispose initialized services in reverse order. Every service gets
    /// its turn; the first failure is returned.
    pub async fn dispose_all(&mut self) -> Result<(), RegistryError> {
        let mut first_error = None;

        while let Some(name) = self.initialized.pop() {
            let index = self.position(&name)?;
            if let Err(source) = self.services[index].dispose().await {
                log::warn!("service `{}` failed to dispose: {}", name, source);
                first_error.get_or_insert(RegistryError::Service {
                    name,
                    phase: "dispose",
                    source,
                });
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        descriptor: ServiceDescriptor,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Recording {
        fn boxed(name: &str, deps: &[&str], log: &Arc<Mutex<Vec<String>>>) -> Box<dyn Service> {
            Box::new(Recording {
                descriptor: ServiceDescriptor::new(name, deps),
                log: Arc::clone(log),
            })
        }
    }

    #[async_trait]
    impl Service for Recording {
        fn descriptor(&self) -> &ServiceDescriptor {
            &self.descriptor
        }

        async fn initialize(&mut self, resources: &mut Resources) -> Result<(), ServiceError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("init {}", self.descriptor.name));
            resources.insert(self.descriptor.name.clone());
            Ok(())
        }

        async fn dispose(&mut self) -> Result<(), ServiceError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("dispose {}", self.descriptor.name));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_initializes_in_dependency_order_and_disposes_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ServiceRegistry::new();
        registry.register(Recording::boxed("lint", &["classes", "props"], &log)).unwrap();
        registry.register(Recording::boxed("classes", &[], &log)).unwrap();
        registry.register(Recording::boxed("props", &[], &log)).unwrap();

        let mut resources = Resources::new();
        let order = registry.initialize_all(&mut resources).await.unwrap();
        assert_eq!(order, vec!["classes", "props", "lint"]);
        assert_eq!(*resources.get::<String>().unwrap(), "lint");

        registry.dispose_all().await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "init classes",
                "init props",
                "init lint",
                "dispose lint",
                "dispose props",
                "dispose classes"
            ]
        );
    }

    #[tokio::test]
    async fn test_cycle_detected_before_initialize() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ServiceRegistry::new();
        registry.register(Recording::boxed("A", &["B"], &log)).unwrap();
        registry.register(Recording::boxed("B", &["A"], &log)).unwrap();

        let err = registry
            .initialize_all(&mut Resources::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Dependency(GraphError::Cycle { .. })
        ));
        assert_eq!(err.to_string(), "circular dependency: A -> B -> A");
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_and_unknown() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ServiceRegistry::new();
        registry.register(Recording::boxed("a", &["ghost"], &log)).unwrap();
        assert!(matches!(
            registry.register(Recording::boxed("a", &[], &log)),
            Err(RegistryError::Duplicate(_))
        ));
        assert!(matches!(
            registry.resolve_order(),
            Err(RegistryError::Dependency(GraphError::UnknownDependency { .. }))
        ));
    }
}
