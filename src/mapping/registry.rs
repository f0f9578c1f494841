//! Process-wide descriptor registry.
//!
//! A [`RegistryBuilder`] registers every resource type once at startup and
//! freezes into an immutable [`Registry`]. The registry can be shared through
//! an `Arc` or installed once as the process-wide instance.
//!
//! # Example
//!
//! ```ignore
//! let mut builder = RegistryBuilder::new(vocabulary, CodecRegistry::default());
//! builder.register::<Project>()?.register::<Experiment>()?;
//! let registry = Registry::install(builder.build()?)?;
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::codec::CodecRegistry;
use crate::error::{ClassDefinitionError, MapperError};
use crate::mapping::descriptor::{ClassDescriptor, DescriptorBuilder, Mapping};
use crate::mapping::proxy::Ref;
use crate::mapping::schema::{Mapped, Resource};
use crate::rdf::{Iri, Vocabulary};

static GLOBAL: OnceCell<Arc<Registry>> = OnceCell::new();

struct Entry {
    descriptor: Arc<ClassDescriptor>,
    mapping: Arc<dyn Any + Send + Sync>,
}

/// Collects resource types before the registry is frozen.
pub struct RegistryBuilder {
    vocabulary: Vocabulary,
    codecs: CodecRegistry,
    entries: HashMap<TypeId, Entry>,
    order: Vec<TypeId>,
}

impl RegistryBuilder {
    pub fn new(vocabulary: Vocabulary, codecs: CodecRegistry) -> Self {
        Self {
            vocabulary,
            codecs,
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registers `T`; chaining form of [`register_class`](Self::register_class).
    pub fn register<T: Resource>(&mut self) -> Result<&mut Self, ClassDefinitionError> {
        self.register_class::<T>()?;
        Ok(self)
    }

    /// Compiles and registers `T`, returning its descriptor.
    ///
    /// Registering the same type twice returns the existing descriptor.
    pub fn register_class<T: Resource>(
        &mut self,
    ) -> Result<Arc<ClassDescriptor>, ClassDefinitionError> {
        let id = TypeId::of::<T>();
        if let Some(entry) = self.entries.get(&id) {
            return Ok(entry.descriptor.clone());
        }

        let mapping = DescriptorBuilder::new(&self.vocabulary, &self.codecs).build::<T>()?;
        let descriptor = mapping.descriptor().clone();
        self.entries.insert(
            id,
            Entry {
                descriptor: descriptor.clone(),
                mapping: Arc::new(mapping),
            },
        );
        self.order.push(id);
        Ok(descriptor)
    }

    /// Checks cross-type references and freezes the registry.
    pub fn build(self) -> Result<Registry, ClassDefinitionError> {
        let mut by_type: HashMap<Iri, TypeId> = HashMap::new();

        for id in &self.order {
            let descriptor = &self.entries[id].descriptor;

            for binding in descriptor.bindings() {
                if let Some(target) = binding.target() {
                    if !self.entries.contains_key(&target.type_id) {
                        return Err(ClassDefinitionError::new(
                            descriptor.name(),
                            format!(
                                "field '{}' references {}, which has no descriptor",
                                binding.field(),
                                target.name
                            ),
                        ));
                    }
                }
            }

            // First registration wins the rdf type.
            by_type
                .entry(descriptor.rdf_type().clone())
                .or_insert(*id);
        }

        tracing::info!(classes = self.entries.len(), "Initialized descriptor registry");

        Ok(Registry {
            vocabulary: self.vocabulary,
            codecs: self.codecs,
            entries: self.entries,
            by_type,
        })
    }
}

/// Immutable index of every registered resource type.
///
/// Indexed by Rust type and by rdf type. Safe for concurrent reads.
pub struct Registry {
    vocabulary: Vocabulary,
    codecs: CodecRegistry,
    entries: HashMap<TypeId, Entry>,
    by_type: HashMap<Iri, TypeId>,
}

impl Registry {
    /// Installs the process-wide registry.
    ///
    /// # Errors
    ///
    /// Fails if a registry was already installed.
    pub fn install(registry: Registry) -> Result<Arc<Registry>, MapperError> {
        let registry = Arc::new(registry);
        GLOBAL
            .set(registry.clone())
            .map_err(|_| MapperError::Internal("registry already installed".to_string()))?;
        Ok(registry)
    }

    /// The process-wide registry, if installed.
    pub fn global() -> Result<Arc<Registry>, MapperError> {
        GLOBAL
            .get()
            .cloned()
            .ok_or_else(|| MapperError::Internal("registry not installed".to_string()))
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn descriptor<T: 'static>(&self) -> Result<Arc<ClassDescriptor>, MapperError> {
        self.entry(TypeId::of::<T>(), type_name::<T>())
            .map(|entry| entry.descriptor.clone())
    }

    /// Descriptor of the resource behind a wrapper such as `Ref<T>`.
    pub fn descriptor_of<W: Mapped>(&self) -> Result<Arc<ClassDescriptor>, MapperError> {
        self.descriptor::<W::Target>()
    }

    pub fn descriptor_for_type(&self, rdf_type: &Iri) -> Result<Arc<ClassDescriptor>, MapperError> {
        self.by_type
            .get(rdf_type)
            .and_then(|id| self.entries.get(id))
            .map(|entry| entry.descriptor.clone())
            .ok_or_else(|| MapperError::MapperNotFound(rdf_type.to_string()))
    }

    pub fn mapping<T: Resource>(&self) -> Result<Arc<Mapping<T>>, MapperError> {
        let entry = self.entry(TypeId::of::<T>(), type_name::<T>())?;
        entry
            .mapping
            .clone()
            .downcast::<Mapping<T>>()
            .map_err(|_| MapperError::Internal(format!("mapping type mismatch for {}", type_name::<T>())))
    }

    /// IRI of a reference: the one it was built with, or the identity of
    /// its loaded value.
    pub fn resolve_ref<R: Resource>(&self, reference: &Ref<R>) -> Result<Option<Iri>, MapperError> {
        if let Some(uri) = reference.uri() {
            return Ok(Some(uri.clone()));
        }
        match reference.get() {
            Some(value) => Ok(self.mapping::<R>()?.identity(value).cloned()),
            None => Ok(None),
        }
    }

    fn entry(&self, id: TypeId, name: &str) -> Result<&Entry, MapperError> {
        self.entries
            .get(&id)
            .ok_or_else(|| MapperError::MapperNotFound(name.to_string()))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut classes: Vec<_> = self.entries.values().map(|e| e.descriptor.name()).collect();
        classes.sort_unstable();
        f.debug_struct("Registry").field("classes", &classes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::proxy::{Lazy, RefList};
    use crate::mapping::schema::{term, Field, Schema};
    use crate::rdf::Namespace;

    fn vocabulary() -> Vocabulary {
        Vocabulary::default().with_namespace(Namespace::new(
            "vocab",
            "http://example.org/onto#",
            ["Experiment", "Project", "hasProject"],
        ))
    }

    #[derive(Default)]
    struct Project {
        uri: Option<Iri>,
    }

    impl Resource for Project {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new(term("vocab", "Project")).identity("uri", |p| &p.uri, |p| &mut p.uri)
        }
    }

    #[derive(Default)]
    struct Experiment {
        uri: Option<Iri>,
        projects: RefList<Project>,
    }

    impl Resource for Experiment {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new(term("vocab", "Experiment"))
                .identity("uri", |e| &e.uri, |e| &mut e.uri)
                .reference_list(
                    Field::new("projects", term("vocab", "hasProject")),
                    |e| &e.projects,
                    |e| &mut e.projects,
                )
        }
    }

    fn registry() -> Registry {
        let mut builder = RegistryBuilder::new(vocabulary(), CodecRegistry::default());
        builder.register::<Project>().unwrap();
        builder.register::<Experiment>().unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_lookup_by_type_and_rdf_type() {
        let registry = registry();
        let by_type = registry.descriptor::<Experiment>().unwrap();
        let by_rdf = registry
            .descriptor_for_type(&Iri::from_static("http://example.org/onto#Experiment"))
            .unwrap();
        assert!(Arc::ptr_eq(&by_type, &by_rdf));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_wrapper_resolves_to_target() {
        let registry = registry();
        let direct = registry.descriptor::<Project>().unwrap();
        assert!(Arc::ptr_eq(&direct, &registry.descriptor_of::<Ref<Project>>().unwrap()));
        assert!(Arc::ptr_eq(&direct, &registry.descriptor_of::<Lazy<Project>>().unwrap()));
    }

    #[test]
    fn test_unknown_lookups() {
        let registry = registry();
        assert!(matches!(
            registry.descriptor::<String>(),
            Err(MapperError::MapperNotFound(_))
        ));
        assert!(matches!(
            registry.descriptor_for_type(&Iri::from_static("http://example.org/onto#Nope")),
            Err(MapperError::MapperNotFound(_))
        ));
    }

    #[test]
    fn test_unregistered_reference_target_fails_build() {
        let mut builder = RegistryBuilder::new(vocabulary(), CodecRegistry::default());
        builder.register::<Experiment>().unwrap();
        let err = builder.build().err().unwrap();
        assert!(err.reason.contains("references"));
    }

    #[test]
    fn test_register_twice_returns_same_descriptor() {
        let mut builder = RegistryBuilder::new(vocabulary(), CodecRegistry::default());
        let first = builder.register_class::<Project>().unwrap();
        let second = builder.register_class::<Project>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_resolve_ref() {
        let registry = registry();
        let uri = Iri::from_static("http://example.org/p/1");

        let by_uri = Ref::<Project>::from_uri(uri.clone());
        assert_eq!(registry.resolve_ref(&by_uri).unwrap(), Some(uri.clone()));

        let by_value = Ref::loaded(Project {
            uri: Some(uri.clone()),
        });
        assert_eq!(registry.resolve_ref(&by_value).unwrap(), Some(uri));

        let anonymous = Ref::loaded(Project::default());
        assert_eq!(registry.resolve_ref(&anonymous).unwrap(), None);
    }
}
