//! Object provider contract and registry.
//!
//! A provider owns one content type (key `"page"`, `"snippet"`, ...): it
//! loads the live domain object, applies field-level and contextual
//! mutations, and round-trips the object through the session store's
//! serialized form. The engine never inspects the object beyond its type
//! tag.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Opaque handle for a live domain object held by a preview session.
///
/// `type_tag` travels with the serialized form so the owning provider can
/// pick the right deserialization path; `as_any`/`as_any_mut` let the
/// provider downcast back to its concrete type.
pub trait PreviewObject: Send + Sync {
    fn type_tag(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("object `{id}` not found for locale `{locale}`")]
    NotFound { id: String, locale: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("object codec error: {message}")]
    Codec { message: String },
}

impl ProviderError {
    pub fn not_found(id: impl Into<String>, locale: impl Into<String>) -> Self {
        Self::NotFound {
            id: id.into(),
            locale: locale.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn codec(message: impl std::fmt::Display) -> Self {
        Self::Codec {
            message: message.to_string(),
        }
    }
}

/// Capability set a content type must implement to be previewable.
#[async_trait]
pub trait PreviewObjectProvider: Send + Sync {
    /// Load the live domain object for `id`/`locale`.
    async fn get_object(&self, id: &str, locale: &str)
    -> Result<Box<dyn PreviewObject>, ProviderError>;

    /// Apply a flat map of field-name → value onto the object in place.
    /// Only the supplied keys are touched.
    fn set_values(
        &self,
        object: &mut dyn PreviewObject,
        locale: &str,
        values: &Map<String, Value>,
    ) -> Result<(), ProviderError>;

    /// Apply broader contextual parameters (template swap, target audience)
    /// that may require re-deriving the object. Returns the object to
    /// continue operating on, which may be a new instance.
    fn set_context(
        &self,
        object: Box<dyn PreviewObject>,
        locale: &str,
        context: &Map<String, Value>,
    ) -> Result<Box<dyn PreviewObject>, ProviderError>;

    /// Serialize the live object into the session store's storage format.
    fn serialize(&self, object: &dyn PreviewObject) -> Result<String, ProviderError>;

    /// Reconstruct a live object from its stored payload and type tag.
    fn deserialize(
        &self,
        payload: &str,
        type_tag: &str,
    ) -> Result<Box<dyn PreviewObject>, ProviderError>;
}

/// Maps provider keys to provider instances.
///
/// Built once at process start and handed to the engine by reference; there
/// is no global registry. Exactly one provider is resolved per key and an
/// unknown key is a hard caller/configuration error, raised by the engine.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn PreviewObjectProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under `key`, replacing any previous registration.
    pub fn register(&mut self, key: impl Into<String>, provider: Arc<dyn PreviewObjectProvider>) {
        self.providers.insert(key.into(), provider);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn PreviewObjectProvider>> {
        self.providers.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.providers.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullObject;

    impl PreviewObject for NullObject {
        fn type_tag(&self) -> &str {
            "null"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct NullProvider;

    #[async_trait]
    impl PreviewObjectProvider for NullProvider {
        async fn get_object(
            &self,
            id: &str,
            locale: &str,
        ) -> Result<Box<dyn PreviewObject>, ProviderError> {
            if id.is_empty() {
                return Err(ProviderError::not_found(id, locale));
            }
            Ok(Box::new(NullObject))
        }

        fn set_values(
            &self,
            _object: &mut dyn PreviewObject,
            _locale: &str,
            _values: &Map<String, Value>,
        ) -> Result<(), ProviderError> {
            Ok(())
        }

        fn set_context(
            &self,
            object: Box<dyn PreviewObject>,
            _locale: &str,
            _context: &Map<String, Value>,
        ) -> Result<Box<dyn PreviewObject>, ProviderError> {
            Ok(object)
        }

        fn serialize(&self, _object: &dyn PreviewObject) -> Result<String, ProviderError> {
            Ok("{}".to_string())
        }

        fn deserialize(
            &self,
            _payload: &str,
            _type_tag: &str,
        ) -> Result<Box<dyn PreviewObject>, ProviderError> {
            Ok(Box::new(NullObject))
        }
    }

    #[test]
    fn registry_resolves_registered_keys() {
        let mut registry = ProviderRegistry::new();
        registry.register("page", Arc::new(NullProvider));

        assert!(registry.contains("page"));
        assert!(registry.get("page").is_some());
        assert!(registry.get("snippet").is_none());
    }

    #[test]
    fn register_replaces_previous_provider() {
        let mut registry = ProviderRegistry::new();
        let first: Arc<dyn PreviewObjectProvider> = Arc::new(NullProvider);
        let second: Arc<dyn PreviewObjectProvider> = Arc::new(NullProvider);

        registry.register("page", Arc::clone(&first));
        registry.register("page", Arc::clone(&second));

        let resolved = registry.get("page").expect("provider");
        assert!(Arc::ptr_eq(&resolved, &second));
    }
}
