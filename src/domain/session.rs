//! Preview session model.
//!
//! One session is one editor's live-preview interaction with one content
//! object. The in-memory form ([`PreviewSession`]) owns the live object
//! exclusively; the wire form ([`SessionEnvelope`]) carries the
//! provider-serialized object plus a type tag so the owning provider can
//! reconstruct it on the next request.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::application::provider::PreviewObject;

/// An active preview session, reconstructed from the store per operation.
pub struct PreviewSession {
    /// Domain-object identifier (e.g. a page UUID).
    pub id: String,
    /// Locale being edited. Authoritative for rendering.
    pub locale: String,
    /// Owning editor. Sessions are per-user, never shared.
    pub user_id: i64,
    /// Selects the provider that owns this object type.
    pub provider_key: String,
    /// Live, mutable domain object. Owned exclusively by this session.
    pub object: Box<dyn PreviewObject>,
    /// Last full render reduced to a skeleton with the content marker left
    /// in place once. Absent until the first full render.
    pub html: Option<String>,
}

impl PreviewSession {
    pub fn new(
        id: impl Into<String>,
        locale: impl Into<String>,
        user_id: i64,
        provider_key: impl Into<String>,
        object: Box<dyn PreviewObject>,
    ) -> Self {
        Self {
            id: id.into(),
            locale: locale.into(),
            user_id,
            provider_key: provider_key.into(),
            object,
            html: None,
        }
    }

    /// Token of this session, stable across requests.
    pub fn token(&self) -> String {
        session_token(&self.provider_key, &self.id, self.user_id)
    }
}

/// Derive the session token for `(provider_key, id, user_id)`.
///
/// Deterministic: the same triple always yields the same token, so a user
/// resumes an existing session for the same object without a new round
/// trip. The user id in the input keeps two editors off the same entry.
pub fn session_token(provider_key: &str, id: &str, user_id: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider_key.as_bytes());
    hasher.update(b".");
    hasher.update(id.as_bytes());
    hasher.update(b".");
    hasher.update(user_id.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Storage representation of a [`PreviewSession`].
///
/// The live object cannot survive a stateless web tier, so it travels as the
/// provider-serialized `object` payload tagged with `object_class` for
/// deserialization. Everything else is copied verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEnvelope {
    pub id: String,
    pub locale: String,
    pub user_id: i64,
    pub provider_key: String,
    pub html: Option<String>,
    pub object: String,
    pub object_class: String,
}

impl SessionEnvelope {
    /// Encode for the session store.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(|err| EnvelopeError::Encode {
            message: err.to_string(),
        })
    }

    /// Decode a stored entry.
    pub fn decode(raw: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(raw).map_err(|err| EnvelopeError::Decode {
            message: err.to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("session envelope could not be encoded: {message}")]
    Encode { message: String },
    #[error("session envelope could not be decoded: {message}")]
    Decode { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_deterministic() {
        let first = session_token("page", "p1", 42);
        let second = session_token("page", "p1", 42);
        assert_eq!(first, second);
    }

    #[test]
    fn token_separates_distinct_triples() {
        let base = session_token("page", "p1", 42);
        assert_ne!(base, session_token("snippet", "p1", 42));
        assert_ne!(base, session_token("page", "p2", 42));
        assert_ne!(base, session_token("page", "p1", 43));
    }

    #[test]
    fn token_inputs_do_not_collide_across_field_boundaries() {
        // The separator keeps ("ab", "c") and ("a", "bc") apart.
        assert_ne!(session_token("ab", "c", 1), session_token("a", "bc", 1));
    }

    #[test]
    fn envelope_roundtrip() {
        let envelope = SessionEnvelope {
            id: "p1".to_string(),
            locale: "en".to_string(),
            user_id: 42,
            provider_key: "page".to_string(),
            html: Some("<html><!-- CONTENT-REPLACER --></html>".to_string()),
            object: r#"{"title":"Hello"}"#.to_string(),
            object_class: "page".to_string(),
        };

        let raw = envelope.encode().expect("encode envelope");
        let decoded = SessionEnvelope::decode(&raw).expect("decode envelope");

        assert_eq!(decoded.id, "p1");
        assert_eq!(decoded.user_id, 42);
        assert_eq!(decoded.object, envelope.object);
        assert_eq!(decoded.html, envelope.html);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            SessionEnvelope::decode("not json"),
            Err(EnvelopeError::Decode { .. })
        ));
    }
}
