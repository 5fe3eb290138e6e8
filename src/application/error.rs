use thiserror::Error;

use crate::application::provider::ProviderError;
use crate::application::renderer::RenderError;
use crate::cache::StoreError;
use crate::domain::session::EnvelopeError;

/// Failure taxonomy of the preview engine.
///
/// The engine performs no local recovery except `stop`: provider and
/// renderer failures surface unmodified, and an operation either completes
/// its whole mutate+save+render sequence or leaves the session in its last
/// successfully-saved state.
#[derive(Debug, Error)]
pub enum PreviewError {
    /// Unregistered provider key. A caller/configuration bug, not retryable.
    #[error("no preview provider registered for key `{key}`")]
    ProviderNotFound { key: String },
    /// Missing or expired session token. Recoverable by starting a new
    /// session.
    #[error("preview token `{token}` not found or expired")]
    TokenNotFound { token: String },
    /// A full render did not contain [`CONTENT_MARKER`] twice, which is a
    /// renderer contract violation.
    ///
    /// [`CONTENT_MARKER`]: crate::application::renderer::CONTENT_MARKER
    #[error("full render did not surround the content region with the content marker")]
    MissingContentMarker,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

impl PreviewError {
    pub fn provider_not_found(key: impl Into<String>) -> Self {
        Self::ProviderNotFound { key: key.into() }
    }

    pub fn token_not_found(token: impl Into<String>) -> Self {
        Self::TokenNotFound {
            token: token.into(),
        }
    }
}
