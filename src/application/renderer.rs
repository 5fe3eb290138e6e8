//! Renderer contract.
//!
//! Implemented outside the engine by whatever template stack the host
//! application uses. The engine only relies on two behaviors: a **full**
//! render surrounds the editable content region with [`CONTENT_MARKER`]
//! (the marker appears twice, opening and closing the region), and a
//! **partial** render returns only the inner fragment with no page shell.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::provider::PreviewObject;

/// Literal marker a full render emits around the live-editable region.
pub const CONTENT_MARKER: &str = "<!-- CONTENT-REPLACER -->";

/// One render invocation.
pub struct RenderRequest<'a> {
    pub object: &'a dyn PreviewObject,
    /// Domain-object identifier, for template lookups and logging.
    pub id: &'a str,
    /// Webspace the preview is shown in, when the host has that concept.
    pub webspace_key: Option<&'a str>,
    pub locale: &'a str,
    /// Partial mode returns only the content fragment; full mode returns
    /// the whole page with [`CONTENT_MARKER`] around the content region.
    pub partial: bool,
    /// Audience-targeting variant, opaque to the engine.
    pub target_group_id: Option<i64>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render failed: {message}")]
    Failed { message: String },
    #[error("object of type `{type_tag}` is not renderable")]
    Unrenderable { type_tag: String },
}

impl RenderError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn unrenderable(type_tag: impl Into<String>) -> Self {
        Self::Unrenderable {
            type_tag: type_tag.into(),
        }
    }
}

/// Turns a preview object into HTML.
#[async_trait]
pub trait PreviewRenderer: Send + Sync {
    async fn render(&self, request: RenderRequest<'_>) -> Result<String, RenderError>;
}
