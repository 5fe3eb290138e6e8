//! Preview engine: session lifecycle and the partial-render splice protocol.
//!
//! The expensive page shell (layout, navigation, head tags) is rendered once
//! per structural change (first render or context change) and kept as a
//! *skeleton*: the full render with everything between the two content
//! markers removed and a single marker left as placeholder. Per-keystroke
//! field edits then pay only a partial render of the content fragment plus a
//! string splice into that skeleton.
//!
//! Every operation runs its steps strictly in order (fetch → mutate →
//! render → save); there is no cross-caller locking. A session belongs to
//! one user's browser tab, and the user id inside the token derivation keeps
//! editors off each other's entries.

use std::sync::Arc;

use metrics::counter;
use serde_json::{Map, Value};
use time::Duration;
use tracing::{debug, warn};

use crate::application::error::PreviewError;
use crate::application::provider::{PreviewObjectProvider, ProviderRegistry};
use crate::application::renderer::{CONTENT_MARKER, PreviewRenderer, RenderRequest};
use crate::cache::{CacheConfig, SessionStore};
use crate::domain::session::{PreviewSession, SessionEnvelope};

const METRIC_PREVIEW_START_TOTAL: &str = "scorcio_preview_start_total";
const METRIC_PREVIEW_STOP_TOTAL: &str = "scorcio_preview_stop_total";
const METRIC_RENDER_FULL_TOTAL: &str = "scorcio_preview_render_full_total";
const METRIC_RENDER_PARTIAL_TOTAL: &str = "scorcio_preview_render_partial_total";

/// Orchestrates preview sessions over a provider registry, a renderer and a
/// session store.
pub struct PreviewEngine {
    registry: Arc<ProviderRegistry>,
    renderer: Arc<dyn PreviewRenderer>,
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl PreviewEngine {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        renderer: Arc<dyn PreviewRenderer>,
        store: Arc<dyn SessionStore>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            registry,
            renderer,
            store,
            ttl: config.ttl(),
        }
    }

    /// Start a preview session and return its token.
    ///
    /// A non-empty `data` map is applied onto the freshly loaded object
    /// before the first save, so a session can open with a draft already in
    /// place. Starting overwrites any prior session for the same
    /// `(provider_key, id, user_id)` identity, discarding its in-progress
    /// edits.
    pub async fn start(
        &self,
        provider_key: &str,
        id: &str,
        locale: &str,
        user_id: i64,
        data: &Map<String, Value>,
    ) -> Result<String, PreviewError> {
        let provider = self.resolve_provider(provider_key)?;
        let object = provider.get_object(id, locale).await?;

        let mut session = PreviewSession::new(id, locale, user_id, provider_key, object);
        if !data.is_empty() {
            provider.set_values(session.object.as_mut(), &session.locale, data)?;
        }

        let token = session.token();
        self.save_session(&token, &session, provider.as_ref())
            .await?;

        counter!(METRIC_PREVIEW_START_TOTAL).increment(1);
        debug!(
            provider_key,
            id, locale, user_id, "preview session started"
        );
        Ok(token)
    }

    /// Whether a live session exists under `token`.
    pub async fn exists(&self, token: &str) -> Result<bool, PreviewError> {
        Ok(self.store.contains(token).await?)
    }

    /// End the session under `token`.
    ///
    /// Deliberately exception-free: a missing or already-expired token is
    /// treated as success, and store failures are logged rather than
    /// surfaced, so stopping twice never bites the caller.
    pub async fn stop(&self, token: &str) {
        if let Err(err) = self.store.delete(token).await {
            warn!(token, error = %err, "failed to delete preview session");
            return;
        }
        counter!(METRIC_PREVIEW_STOP_TOTAL).increment(1);
        debug!(token, "preview session stopped");
    }

    /// Apply field-level changes and return the freshly spliced HTML.
    ///
    /// An empty `data` map neither mutates the object nor re-saves the
    /// session; the existing skeleton is spliced with a fresh partial
    /// render and returned as-is.
    pub async fn update(
        &self,
        token: &str,
        webspace_key: Option<&str>,
        data: &Map<String, Value>,
        target_group_id: Option<i64>,
    ) -> Result<String, PreviewError> {
        let (mut session, provider) = self.fetch_session(token).await?;

        if !data.is_empty() {
            provider.set_values(session.object.as_mut(), &session.locale, data)?;
            self.save_session(token, &session, provider.as_ref())
                .await?;
        }

        self.splice_current(token, &mut session, provider.as_ref(), webspace_key, target_group_id)
            .await
    }

    /// Apply contextual parameters (template swap, audience change) that
    /// invalidate the page shell.
    ///
    /// An empty `context` skips mutation entirely and returns a plain full
    /// render, bypassing the skeleton. A non-empty `context` may replace
    /// the object, forces a full render to regenerate the skeleton, and
    /// persists before splicing.
    pub async fn update_context(
        &self,
        token: &str,
        webspace_key: Option<&str>,
        context: &Map<String, Value>,
        target_group_id: Option<i64>,
    ) -> Result<String, PreviewError> {
        let (mut session, provider) = self.fetch_session(token).await?;

        if context.is_empty() {
            return self
                .render_full(&session, webspace_key, target_group_id)
                .await;
        }

        let locale = session.locale.clone();
        session.object = provider.set_context(session.object, &locale, context)?;

        self.rebuild_skeleton(token, &mut session, provider.as_ref(), webspace_key, target_group_id)
            .await
    }

    /// Re-render the session from scratch: full render, fresh skeleton,
    /// persist, then splice.
    ///
    /// The session's stored locale stays authoritative; a differing
    /// `locale` argument is accepted for interface compatibility and logged
    /// instead of honored.
    pub async fn render(
        &self,
        token: &str,
        webspace_key: Option<&str>,
        locale: &str,
        target_group_id: Option<i64>,
    ) -> Result<String, PreviewError> {
        let (mut session, provider) = self.fetch_session(token).await?;

        if locale != session.locale {
            warn!(
                token,
                requested = locale,
                stored = session.locale,
                "render requested with a locale differing from the session; using the stored locale"
            );
        }

        self.rebuild_skeleton(token, &mut session, provider.as_ref(), webspace_key, target_group_id)
            .await
    }

    fn resolve_provider(
        &self,
        key: &str,
    ) -> Result<Arc<dyn PreviewObjectProvider>, PreviewError> {
        self.registry
            .get(key)
            .ok_or_else(|| PreviewError::provider_not_found(key))
    }

    /// Reconstruct the session stored under `token` together with its
    /// provider. A missing or expired entry is `TokenNotFound`.
    async fn fetch_session(
        &self,
        token: &str,
    ) -> Result<(PreviewSession, Arc<dyn PreviewObjectProvider>), PreviewError> {
        let raw = self
            .store
            .fetch(token)
            .await?
            .ok_or_else(|| PreviewError::token_not_found(token))?;

        let envelope = SessionEnvelope::decode(&raw)?;
        let provider = self.resolve_provider(&envelope.provider_key)?;
        let object = provider.deserialize(&envelope.object, &envelope.object_class)?;

        let mut session = PreviewSession::new(
            envelope.id,
            envelope.locale,
            envelope.user_id,
            envelope.provider_key,
            object,
        );
        session.html = envelope.html;
        Ok((session, provider))
    }

    async fn save_session(
        &self,
        token: &str,
        session: &PreviewSession,
        provider: &dyn PreviewObjectProvider,
    ) -> Result<(), PreviewError> {
        let envelope = SessionEnvelope {
            id: session.id.clone(),
            locale: session.locale.clone(),
            user_id: session.user_id,
            provider_key: session.provider_key.clone(),
            html: session.html.clone(),
            object: provider.serialize(session.object.as_ref())?,
            object_class: session.object.type_tag().to_string(),
        };
        self.store
            .save(token, envelope.encode()?, self.ttl)
            .await?;
        Ok(())
    }

    async fn render_full(
        &self,
        session: &PreviewSession,
        webspace_key: Option<&str>,
        target_group_id: Option<i64>,
    ) -> Result<String, PreviewError> {
        counter!(METRIC_RENDER_FULL_TOTAL).increment(1);
        Ok(self
            .renderer
            .render(RenderRequest {
                object: session.object.as_ref(),
                id: &session.id,
                webspace_key,
                locale: &session.locale,
                partial: false,
                target_group_id,
            })
            .await?)
    }

    async fn render_fragment(
        &self,
        session: &PreviewSession,
        webspace_key: Option<&str>,
        target_group_id: Option<i64>,
    ) -> Result<String, PreviewError> {
        counter!(METRIC_RENDER_PARTIAL_TOTAL).increment(1);
        Ok(self
            .renderer
            .render(RenderRequest {
                object: session.object.as_ref(),
                id: &session.id,
                webspace_key,
                locale: &session.locale,
                partial: true,
                target_group_id,
            })
            .await?)
    }

    /// Full render → fresh skeleton → persist → partial render → splice.
    async fn rebuild_skeleton(
        &self,
        token: &str,
        session: &mut PreviewSession,
        provider: &dyn PreviewObjectProvider,
        webspace_key: Option<&str>,
        target_group_id: Option<i64>,
    ) -> Result<String, PreviewError> {
        let full = self
            .render_full(session, webspace_key, target_group_id)
            .await?;
        session.html = Some(remove_content(&full)?);
        self.save_session(token, session, provider).await?;

        let fragment = self
            .render_fragment(session, webspace_key, target_group_id)
            .await?;
        let skeleton = session.html.as_deref().unwrap_or_default();
        Ok(splice(skeleton, &fragment))
    }

    /// Partial render spliced into the stored skeleton. A session that was
    /// started but never rendered has no skeleton yet; build one first so
    /// an early `update` does not fail.
    async fn splice_current(
        &self,
        token: &str,
        session: &mut PreviewSession,
        provider: &dyn PreviewObjectProvider,
        webspace_key: Option<&str>,
        target_group_id: Option<i64>,
    ) -> Result<String, PreviewError> {
        if session.html.is_none() {
            return self
                .rebuild_skeleton(token, session, provider, webspace_key, target_group_id)
                .await;
        }

        let fragment = self
            .render_fragment(session, webspace_key, target_group_id)
            .await?;
        let skeleton = session.html.as_deref().unwrap_or_default();
        Ok(splice(skeleton, &fragment))
    }
}

/// Reduce a full render to its skeleton.
///
/// The full render contains [`CONTENT_MARKER`] at two positions bounding
/// the editable region. The skeleton keeps everything before the first
/// marker, the marker once, and everything after the second marker; the
/// rendered content in between is discarded. Fewer than two occurrences is
/// a renderer contract violation.
fn remove_content(full_html: &str) -> Result<String, PreviewError> {
    let mut parts = full_html.splitn(3, CONTENT_MARKER);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(head), Some(_content), Some(tail)) => {
            Ok(format!("{head}{CONTENT_MARKER}{tail}"))
        }
        _ => Err(PreviewError::MissingContentMarker),
    }
}

/// Substitute the skeleton's marker with a freshly rendered fragment.
/// Returns a new string; the skeleton itself is never mutated.
fn splice(skeleton: &str, fragment: &str) -> String {
    skeleton.replacen(CONTENT_MARKER, fragment, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_content_keeps_shell_and_one_marker() {
        let full = format!(
            "<html><body>{CONTENT_MARKER}<h1>Hello</h1>{CONTENT_MARKER}</body></html>"
        );
        let skeleton = remove_content(&full).expect("skeleton");
        assert_eq!(
            skeleton,
            format!("<html><body>{CONTENT_MARKER}</body></html>")
        );
    }

    #[test]
    fn remove_content_requires_two_markers() {
        assert!(matches!(
            remove_content("<html><body></body></html>"),
            Err(PreviewError::MissingContentMarker)
        ));
        assert!(matches!(
            remove_content(&format!("<html>{CONTENT_MARKER}</html>")),
            Err(PreviewError::MissingContentMarker)
        ));
    }

    #[test]
    fn splice_replaces_the_marker_once() {
        let skeleton = format!("<html><body>{CONTENT_MARKER}</body></html>");
        assert_eq!(
            splice(&skeleton, "<h1>Updated</h1>"),
            "<html><body><h1>Updated</h1></body></html>"
        );
    }

    #[test]
    fn splice_leaves_marker_free_skeletons_alone() {
        assert_eq!(splice("<html></html>", "<p>x</p>"), "<html></html>");
    }

    #[test]
    fn skeleton_roundtrip_composition() {
        // A + M + B + M + C reduces to A + M + C, and splicing F yields
        // A + F + C.
        let full = format!("A{CONTENT_MARKER}B{CONTENT_MARKER}C");
        let skeleton = remove_content(&full).expect("skeleton");
        assert_eq!(skeleton, format!("A{CONTENT_MARKER}C"));
        assert_eq!(splice(&skeleton, "F"), "AFC");
    }
}
