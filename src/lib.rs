//! Scorcio: live preview session engine for publishing systems.
//!
//! An editor iteratively edits a content object and watches a live-rendered
//! HTML preview. Rendering the whole page per keystroke is too slow, so the
//! engine renders the page shell once, keeps it as a *skeleton* with a
//! content marker left in place, and answers each edit with a cheap partial
//! render spliced into that skeleton.
//!
//! Sessions are addressed by a token derived from the owning provider key,
//! object id and user id, and live in a TTL-bounded [`cache::SessionStore`].
//! Concrete content types plug in through
//! [`application::provider::PreviewObjectProvider`]; template engines plug in
//! through [`application::renderer::PreviewRenderer`].

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
