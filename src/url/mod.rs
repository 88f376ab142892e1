//! URL handling module
//!
//! This module provides URL normalization, the canonical deduplication key
//! used by the frontier, and resolution of relative references found in
//! page markup.

mod normalize;
mod resolve;

pub use normalize::{canonical_key, normalize_parsed, normalize_url};
pub use resolve::resolve_href;
