//! Extraction pipeline
//!
//! Pure functions from a parsed page to listing data:
//!
//! - `search`: listing cards and the next-page link
//! - `detail`: a complete listing record
//! - `text`: whitespace normalization and numeric field parsing

mod detail;
mod search;
pub mod text;

pub use detail::{extract_detail, split_location};
pub use search::{extract_search, resolve_next_page, Card, SearchPage};
