//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `TaskState`: Lifecycle of a single crawl task (ready, in flight, delivered, abandoned)
//! - `CrawlState`: Process-wide counters and the listings-cap reservation

mod crawl_state;
mod task_state;

// Re-export main types
pub use crawl_state::CrawlState;
pub use task_state::TaskState;
