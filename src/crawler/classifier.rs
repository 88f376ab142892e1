//! Page classification
//!
//! The role a task was enqueued with decides how its page is handled.
//! Content sniffing only happens for tasks without a role. Either way the
//! page must carry the markers its role expects; a page that does not is
//! treated as a block or challenge page and routed to the retry policy.

use crate::config::SelectorSet;
use crate::crawler::task::{Role, Task};
use scraper::{Html, Selector};
use thiserror::Error;

/// Why a fetched page could not be classified
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    /// A challenge, captcha or block marker is present
    #[error("page is a block or challenge page")]
    Blocked,

    /// None of the markers expected for the role are present
    #[error("expected {expected} markers are missing")]
    MarkersMissing { expected: &'static str },
}

fn has(document: &Html, selector: &Selector) -> bool {
    document.select(selector).next().is_some()
}

fn looks_like_search(document: &Html, selectors: &SelectorSet) -> bool {
    has(document, &selectors.card)
        || has(document, &selectors.next_page)
        || has(document, &selectors.no_results)
}

fn looks_like_detail(document: &Html, selectors: &SelectorSet) -> bool {
    has(document, &selectors.title)
        || selectors
            .detail_markers()
            .into_iter()
            .any(|selector| has(document, selector))
}

/// Assigns a role to a fetched page
///
/// # Arguments
///
/// * `task` - The task the page was fetched for
/// * `document` - The parsed page
/// * `selectors` - Compiled marker selectors
///
/// # Returns
///
/// * `Ok(Role)` - The role to extract the page as
/// * `Err(ClassificationError)` - The page is a block/challenge page or
///   lacks every marker of its role
pub fn classify(
    task: &Task,
    document: &Html,
    selectors: &SelectorSet,
) -> Result<Role, ClassificationError> {
    if has(document, &selectors.blocked) {
        return Err(ClassificationError::Blocked);
    }

    match task.role {
        Some(Role::Search) if looks_like_search(document, selectors) => Ok(Role::Search),
        Some(Role::Search) => Err(ClassificationError::MarkersMissing { expected: "search" }),
        Some(Role::Detail) if looks_like_detail(document, selectors) => Ok(Role::Detail),
        Some(Role::Detail) => Err(ClassificationError::MarkersMissing { expected: "detail" }),
        None => {
            // Cards are the stronger signal: result pages often share the
            // detail layout's header
            if has(document, &selectors.card) || has(document, &selectors.no_results) {
                Ok(Role::Search)
            } else if selectors
                .detail_markers()
                .into_iter()
                .any(|selector| has(document, selector))
            {
                Ok(Role::Detail)
            } else {
                Err(ClassificationError::MarkersMissing {
                    expected: "search or detail",
                })
            }
        }
    }
}
