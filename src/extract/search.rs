//! Search-results extraction and pagination
//!
//! - Cards are read in document order; a card without a usable link is
//!   skipped, a card missing price or location still yields a summary
//! - Cards the caller already knows (or that repeat earlier on the page)
//!   are passed over; only the first `limit` new cards are evaluated
//! - The next-page control is resolved against the page URL

use crate::config::SelectorSet;
use crate::extract::text::first_text;
use crate::listing::CarriedData;
use crate::url::{canonical_key, normalize_parsed, resolve_href};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

static ANY_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// One listing card from a search page
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// Normalized detail-page URL
    pub url: Url,
    pub summary: CarriedData,
}

/// Everything the engine needs from a search page
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// New usable cards in document order, at most `limit`
    pub cards: Vec<Card>,

    /// Resolved next-page URL, if the page has an enabled "next" control
    pub next: Option<Url>,

    /// Cards skipped because they had no resolvable link
    pub skipped: usize,

    /// Cards passed over because their URL was already known
    pub known: usize,
}

/// Extracts cards and the next-page link from a search page
///
/// # Arguments
///
/// * `document` - The parsed search page
/// * `page_url` - URL the page was served from, for resolving relative links
/// * `selectors` - Compiled selectors
/// * `limit` - Maximum number of new cards to return; cards past it are not read
/// * `is_known` - Whether a canonical key needs no further work, checked
///   before a card counts toward `limit`
pub fn extract_search(
    document: &Html,
    page_url: &Url,
    selectors: &SelectorSet,
    limit: usize,
    is_known: impl Fn(&str) -> bool,
) -> SearchPage {
    let mut page = SearchPage {
        next: resolve_next_page(document, page_url, selectors),
        ..SearchPage::default()
    };
    let mut seen = HashSet::new();

    for card in document.select(&selectors.card) {
        if page.cards.len() >= limit {
            break;
        }

        match extract_card(card, page_url, selectors) {
            Some(card) => {
                let key = canonical_key(&card.url);
                if is_known(&key) || !seen.insert(key) {
                    page.known += 1;
                    continue;
                }
                page.cards.push(card);
            }
            None => {
                page.skipped += 1;
                tracing::debug!(page = %page_url, "Skipping listing card without a usable link");
            }
        }
    }

    page
}

fn extract_card(card: ElementRef<'_>, page_url: &Url, selectors: &SelectorSet) -> Option<Card> {
    let href = card
        .select(&selectors.card_link)
        .find_map(|a| a.value().attr("href"))
        .or_else(|| card.value().attr("href"))?;

    let url = resolve_href(page_url, href).and_then(|url| normalize_parsed(url).ok())?;

    Some(Card {
        url,
        summary: CarriedData {
            title: first_text(card.select(&selectors.card_title)),
            price: first_text(card.select(&selectors.card_price)),
            location: first_text(card.select(&selectors.card_location)),
        },
    })
}

fn is_disabled(element: ElementRef<'_>) -> bool {
    let value = element.value();
    value.attr("disabled").is_some()
        || value.attr("aria-disabled") == Some("true")
        || value.classes().any(|class| class == "disabled")
}

/// Resolves the "next" control of a search page
///
/// The control may be the link itself or wrap one. Disabled controls and
/// links back to the current page are ignored.
pub fn resolve_next_page(document: &Html, page_url: &Url, selectors: &SelectorSet) -> Option<Url> {
    let control = document.select(&selectors.next_page).next()?;
    if is_disabled(control) {
        return None;
    }

    let href = control
        .value()
        .attr("href")
        .or_else(|| control.select(&ANY_LINK).find_map(|a| a.value().attr("href")))?;

    let next = resolve_href(page_url, href).and_then(|url| normalize_parsed(url).ok())?;
    let current = normalize_parsed(page_url.clone()).ok();

    if current.as_ref() == Some(&next) {
        return None;
    }

    Some(next)
}
