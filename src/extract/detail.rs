//! Detail-page extraction
//!
//! Fresh values from the detail page win over data carried from the search
//! card. Missing fields stay absent; nothing here fails the task.

use crate::config::SelectorSet;
use crate::extract::text::{
    clean_text, element_text, first_text, parse_bathrooms, parse_bedrooms, parse_square_footage,
};
use crate::listing::{Address, Agent, CarriedData, ListingRecord};
use crate::url::resolve_href;
use scraper::{Html, Selector};
use url::Url;

/// Builds a complete listing record from a detail page
///
/// # Arguments
///
/// * `document` - The parsed detail page
/// * `listing_url` - Identity of the record (the task URL)
/// * `base_url` - URL the page was served from, for resolving image sources
/// * `carried` - Card data from the search page that linked here
/// * `selectors` - Compiled selectors
pub fn extract_detail(
    document: &Html,
    listing_url: &Url,
    base_url: &Url,
    carried: Option<&CarriedData>,
    selectors: &SelectorSet,
) -> ListingRecord {
    let text = |selector: &Selector| first_text(document.select(selector));

    let details = text(&selectors.details);
    let description = text(&selectors.description);

    // Numeric fields come from the details block, or the description when
    // the page has no separate block
    let blob = details.as_deref().or(description.as_deref()).unwrap_or("");

    let mut record = ListingRecord {
        url: listing_url.to_string(),
        title: text(&selectors.title),
        price: text(&selectors.price),
        location: text(&selectors.location),
        address: None,
        bedrooms: parse_bedrooms(blob),
        bathrooms: parse_bathrooms(blob),
        square_footage: parse_square_footage(blob),
        description,
        details,
        images: extract_images(document, base_url, &selectors.images),
        agent: extract_agent(document, selectors),
        posted_date: extract_posted_date(document, &selectors.posted_date),
    };

    if let Some(carried) = carried {
        record = record.merge_carried(carried);
    }

    record.address = structured_address(document, selectors)
        .or_else(|| record.location.as_deref().and_then(split_location));

    let missing = record.missing_required_fields();
    if !missing.is_empty() {
        tracing::debug!(url = %listing_url, missing = ?missing, "Listing has missing fields");
    }

    record
}

fn structured_address(document: &Html, selectors: &SelectorSet) -> Option<Address> {
    let address = Address {
        street: first_text(document.select(&selectors.address)),
        city: first_text(document.select(&selectors.city)),
        postal_code: first_text(document.select(&selectors.postal_code)),
    };
    (!address.is_empty()).then_some(address)
}

/// Splits `"street, city, postal code"` into structured parts
///
/// With more than three parts, everything before the city belongs to the
/// street. Two parts are read as street and city.
pub fn split_location(location: &str) -> Option<Address> {
    let parts: Vec<String> = location.split(',').filter_map(clean_text).collect();

    match parts.len() {
        0 | 1 => None,
        2 => Some(Address {
            street: Some(parts[0].clone()),
            city: Some(parts[1].clone()),
            postal_code: None,
        }),
        n => Some(Address {
            street: Some(parts[..n - 2].join(", ")),
            city: Some(parts[n - 2].clone()),
            postal_code: Some(parts[n - 1].clone()),
        }),
    }
}

fn extract_images(document: &Html, base_url: &Url, selector: &Selector) -> Vec<String> {
    document
        .select(selector)
        .filter_map(|img| {
            let value = img.value();
            value
                .attr("src")
                .filter(|src| !src.trim().is_empty())
                .or_else(|| value.attr("data-src"))
        })
        .filter_map(|src| resolve_href(base_url, src))
        .map(|url| url.to_string())
        .collect()
}

fn extract_agent(document: &Html, selectors: &SelectorSet) -> Option<Agent> {
    let container = document.select(&selectors.agent).next();

    let find = |selector: &Selector| match container {
        Some(el) => first_text(el.select(selector)),
        None => first_text(document.select(selector)),
    };

    let name = find(&selectors.agent_name);
    let phone = find(&selectors.agent_phone);
    let email = find(&selectors.agent_email);

    if name.is_some() || phone.is_some() || email.is_some() {
        return Some(Agent::Contact { name, phone, email });
    }

    container.and_then(element_text).map(Agent::Text)
}

fn extract_posted_date(document: &Html, selector: &Selector) -> Option<String> {
    let element = document.select(selector).next()?;
    element
        .value()
        .attr("datetime")
        .and_then(clean_text)
        .or_else(|| element_text(element))
}
