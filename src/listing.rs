//! Listing records: the output unit of a crawl
//!
//! A record is created from the data carried by the search card that linked
//! to it, completed by the detail extractor and handed to the sink once.

use serde::{Deserialize, Serialize};

/// Partial record fields scraped from a search-result card
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarriedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl CarriedData {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.price.is_none() && self.location.is_none()
    }
}

/// Structured address split out of a location string or read from
/// dedicated selectors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.street.is_none() && self.city.is_none() && self.postal_code.is_none()
    }
}

/// Listing agent, either a free-text blob or structured contact details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Agent {
    Contact {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phone: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
    Text(String),
}

/// A normalized real-estate listing
///
/// Absent fields are `None` (or an empty `images` list) and are omitted
/// from the serialized form. Numeric fields are never defaulted to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    /// Normalized URL of the listing's detail page
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Raw text of the details block the numeric fields are parsed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub square_footage: Option<u32>,
}

/// Field names reported in coverage statistics, in display order
pub const REPORTED_FIELDS: [&str; 11] = [
    "title",
    "price",
    "location",
    "description",
    "images",
    "agent",
    "postedDate",
    "address",
    "bedrooms",
    "bathrooms",
    "squareFootage",
];

impl ListingRecord {
    /// Creates a record pre-seeded with the data carried from a search card
    pub fn from_carried(url: impl Into<String>, carried: &CarriedData) -> Self {
        Self {
            url: url.into(),
            title: carried.title.clone(),
            price: carried.price.clone(),
            location: carried.location.clone(),
            ..Self::default()
        }
    }

    /// Fills fields the detail page did not provide from carried card data
    ///
    /// Freshly scraped values always win.
    pub fn merge_carried(mut self, carried: &CarriedData) -> Self {
        if self.title.is_none() {
            self.title = carried.title.clone();
        }
        if self.price.is_none() {
            self.price = carried.price.clone();
        }
        if self.location.is_none() {
            self.location = carried.location.clone();
        }
        self
    }

    /// Presence of each reported field, in [`REPORTED_FIELDS`] order
    pub fn field_presence(&self) -> [bool; 11] {
        [
            self.title.is_some(),
            self.price.is_some(),
            self.location.is_some() || self.address.is_some(),
            self.description.is_some(),
            !self.images.is_empty(),
            self.agent.is_some(),
            self.posted_date.is_some(),
            self.address.is_some(),
            self.bedrooms.is_some(),
            self.bathrooms.is_some(),
            self.square_footage.is_some(),
        ]
    }

    /// Names of required fields this record lacks
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        REPORTED_FIELDS
            .iter()
            .zip(self.field_presence())
            .take(7)
            .filter(|(_, present)| !present)
            .map(|(name, _)| *name)
            .collect()
    }
}
