//! Compiled CSS selectors
//!
//! Selectors are compiled once at startup so that a typo in the
//! configuration fails fast as a `ConfigError` instead of silently
//! matching nothing on every page.

use crate::config::types::SelectorConfig;
use crate::ConfigError;
use scraper::Selector;

/// The full set of compiled selectors used by the classifier and extractors
#[derive(Debug, Clone)]
pub struct SelectorSet {
    pub card: Selector,
    pub card_link: Selector,
    pub card_title: Selector,
    pub card_price: Selector,
    pub card_location: Selector,
    pub next_page: Selector,
    pub no_results: Selector,
    pub blocked: Selector,
    pub title: Selector,
    pub price: Selector,
    pub location: Selector,
    pub address: Selector,
    pub city: Selector,
    pub postal_code: Selector,
    pub description: Selector,
    pub details: Selector,
    pub images: Selector,
    pub agent: Selector,
    pub agent_name: Selector,
    pub agent_phone: Selector,
    pub agent_email: Selector,
    pub posted_date: Selector,
}

impl SelectorSet {
    /// Compiles every selector in the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSelector` naming the first field that
    /// does not parse.
    pub fn compile(config: &SelectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            card: compile("card", &config.card)?,
            card_link: compile("card-link", &config.card_link)?,
            card_title: compile("card-title", &config.card_title)?,
            card_price: compile("card-price", &config.card_price)?,
            card_location: compile("card-location", &config.card_location)?,
            next_page: compile("next-page", &config.next_page)?,
            no_results: compile("no-results", &config.no_results)?,
            blocked: compile("blocked", &config.blocked)?,
            title: compile("title", &config.title)?,
            price: compile("price", &config.price)?,
            location: compile("location", &config.location)?,
            address: compile("address", &config.address)?,
            city: compile("city", &config.city)?,
            postal_code: compile("postal-code", &config.postal_code)?,
            description: compile("description", &config.description)?,
            details: compile("details", &config.details)?,
            images: compile("images", &config.images)?,
            agent: compile("agent", &config.agent)?,
            agent_name: compile("agent-name", &config.agent_name)?,
            agent_phone: compile("agent-phone", &config.agent_phone)?,
            agent_email: compile("agent-email", &config.agent_email)?,
            posted_date: compile("posted-date", &config.posted_date)?,
        })
    }

    /// Selectors whose presence marks a page as a listing detail page
    pub fn detail_markers(&self) -> [&Selector; 6] {
        [
            &self.description,
            &self.details,
            &self.images,
            &self.agent,
            &self.posted_date,
            &self.address,
        ]
    }
}

fn compile(field: &str, css: &str) -> Result<Selector, ConfigError> {
    if css.trim().is_empty() {
        return Err(ConfigError::InvalidSelector {
            field: field.to_string(),
            message: "selector cannot be empty".to_string(),
        });
    }

    Selector::parse(css).map_err(|e| ConfigError::InvalidSelector {
        field: field.to_string(),
        message: format!("{:?}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selectors_compile() {
        assert!(SelectorSet::compile(&SelectorConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_selector_names_field() {
        let mut config = SelectorConfig::default();
        config.next_page = "a[[".to_string();

        let err = SelectorSet::compile(&config).unwrap_err();
        match err {
            ConfigError::InvalidSelector { field, .. } => assert_eq!(field, "next-page"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_selector_rejected() {
        let mut config = SelectorConfig::default();
        config.agent = "   ".to_string();

        assert!(SelectorSet::compile(&config).is_err());
    }
}
