//! Text normalization and numeric field parsing

use regex::Regex;
use scraper::ElementRef;
use std::sync::LazyLock;

// Integer part of a number, with optional thousands separators and decimals
const NUMBER: &str = r"\b(\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?";

const BED_UNIT: &str = r"(?:bed(?:room)?s?|bds?|br)\b";
const BATH_UNIT: &str = r"(?:bath(?:room)?s?|ba)\b";
const AREA_UNIT: &str = r"(?:sq\.?\s*f(?:ee)?t\.?|sqft|square\s+f(?:ee|oo)t|ft²)";
const AREA_LABEL: &str = r"(?:square\s+footage|sq\.?\s*ft\.?|sqft|living\s+area|area|size)";

fn label_first(label: &str) -> Regex {
    // "Beds: 3" requires the colon so "3 beds 2 baths" is not read as beds = 2
    Regex::new(&format!(r"(?i)\b{}\s*:\s*{}", label, NUMBER)).unwrap()
}

fn number_first(unit: &str) -> Regex {
    Regex::new(&format!(r"(?i){}\s*-?\s*{}", NUMBER, unit)).unwrap()
}

static RE_BEDS_LABEL: LazyLock<Regex> = LazyLock::new(|| label_first(BED_UNIT));
static RE_BEDS: LazyLock<Regex> = LazyLock::new(|| number_first(BED_UNIT));
static RE_BATHS_LABEL: LazyLock<Regex> = LazyLock::new(|| label_first(BATH_UNIT));
static RE_BATHS: LazyLock<Regex> = LazyLock::new(|| number_first(BATH_UNIT));
static RE_AREA_LABEL: LazyLock<Regex> = LazyLock::new(|| label_first(AREA_LABEL));
static RE_AREA: LazyLock<Regex> = LazyLock::new(|| number_first(AREA_UNIT));

/// Collapses whitespace runs to one space and trims the ends
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized text, or `None` if nothing but whitespace remains
pub fn clean_text(text: &str) -> Option<String> {
    let normalized = normalize_whitespace(text);
    (!normalized.is_empty()).then_some(normalized)
}

/// Normalized text content of an element
pub fn element_text(element: ElementRef<'_>) -> Option<String> {
    clean_text(&element.text().collect::<String>())
}

/// Text of the first matching element that has any
pub fn first_text<'a>(mut elements: impl Iterator<Item = ElementRef<'a>>) -> Option<String> {
    elements.find_map(element_text)
}

fn parse_number(capture: &str) -> Option<u32> {
    capture.replace(',', "").parse().ok()
}

fn parse_with(label: &Regex, unit: &Regex, text: &str) -> Option<u32> {
    label
        .captures(text)
        .or_else(|| unit.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_number(m.as_str()))
}

/// Bedroom count from a details blob ("3 beds", "3-bed", "Beds: 3")
pub fn parse_bedrooms(text: &str) -> Option<u32> {
    parse_with(&RE_BEDS_LABEL, &RE_BEDS, text)
}

/// Bathroom count from a details blob ("2 baths", "Bathrooms: 1.5")
pub fn parse_bathrooms(text: &str) -> Option<u32> {
    parse_with(&RE_BATHS_LABEL, &RE_BATHS, text)
}

/// Floor area from a details blob ("1,200 sqft", "950 sq. ft", "Area: 80")
pub fn parse_square_footage(text: &str) -> Option<u32> {
    parse_with(&RE_AREA_LABEL, &RE_AREA, text)
}
