use url::Url;

/// Resolves an `href` or `src` attribute against the page it appeared on
///
/// Returns `None` if the reference should be ignored:
/// - empty or fragment-only references
/// - `javascript:`, `mailto:`, `tel:` and `data:` references
/// - references that do not resolve to an http(s) URL
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}
