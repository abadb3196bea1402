//! Page path resolution from document markers.

use crate::host::PageContext;

const BODY_MARKERS: [&str; 2] = ["data-s-path", "data-s:path"];
const META_MARKER: &str = "stonks-path";

/// Path declared by the page itself: `<body data-s-path>`, `<body data-s:path>`,
/// then `<meta name="stonks-path">`, in that priority order. Falls back to
/// `location.pathname` when none is set.
pub fn resolve_path<P: PageContext + ?Sized>(page: &P) -> String {
    let mut found: Vec<(String, String)> = BODY_MARKERS
        .iter()
        .filter_map(|name| {
            page.body_attribute(name)
                .filter(|value| !value.is_empty())
                .map(|value| (value, name.to_string()))
        })
        .collect();
    if let Some(content) = page
        .meta_content(META_MARKER)
        .filter(|value| !value.is_empty())
    {
        found.push((content, format!("meta[name='{META_MARKER}']")));
    }

    if found.len() > 1 {
        let order: Vec<&str> = found.iter().map(|(_, source)| source.as_str()).collect();
        tracing::warn!(
            order = %order.join(" > "),
            "multiple path sources found, using priority order"
        );
    }

    found
        .into_iter()
        .next()
        .map(|(value, _)| value)
        .unwrap_or_else(|| page.pathname())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryHost;

    #[test]
    fn falls_back_to_location() {
        let host = MemoryHost::new("https://example.com/pricing?x=1");
        assert_eq!(resolve_path(&host), "/pricing");
    }

    #[test]
    fn body_marker_beats_meta() {
        let host = MemoryHost::new("https://example.com/p/123");
        host.set_meta("stonks-path", "/p/meta");
        assert_eq!(resolve_path(&host), "/p/meta");
        host.set_body_attribute("data-s:path", "/p/colon");
        assert_eq!(resolve_path(&host), "/p/colon");
        host.set_body_attribute("data-s-path", "/p/:id");
        assert_eq!(resolve_path(&host), "/p/:id");
    }
}
