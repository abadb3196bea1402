//! Turns a [`RawEvent`] into the wire [`Envelope`].

use stonks_core_types::{Envelope, RawEvent, WireEvent};
use url::Url;

use crate::config::TrackerConfig;
use crate::environment::Environment;
use crate::errors::{TrackerError, TrackerResult};
use crate::host::PageContext;

pub struct EventComposer<'a> {
    config: &'a TrackerConfig,
}

impl<'a> EventComposer<'a> {
    pub fn new(config: &'a TrackerConfig) -> Self {
        Self { config }
    }

    /// Returns `None` when the environment suppresses sending (localhost
    /// without an override, or an automated browser).
    pub fn compose<P: PageContext + ?Sized>(&self, page: &P, event: &RawEvent) -> TrackerResult<Option<Envelope>> {
        let env = Environment::probe(page);
        let localhost_override = self.config.localhost_override();
        if env.suppresses(localhost_override) {
            tracing::debug!(
                event = %event.kind,
                localhost = env.is_localhost,
                headless = env.is_headless,
                "event suppressed by environment"
            );
            return Ok(None);
        }

        let href = page
            .href()
            .ok_or(TrackerError::HostUnavailable("location"))?;
        let mut url = Url::parse(&href)?;

        let mut debug = false;
        if let (true, Some(stand_in)) = (env.is_localhost, localhost_override) {
            if url.host_str() != Some(stand_in) {
                url.set_host(Some(stand_in))?;
                debug = true;
            }
        }

        url.set_query(None);
        if let Some(path) = event.path.as_deref().filter(|p| !p.is_empty()) {
            if url.cannot_be_a_base() {
                return Err(TrackerError::OpaqueUrl(href));
            }
            url.set_path(path);
        }

        let referrer = resolve_referrer(event.referrer.as_deref(), &page.referrer(), &url);
        let wire = WireEvent {
            t: event.kind.clone(),
            h: self.config.hash_routing,
            r: referrer,
            p: event.props.clone(),
        };
        Ok(Some(Envelope::new(
            canonical_url(&url),
            wire,
            event.utm.clone(),
            debug,
        )))
    }
}

/// Serialised URL with exactly one trailing slash removed.
pub fn canonical_url(url: &Url) -> String {
    let href = url.as_str();
    href.strip_suffix('/').unwrap_or(href).to_string()
}

/// Explicit referrer wins; otherwise the document referrer is used when it
/// parses and points at a different host than the destination.
fn resolve_referrer(explicit: Option<&str>, document_referrer: &str, destination: &Url) -> Option<String> {
    if let Some(referrer) = explicit.filter(|r| !r.is_empty()) {
        return Some(referrer.to_string());
    }
    if document_referrer.is_empty() || document_referrer == "null" {
        return None;
    }
    let parsed = Url::parse(document_referrer).ok()?;
    (parsed.host_str() != destination.host_str()).then(|| parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerOptions;
    use crate::host::memory::MemoryHost;
    use stonks_core_types::{Props, UtmParams, PAGE_VIEW};

    fn compose(host: &MemoryHost, config: &TrackerConfig, event: RawEvent) -> Option<Envelope> {
        EventComposer::new(config).compose(host, &event).unwrap()
    }

    fn click() -> RawEvent {
        RawEvent::custom("click", Default::default())
    }

    #[test]
    fn strips_query_and_one_trailing_slash() {
        let host = MemoryHost::new("https://example.com/about/?ref=nav");
        let envelope = compose(&host, &TrackerConfig::default(), click()).unwrap();
        assert_eq!(envelope.u, "https://example.com/about");

        let host = MemoryHost::new("https://example.com/");
        let envelope = compose(&host, &TrackerConfig::default(), click()).unwrap();
        assert_eq!(envelope.u, "https://example.com");
    }

    #[test]
    fn path_override_replaces_pathname() {
        let host = MemoryHost::new("https://example.com/a?b=c");
        let event = RawEvent::page_view("/virtual/page", None, UtmParams::new());
        let envelope = compose(&host, &TrackerConfig::default(), event).unwrap();
        assert_eq!(envelope.u, "https://example.com/virtual/page");
        assert_eq!(envelope.event().t, PAGE_VIEW);
        assert!(envelope.qs.is_none());
    }

    #[test]
    fn localhost_without_override_is_suppressed() {
        let host = MemoryHost::new("http://localhost:5173/");
        assert!(compose(&host, &TrackerConfig::default(), click()).is_none());
    }

    #[test]
    fn localhost_override_enters_debug_mode() {
        let host = MemoryHost::new("http://localhost:5173/docs/");
        let config = TrackerConfig::resolve(TrackerOptions {
            track_localhost_as: Some("test.com".into()),
            ..Default::default()
        });
        let envelope = compose(&host, &config, click()).unwrap();
        assert!(envelope.debug);
        assert_eq!(envelope.u, "http://test.com:5173/docs");
    }

    #[test]
    fn headless_is_suppressed_even_with_override() {
        let host = MemoryHost::new("https://example.com/");
        host.set_webdriver(true);
        let config = TrackerConfig::resolve(TrackerOptions {
            track_localhost_as: Some("test.com".into()),
            ..Default::default()
        });
        assert!(compose(&host, &config, click()).is_none());
    }

    #[test]
    fn same_host_referrer_is_dropped() {
        let host = MemoryHost::new("https://example.com/pricing");
        host.set_referrer("https://example.com/");
        let envelope = compose(&host, &TrackerConfig::default(), click()).unwrap();
        assert_eq!(envelope.event().r, None);

        host.set_referrer("https://news.ycombinator.com/item?id=1");
        let envelope = compose(&host, &TrackerConfig::default(), click()).unwrap();
        assert_eq!(
            envelope.event().r.as_deref(),
            Some("https://news.ycombinator.com/item?id=1")
        );
    }

    #[test]
    fn malformed_and_null_referrers_are_absent() {
        let host = MemoryHost::new("https://example.com/");
        for referrer in ["null", "not a url", ""] {
            host.set_referrer(referrer);
            let envelope = compose(&host, &TrackerConfig::default(), click()).unwrap();
            assert_eq!(envelope.event().r, None, "{referrer}");
        }
    }

    #[test]
    fn explicit_referrer_and_props_pass_through() {
        let host = MemoryHost::new("https://example.com/");
        host.set_referrer("https://other.example/");
        let mut props = Props::new();
        props.insert("plan".into(), "pro".into());
        let event = RawEvent::custom(
            "upgrade",
            stonks_core_types::ViewArgs {
                path: None,
                props: Some(props.clone()),
            },
        )
        .with_referrer("https://explicit.example/");
        let config = TrackerConfig {
            hash_routing: true,
            ..TrackerConfig::default()
        };
        let envelope = compose(&host, &config, event).unwrap();
        let wire = envelope.event();
        assert_eq!(wire.r.as_deref(), Some("https://explicit.example/"));
        assert_eq!(wire.p.as_ref(), Some(&props));
        assert!(wire.h);
    }
}
