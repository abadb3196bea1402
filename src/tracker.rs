//! Session orchestrator: dedup cursor, page-view rules and the send pipeline.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use stonks_core_types::{Envelope, PathOrProps, Props, RawEvent, ViewArgs};
use stonks_event_bus::{outcome_bus, OutcomeBus};

use crate::autocollect::{AutocollectSink, AutocollectWiring, ClickCapture};
use crate::compose::EventComposer;
use crate::config::TrackerConfig;
use crate::delivery::DeliveryChannel;
use crate::environment::{is_client, Environment};
use crate::errors::TrackerResult;
use crate::filter::PathFilter;
use crate::host::BrowserHost;
use crate::path::resolve_path;
use crate::utm::parse_utm_params;

pub struct Tracker {
    host: Rc<dyn BrowserHost>,
    config: TrackerConfig,
    filter: PathFilter,
    channel: DeliveryChannel,
    last_path: RefCell<Option<String>>,
    wiring: RefCell<AutocollectWiring>,
    this: Weak<Tracker>,
}

impl Tracker {
    /// Builds a session reporting outcomes on the process-wide bus and, when
    /// `autocollect` is on, installs the listeners.
    pub fn start(host: Rc<dyn BrowserHost>, config: TrackerConfig) -> Rc<Self> {
        Self::start_with_outcomes(host, config, outcome_bus())
    }

    pub fn start_with_outcomes(
        host: Rc<dyn BrowserHost>,
        config: TrackerConfig,
        outcomes: Arc<OutcomeBus>,
    ) -> Rc<Self> {
        let filter = PathFilter::from_config(&config);
        let channel = DeliveryChannel::new(config.collector_url.clone(), outcomes);
        let tracker = Rc::new_cyclic(|this| Tracker {
            host,
            config,
            filter,
            channel,
            last_path: RefCell::new(None),
            wiring: RefCell::new(AutocollectWiring::new()),
            this: this.clone(),
        });
        if tracker.config.autocollect {
            tracker.install_autocollect();
        }
        tracker
    }

    pub fn last_tracked_path(&self) -> Option<String> {
        self.last_path.borrow().clone()
    }

    pub fn autocollect_installed(&self) -> bool {
        self.wiring.borrow().is_installed()
    }

    fn install_autocollect(&self) {
        let sink: Weak<dyn AutocollectSink> = self.this.clone();
        if let Err(err) = self.wiring.borrow_mut().install(sink) {
            tracing::warn!(error = %err, "autocollect could not be installed");
        }
    }

    /// Sends a custom event immediately. No dedup and no path filtering.
    pub fn event(&self, name: &str, path_or_props: Option<PathOrProps>, props: Option<Props>) {
        let page = self.host.as_ref();
        if !is_client(page) {
            return;
        }
        if Environment::probe(page).suppresses(self.config.localhost_override()) {
            tracing::debug!(event = name, "event suppressed by environment");
            return;
        }
        let args = ViewArgs::normalize(path_or_props, props);
        self.dispatch(RawEvent::custom(name, args));
    }

    /// Explicit page view. Deduplicated but never path-filtered.
    pub fn view(&self, path_or_props: Option<PathOrProps>, props: Option<Props>) {
        self.track_page_view(ViewArgs::normalize(path_or_props, props), false);
    }

    /// Shared page-view rule for explicit calls and autocollect triggers.
    pub fn track_page_view(&self, args: ViewArgs, check_block: bool) {
        let page = self.host.as_ref();
        if !is_client(page) {
            return;
        }

        let path = match args.path {
            Some(path) => path,
            None if self.config.path_markers => resolve_path(page),
            None => page.pathname(),
        };

        if !self.config.hash_routing && self.last_path.borrow().as_deref() == Some(path.as_str()) {
            tracing::trace!(%path, "duplicate page view skipped");
            return;
        }
        if check_block && !self.filter.allows(&path) {
            tracing::debug!(%path, "page view blocked by path filter");
            return;
        }

        *self.last_path.borrow_mut() = Some(path.clone());
        let utm = parse_utm_params(&page.search());
        self.dispatch(RawEvent::page_view(path, args.props, utm));
    }

    /// Uninstalls autocollect and resets the dedup cursor. Idempotent.
    pub fn cleanup(&self) {
        self.wiring.borrow_mut().uninstall(self.host.as_ref());
        self.last_path.borrow_mut().take();
    }

    fn dispatch(&self, event: RawEvent) {
        if let Err(err) = self.send(&event) {
            tracing::warn!(event = %event.kind, error = %err, "event not sent");
        }
    }

    fn send(&self, event: &RawEvent) -> TrackerResult<Option<Envelope>> {
        let page = self.host.as_ref();
        let Some(envelope) = EventComposer::new(&self.config).compose(page, event)? else {
            return Ok(None);
        };
        if envelope.debug {
            tracing::info!(url = %envelope.u, event = %event.kind, "debug mode: localhost reported under stand-in host");
        }
        self.channel.deliver(page, &envelope)?;
        Ok(Some(envelope))
    }
}

impl AutocollectSink for Tracker {
    fn host(&self) -> &dyn BrowserHost {
        self.host.as_ref()
    }

    fn filter(&self) -> &PathFilter {
        &self.filter
    }

    fn auto_page_view(&self) {
        self.track_page_view(ViewArgs::default(), true);
    }

    fn captured_event(&self, capture: ClickCapture) {
        let ClickCapture { name, path, props } = capture;
        let args = match path {
            Some(path) => Some(PathOrProps::Path(path)),
            None => props.clone().map(PathOrProps::Props),
        };
        self.event(&name, args, props);
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.wiring.get_mut().uninstall(self.host.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerOptions;
    use crate::host::memory::MemoryHost;
    use stonks_core_types::TransportKind;
    use stonks_event_bus::InMemoryBus;

    fn start(host: &MemoryHost, options: TrackerOptions) -> Rc<Tracker> {
        let shared: Rc<dyn BrowserHost> = Rc::new(host.clone());
        Tracker::start_with_outcomes(shared, TrackerConfig::resolve(options), InMemoryBus::new(8))
    }

    fn manual() -> TrackerOptions {
        TrackerOptions {
            autocollect: Some(false),
            ..Default::default()
        }
    }

    fn page_views(host: &MemoryHost) -> usize {
        host.requests()
            .iter()
            .filter(|r| r.transport() == TransportKind::Beacon)
            .filter(|r| r.envelope().is_some_and(|e| e["e"][0]["t"] == "PageView"))
            .count()
    }

    #[test]
    fn explicit_view_is_deduplicated() {
        let host = MemoryHost::new("https://example.com/docs");
        let tracker = start(&host, manual());
        tracker.view(None, None);
        tracker.view(None, None);
        assert_eq!(page_views(&host), 1);
        assert_eq!(tracker.last_tracked_path().as_deref(), Some("/docs"));

        tracker.view(Some("/other".into()), None);
        assert_eq!(page_views(&host), 2);
    }

    #[test]
    fn hash_routing_disables_dedup() {
        let host = MemoryHost::new("https://example.com/app");
        let tracker = start(
            &host,
            TrackerOptions {
                hash_routing: Some(true),
                ..manual()
            },
        );
        tracker.track_page_view(ViewArgs::default(), true);
        tracker.track_page_view(ViewArgs::default(), true);
        assert_eq!(page_views(&host), 2);
    }

    #[test]
    fn path_filter_applies_to_automatic_views_only() {
        let host = MemoryHost::new("https://example.com/admin/users");
        let tracker = start(
            &host,
            TrackerOptions {
                exclude_pages: Some(vec!["/admin/*".into()]),
                include_pages: Some(vec!["/admin/*".into()]),
                ..manual()
            },
        );
        tracker.track_page_view(ViewArgs::default(), true);
        assert_eq!(page_views(&host), 0);
        assert_eq!(tracker.last_tracked_path(), None);

        tracker.view(None, None);
        assert_eq!(page_views(&host), 1);
    }

    #[test]
    fn cursor_moves_even_when_environment_suppresses() {
        let host = MemoryHost::new("http://localhost:3000/");
        let tracker = start(&host, manual());
        tracker.view(None, None);
        assert!(host.requests().is_empty());
        assert_eq!(tracker.last_tracked_path().as_deref(), Some("/"));
    }

    #[test]
    fn event_carries_props_and_utm_only_on_page_views() {
        let host = MemoryHost::new("https://example.com/pricing?utm_source=news");
        let tracker = start(&host, manual());
        let mut props = Props::new();
        props.insert("plan".into(), "pro".into());
        tracker.event("upgrade", Some(props.into()), None);
        tracker.view(None, None);

        let beacons: Vec<_> = host
            .requests()
            .iter()
            .filter(|r| r.transport() == TransportKind::Beacon)
            .filter_map(|r| r.envelope())
            .collect();
        assert_eq!(beacons.len(), 2);
        assert_eq!(beacons[0]["e"][0]["t"], "upgrade");
        assert_eq!(beacons[0]["e"][0]["p"]["plan"], "pro");
        assert!(beacons[0].get("qs").is_none());
        assert_eq!(beacons[1]["qs"]["utm_source"], "news");
    }

    #[test]
    fn path_markers_resolve_page_path() {
        let host = MemoryHost::new("https://example.com/p/42");
        host.set_body_attribute("data-s-path", "/p/:id");
        let tracker = start(
            &host,
            TrackerOptions {
                path_markers: Some(true),
                ..manual()
            },
        );
        tracker.view(None, None);
        assert_eq!(tracker.last_tracked_path().as_deref(), Some("/p/:id"));
        let sent = host.requests()[0].payload().unwrap();
        assert!(sent.contains("https://example.com/p/:id"), "{sent}");
    }

    #[test]
    fn dropping_tracker_detaches_listeners() {
        let host = MemoryHost::new("https://example.com/");
        let tracker = start(&host, TrackerOptions::default());
        assert!(tracker.autocollect_installed());
        assert_eq!(host.listener_count(), 5);
        drop(tracker);
        assert_eq!(host.listener_count(), 0);
        assert!(!host.push_state_intercepted());
    }
}
