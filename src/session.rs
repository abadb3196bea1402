//! Document-wide session and the public call surface.
//!
//! Exactly one [`Tracker`] is active per UI thread. It is reachable only
//! through the free functions below. `cleanup` retires its autocollect wiring
//! but keeps the tracker, so explicit calls keep the configured options until
//! a later `configure` replaces it.

use std::cell::RefCell;
use std::rc::Rc;

use stonks_core_types::{DeliveryOutcome, PathOrProps, Props};
use stonks_event_bus::{outcome_bus, EventBus};
use tokio::sync::broadcast;

use crate::config::{TrackerConfig, TrackerOptions};
use crate::environment::is_client;
use crate::host::BrowserHost;
use crate::tracker::Tracker;

struct Session {
    tracker: Rc<Tracker>,
    retired: bool,
}

thread_local! {
    static SESSION: RefCell<Option<Session>> = const { RefCell::new(None) };
}

fn current() -> Option<Rc<Tracker>> {
    SESSION.with(|slot| slot.borrow().as_ref().map(|session| Rc::clone(&session.tracker)))
}

/// Session for calls made before `configure`: started lazily with defaults
/// when the ambient browser is reachable. A retired session is reused as is.
fn current_or_ambient() -> Option<Rc<Tracker>> {
    if let Some(tracker) = current() {
        return Some(tracker);
    }
    let host = ambient_host()?;
    configure(host, TrackerOptions::default());
    current()
}

#[cfg(all(feature = "web", target_arch = "wasm32"))]
fn ambient_host() -> Option<Rc<dyn BrowserHost>> {
    crate::web::WebHost::from_window().map(|host| Rc::new(host) as Rc<dyn BrowserHost>)
}

#[cfg(not(all(feature = "web", target_arch = "wasm32")))]
fn ambient_host() -> Option<Rc<dyn BrowserHost>> {
    None
}

/// Starts the session for this document. A second call while a session is
/// active is ignored; a session retired by `cleanup` is replaced. Outside a
/// browser nothing is installed.
pub fn configure(host: Rc<dyn BrowserHost>, options: TrackerOptions) {
    if is_configured() {
        tracing::debug!("tracker already configured, ignoring new options");
        return;
    }
    if !is_client(host.as_ref()) {
        tracing::warn!("running in a non-browser environment, tracker stays inactive");
        return;
    }
    let tracker = Tracker::start(host, TrackerConfig::resolve(options));
    let replaced = SESSION.with(|slot| {
        let mut slot = slot.borrow_mut();
        match slot.as_ref() {
            Some(session) if !session.retired => None,
            _ => slot.replace(Session {
                tracker,
                retired: false,
            }),
        }
    });
    drop(replaced);
}

pub fn event(name: &str, path_or_props: Option<PathOrProps>, props: Option<Props>) {
    match current_or_ambient() {
        Some(tracker) => tracker.event(name, path_or_props, props),
        None => tracing::debug!(event = name, "no active tracker, event dropped"),
    }
}

pub fn view(path_or_props: Option<PathOrProps>, props: Option<Props>) {
    match current_or_ambient() {
        Some(tracker) => tracker.view(path_or_props, props),
        None => tracing::debug!("no active tracker, page view dropped"),
    }
}

/// Uninstalls autocollect and resets the dedup cursor. Explicit calls keep
/// working with the configured options. Safe to call repeatedly.
pub fn cleanup() {
    let tracker = SESSION.with(|slot| {
        slot.borrow_mut().as_mut().map(|session| {
            session.retired = true;
            Rc::clone(&session.tracker)
        })
    });
    if let Some(tracker) = tracker {
        tracker.cleanup();
    }
}

/// Whether a session is configured and not yet cleaned up.
pub fn is_configured() -> bool {
    SESSION.with(|slot| slot.borrow().as_ref().is_some_and(|session| !session.retired))
}

/// Receiver for per-attempt delivery outcomes of every session.
pub fn subscribe_outcomes() -> broadcast::Receiver<DeliveryOutcome> {
    outcome_bus().subscribe()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryHost;

    fn shared(host: &MemoryHost) -> Rc<dyn BrowserHost> {
        Rc::new(host.clone())
    }

    #[test]
    fn second_configure_is_ignored() {
        let host = MemoryHost::new("https://example.com/");
        configure(shared(&host), TrackerOptions::default());
        let other = MemoryHost::new("https://other.example/");
        configure(shared(&other), TrackerOptions::default());

        assert!(is_configured());
        assert_eq!(host.listener_count(), 5);
        assert_eq!(other.listener_count(), 0);
        cleanup();
        assert!(!is_configured());
        assert_eq!(host.listener_count(), 0);
    }

    #[test]
    fn non_client_configure_leaves_no_session() {
        configure(shared(&MemoryHost::detached()), TrackerOptions::default());
        assert!(!is_configured());
        event("click", None, None);
        cleanup();
    }

    #[test]
    fn explicit_calls_after_cleanup_keep_configured_collector() {
        let host = MemoryHost::new("https://example.com/");
        configure(
            shared(&host),
            TrackerOptions {
                collector_url: Some("https://tenant.example/events".into()),
                ..Default::default()
            },
        );
        cleanup();
        host.take_requests();

        event("after", None, None);
        let sent = host.take_requests();
        assert!(!sent.is_empty());
        assert!(sent.iter().all(|request| request.url().starts_with("https://tenant.example/events")));
        assert_eq!(host.listener_count(), 0);
        assert!(!is_configured());
    }

    #[test]
    fn configure_after_cleanup_replaces_session() {
        let host = MemoryHost::new("https://example.com/");
        configure(shared(&host), TrackerOptions::default());
        cleanup();
        let next = MemoryHost::new("https://next.example/");
        configure(shared(&next), TrackerOptions::default());

        assert!(is_configured());
        assert_eq!(host.listener_count(), 0);
        assert_eq!(next.listener_count(), 5);
        cleanup();
    }

    #[test]
    fn calls_without_session_are_noops() {
        event("click", None, None);
        view(Some("/x".into()), None);
        cleanup();
        cleanup();
        assert!(!is_configured());
    }
}
