//! Automatic page views and attribute-driven click capture.
//!
//! [`AutocollectWiring`] owns every listener handle and the `pushState`
//! restorer for one session. Handlers only hold a [`Weak`] reference to their
//! [`AutocollectSink`], so a dropped session never keeps the page alive and a
//! stale listener degrades to a no-op.

use std::rc::{Rc, Weak};

use stonks_core_types::Props;

use crate::environment::is_client;
use crate::errors::TrackerResult;
use crate::filter::PathFilter;
use crate::host::{BrowserHost, DomElement, HostEvent, ListenerId, ListenerKind, PushStateRestore};
use crate::props::parse_props;

const EVENT_ATTRS: [&str; 2] = ["data-s:event", "data-s-event"];
const PROPS_ATTRS: [&str; 2] = ["data-s:event-props", "data-s-event-props"];
const PATH_ATTRS: [&str; 2] = ["data-s:event-path", "data-s-event-path"];

/// Levels walked from the click target when it is not inside a link or button.
const MAX_WALK_DEPTH: usize = 3;
/// `MouseEvent.button` for the middle button.
const MIDDLE_BUTTON: i16 = 1;

/// Receiver of autocollect triggers; implemented by the tracker.
pub trait AutocollectSink {
    fn host(&self) -> &dyn BrowserHost;
    fn filter(&self) -> &PathFilter;
    /// Navigation-driven page view, subject to dedup and path filtering.
    fn auto_page_view(&self);
    fn captured_event(&self, capture: ClickCapture);
}

/// Custom event declared on the DOM through `data-s:event` attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClickCapture {
    pub name: String,
    pub path: Option<String>,
    pub props: Option<Props>,
}

/// Reads the capture attributes from the clicked element or its ancestors.
pub fn capture_click(event: &HostEvent) -> Option<ClickCapture> {
    if event.kind == ListenerKind::AuxClick && event.button != MIDDLE_BUTTON {
        return None;
    }
    let target = event.target.clone()?;
    let bounded = !inside_interactive(&target);

    let mut current = Some(target);
    let mut depth = 0;
    while let Some(element) = current {
        if let Some(name) = first_present(element.as_ref(), &EVENT_ATTRS).filter(|n| !n.is_empty()) {
            let props = first_present(element.as_ref(), &PROPS_ATTRS)
                .filter(|raw| !raw.is_empty())
                .map(|raw| parse_props(&raw));
            let path = PATH_ATTRS
                .iter()
                .filter_map(|attr| element.attribute(attr))
                .find(|value| !value.is_empty());
            return Some(ClickCapture { name, path, props });
        }

        current = element.parent();
        depth += 1;
        if bounded && depth >= MAX_WALK_DEPTH {
            break;
        }
    }
    None
}

/// First attribute in `names` that is present, even when empty.
fn first_present(element: &dyn DomElement, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| element.attribute(name))
}

/// `element.closest("a, button")` including the element itself.
fn inside_interactive(element: &Rc<dyn DomElement>) -> bool {
    let mut current = Some(Rc::clone(element));
    while let Some(node) = current {
        let tag = node.tag_name();
        if tag.eq_ignore_ascii_case("a") || tag.eq_ignore_ascii_case("button") {
            return true;
        }
        current = node.parent();
    }
    false
}

#[derive(Default)]
pub struct AutocollectWiring {
    installed: bool,
    listeners: Vec<ListenerId>,
    restore_push_state: Option<PushStateRestore>,
}

impl AutocollectWiring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Attaches the visibility, navigation and click listeners, then fires the
    /// initial page view when the document is already visible.
    pub fn install(&mut self, sink: Weak<dyn AutocollectSink>) -> TrackerResult<()> {
        if self.installed {
            return Ok(());
        }
        let Some(strong) = sink.upgrade() else {
            return Ok(());
        };
        let host = strong.host();
        if !is_client(host) {
            tracing::debug!("autocollect skipped outside a browser");
            return Ok(());
        }

        if let Err(err) = self.attach(host, &sink) {
            self.detach(host);
            return Err(err);
        }
        self.installed = true;
        tracing::debug!(listeners = self.listeners.len(), "autocollect installed");

        if host.is_visible() {
            strong.auto_page_view();
        }
        Ok(())
    }

    fn attach(&mut self, host: &dyn BrowserHost, sink: &Weak<dyn AutocollectSink>) -> TrackerResult<()> {
        let weak = sink.clone();
        self.listen(
            host,
            ListenerKind::VisibilityChange,
            Rc::new(move |_: &HostEvent| {
                if let Some(sink) = weak.upgrade() {
                    if sink.host().is_visible() {
                        sink.auto_page_view();
                    }
                }
            }),
        )?;

        let weak = sink.clone();
        let restore = host.intercept_push_state(Rc::new(move || {
            let Some(sink) = weak.upgrade() else {
                return;
            };
            let deferred = weak.clone();
            sink.host().request_animation_frame(Box::new(move || {
                if let Some(sink) = deferred.upgrade() {
                    sink.auto_page_view();
                }
            }));
        }))?;
        self.restore_push_state = Some(restore);

        for kind in [ListenerKind::PopState, ListenerKind::HashChange] {
            let weak = sink.clone();
            self.listen(
                host,
                kind,
                Rc::new(move |_: &HostEvent| {
                    if let Some(sink) = weak.upgrade() {
                        sink.auto_page_view();
                    }
                }),
            )?;
        }

        let weak = sink.clone();
        let on_click: Rc<dyn Fn(&HostEvent)> = Rc::new(move |event: &HostEvent| {
            if let Some(sink) = weak.upgrade() {
                handle_click(sink.as_ref(), event);
            }
        });
        self.listen(host, ListenerKind::Click, Rc::clone(&on_click))?;
        self.listen(host, ListenerKind::AuxClick, on_click)?;
        Ok(())
    }

    fn listen(
        &mut self,
        host: &dyn BrowserHost,
        kind: ListenerKind,
        handler: Rc<dyn Fn(&HostEvent)>,
    ) -> TrackerResult<()> {
        let id = host.add_listener(kind, handler)?;
        self.listeners.push(id);
        Ok(())
    }

    /// Removes every listener and restores `pushState`. No-op when not installed.
    pub fn uninstall(&mut self, host: &dyn BrowserHost) {
        if !self.installed {
            return;
        }
        self.detach(host);
        self.installed = false;
        tracing::debug!("autocollect uninstalled");
    }

    fn detach(&mut self, host: &dyn BrowserHost) {
        for id in self.listeners.drain(..) {
            host.remove_listener(id);
        }
        if let Some(restore) = self.restore_push_state.take() {
            restore();
        }
    }
}

fn handle_click(sink: &dyn AutocollectSink, event: &HostEvent) {
    let Some(capture) = capture_click(event) else {
        return;
    };
    let filter = sink.filter();
    let override_blocked = capture
        .path
        .as_deref()
        .is_some_and(|path| !filter.allows(path));
    let current = sink.host().pathname();
    if override_blocked || !filter.allows(&current) {
        tracing::debug!(event = %capture.name, path = %current, "click capture blocked by path filter");
        return;
    }
    sink.captured_event(capture);
}
