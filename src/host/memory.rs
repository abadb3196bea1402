//! Simulated document used by the test-suite and the CLI dry run.
//!
//! Navigation, visibility and clicks are driven explicitly; every transport
//! call is recorded instead of hitting the network.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use stonks_core_types::TransportKind;
use url::Url;

use super::{
    BeaconStatus, DomElement, EventWiring, Handler, HostEvent, ListenerId, ListenerKind,
    PageContext, PushStateRestore, SettleCallback, Transport,
};
use crate::errors::{TrackerError, TrackerResult};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// A request issued through one of the transports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Image { url: String },
    Beacon { url: String, body: String },
    Fetch { url: String, body: String },
}

impl Request {
    pub fn transport(&self) -> TransportKind {
        match self {
            Request::Image { .. } => TransportKind::ImageBeacon,
            Request::Beacon { .. } => TransportKind::Beacon,
            Request::Fetch { .. } => TransportKind::Fetch,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Request::Image { url } | Request::Beacon { url, .. } | Request::Fetch { url, .. } => {
                url.as_str()
            }
        }
    }

    /// Serialized envelope carried by the request, decoding the `data` query
    /// parameter for image beacons.
    pub fn payload(&self) -> Option<String> {
        match self {
            Request::Beacon { body, .. } | Request::Fetch { body, .. } => Some(body.clone()),
            Request::Image { url } => {
                let parsed = Url::parse(url).ok()?;
                let (_, encoded) = parsed.query_pairs().find(|(key, _)| key == "data")?;
                let bytes = Base64.decode(encoded.as_bytes()).ok()?;
                String::from_utf8(bytes).ok()
            }
        }
    }

    pub fn envelope(&self) -> Option<serde_json::Value> {
        self.payload()
            .and_then(|payload| serde_json::from_str(&payload).ok())
    }
}

struct MemoryState {
    has_document: bool,
    user_agent: String,
    href: String,
    referrer: String,
    visible: bool,
    webdriver: bool,
    globals: BTreeSet<String>,
    body_attributes: BTreeMap<String, String>,
    meta: BTreeMap<String, String>,
    requests: Vec<Request>,
    image_fails: bool,
    beacon: BeaconStatus,
    fetch_fails: bool,
    next_listener: u64,
    listeners: Vec<(ListenerId, ListenerKind, Handler)>,
    push_hook: Option<Rc<dyn Fn()>>,
    frames: VecDeque<Box<dyn FnOnce()>>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            has_document: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            href: "https://example.com/".to_string(),
            referrer: String::new(),
            visible: true,
            webdriver: false,
            globals: BTreeSet::new(),
            body_attributes: BTreeMap::new(),
            meta: BTreeMap::new(),
            requests: Vec::new(),
            image_fails: false,
            beacon: BeaconStatus::Queued,
            fetch_fails: false,
            next_listener: 1,
            listeners: Vec::new(),
            push_hook: None,
            frames: VecDeque::new(),
        }
    }
}

/// Cheaply cloneable handle; clones share the same document.
#[derive(Clone, Default)]
pub struct MemoryHost {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryHost {
    pub fn new(href: impl Into<String>) -> Self {
        let host = Self::default();
        host.state.borrow_mut().href = href.into();
        host
    }

    /// A host with no window/document, as during server-side rendering.
    pub fn detached() -> Self {
        let host = Self::default();
        host.state.borrow_mut().has_document = false;
        host
    }

    pub fn set_href(&self, href: impl Into<String>) {
        self.state.borrow_mut().href = href.into();
    }

    pub fn set_referrer(&self, referrer: impl Into<String>) {
        self.state.borrow_mut().referrer = referrer.into();
    }

    pub fn set_user_agent(&self, user_agent: impl Into<String>) {
        self.state.borrow_mut().user_agent = user_agent.into();
    }

    pub fn set_webdriver(&self, webdriver: bool) {
        self.state.borrow_mut().webdriver = webdriver;
    }

    pub fn set_global(&self, name: impl Into<String>) {
        self.state.borrow_mut().globals.insert(name.into());
    }

    pub fn set_body_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        self.state
            .borrow_mut()
            .body_attributes
            .insert(name.into(), value.into());
    }

    pub fn set_meta(&self, name: impl Into<String>, content: impl Into<String>) {
        self.state.borrow_mut().meta.insert(name.into(), content.into());
    }

    pub fn set_image_fails(&self, fails: bool) {
        self.state.borrow_mut().image_fails = fails;
    }

    pub fn set_beacon_status(&self, status: BeaconStatus) {
        self.state.borrow_mut().beacon = status;
    }

    pub fn set_fetch_fails(&self, fails: bool) {
        self.state.borrow_mut().fetch_fails = fails;
    }

    /// Changes visibility and fires `visibilitychange` if it actually changed.
    pub fn set_visible(&self, visible: bool) {
        let changed = {
            let mut state = self.state.borrow_mut();
            let changed = state.visible != visible;
            state.visible = visible;
            changed
        };
        if changed {
            self.dispatch(&HostEvent::signal(ListenerKind::VisibilityChange));
        }
    }

    /// Application-driven `history.pushState(null, "", url)`.
    pub fn push_state(&self, url: &str) -> TrackerResult<()> {
        let hook = {
            let mut state = self.state.borrow_mut();
            let next = Url::parse(&state.href)?.join(url)?;
            state.href = next.to_string();
            state.push_hook.clone()
        };
        if let Some(hook) = hook {
            hook();
        }
        Ok(())
    }

    /// Back/forward navigation to `url`.
    pub fn pop_state(&self, url: &str) -> TrackerResult<()> {
        {
            let mut state = self.state.borrow_mut();
            let next = Url::parse(&state.href)?.join(url)?;
            state.href = next.to_string();
        }
        self.dispatch(&HostEvent::signal(ListenerKind::PopState));
        Ok(())
    }

    pub fn set_hash(&self, fragment: &str) -> TrackerResult<()> {
        {
            let mut state = self.state.borrow_mut();
            let mut next = Url::parse(&state.href)?;
            next.set_fragment(Some(fragment.trim_start_matches('#')));
            state.href = next.to_string();
        }
        self.dispatch(&HostEvent::signal(ListenerKind::HashChange));
        Ok(())
    }

    pub fn click(&self, target: &Rc<MemoryElement>) {
        let target: Rc<dyn DomElement> = target.clone();
        self.dispatch(&HostEvent::click(target));
    }

    pub fn aux_click(&self, target: &Rc<MemoryElement>, button: i16) {
        let target: Rc<dyn DomElement> = target.clone();
        self.dispatch(&HostEvent::aux_click(target, button));
    }

    /// Runs every queued animation-frame callback, including ones queued while running.
    pub fn run_animation_frames(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.state.borrow_mut().frames.pop_front();
            match next {
                Some(callback) => {
                    callback();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.borrow().requests.clone()
    }

    pub fn take_requests(&self) -> Vec<Request> {
        std::mem::take(&mut self.state.borrow_mut().requests)
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    pub fn push_state_intercepted(&self) -> bool {
        self.state.borrow().push_hook.is_some()
    }

    fn dispatch(&self, event: &HostEvent) {
        let handlers: Vec<Handler> = self
            .state
            .borrow()
            .listeners
            .iter()
            .filter(|(_, kind, _)| *kind == event.kind)
            .map(|(_, _, handler)| Rc::clone(handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}

impl PageContext for MemoryHost {
    fn has_document(&self) -> bool {
        self.state.borrow().has_document
    }

    fn user_agent(&self) -> Option<String> {
        Some(self.state.borrow().user_agent.clone())
    }

    fn href(&self) -> Option<String> {
        let state = self.state.borrow();
        state.has_document.then(|| state.href.clone())
    }

    fn referrer(&self) -> String {
        self.state.borrow().referrer.clone()
    }

    fn is_visible(&self) -> bool {
        self.state.borrow().visible
    }

    fn webdriver(&self) -> bool {
        self.state.borrow().webdriver
    }

    fn global_is_truthy(&self, name: &str) -> bool {
        self.state.borrow().globals.contains(name)
    }

    fn body_attribute(&self, name: &str) -> Option<String> {
        self.state.borrow().body_attributes.get(name).cloned()
    }

    fn meta_content(&self, name: &str) -> Option<String> {
        self.state.borrow().meta.get(name).cloned()
    }
}

impl Transport for MemoryHost {
    fn load_image(&self, url: &str, on_settled: SettleCallback) -> TrackerResult<()> {
        let fails = {
            let mut state = self.state.borrow_mut();
            state.requests.push(Request::Image {
                url: url.to_string(),
            });
            state.image_fails
        };
        on_settled(if fails {
            Err("image failed to load".to_string())
        } else {
            Ok(())
        });
        Ok(())
    }

    fn send_beacon(&self, url: &str, body: &str) -> BeaconStatus {
        let mut state = self.state.borrow_mut();
        if state.beacon == BeaconStatus::Queued {
            state.requests.push(Request::Beacon {
                url: url.to_string(),
                body: body.to_string(),
            });
        }
        state.beacon
    }

    fn fetch_keepalive(
        &self,
        url: &str,
        body: &str,
        on_settled: SettleCallback,
    ) -> TrackerResult<()> {
        let fails = {
            let mut state = self.state.borrow_mut();
            state.requests.push(Request::Fetch {
                url: url.to_string(),
                body: body.to_string(),
            });
            state.fetch_fails
        };
        on_settled(if fails {
            Err("Failed to fetch".to_string())
        } else {
            Ok(())
        });
        Ok(())
    }
}

impl EventWiring for MemoryHost {
    fn add_listener(&self, kind: ListenerKind, handler: Handler) -> TrackerResult<ListenerId> {
        let mut state = self.state.borrow_mut();
        if !state.has_document {
            return Err(TrackerError::HostUnavailable("document"));
        }
        let id = ListenerId(state.next_listener);
        state.next_listener += 1;
        state.listeners.push((id, kind, handler));
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.state
            .borrow_mut()
            .listeners
            .retain(|(existing, _, _)| *existing != id);
    }

    fn intercept_push_state(&self, after_push: Rc<dyn Fn()>) -> TrackerResult<PushStateRestore> {
        self.state.borrow_mut().push_hook = Some(after_push);
        let state = Rc::clone(&self.state);
        Ok(Box::new(move || {
            state.borrow_mut().push_hook = None;
        }))
    }

    fn request_animation_frame(&self, callback: Box<dyn FnOnce()>) {
        self.state.borrow_mut().frames.push_back(callback);
    }
}

/// Detached element tree node for click-capture tests.
#[derive(Debug, Clone)]
pub struct MemoryElement {
    tag: String,
    attributes: BTreeMap<String, String>,
    parent: Option<Rc<MemoryElement>>,
}

impl MemoryElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_uppercase(),
            attributes: BTreeMap::new(),
            parent: None,
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn inside(mut self, parent: &Rc<MemoryElement>) -> Self {
        self.parent = Some(Rc::clone(parent));
        self
    }

    pub fn build(self) -> Rc<Self> {
        Rc::new(self)
    }
}

impl DomElement for MemoryElement {
    fn tag_name(&self) -> String {
        self.tag.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    fn parent(&self) -> Option<Rc<dyn DomElement>> {
        self.parent
            .as_ref()
            .map(|parent| Rc::clone(parent) as Rc<dyn DomElement>)
    }
}
