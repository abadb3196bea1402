//! Browser abstraction.
//!
//! Everything the tracker needs from the page goes through [`BrowserHost`]:
//! location and environment queries, the three delivery transports, and the
//! listener/navigation hooks used by autocollect. `web` provides the web-sys
//! implementation, [`memory::MemoryHost`] a simulated document.

pub mod memory;

use std::fmt;
use std::rc::Rc;

use url::Url;

use crate::errors::TrackerResult;

/// Read-only view of the current document and its environment.
pub trait PageContext {
    /// True when both a window and a document exist.
    fn has_document(&self) -> bool;
    fn user_agent(&self) -> Option<String>;
    fn href(&self) -> Option<String>;
    /// Raw `document.referrer`; empty when there is none.
    fn referrer(&self) -> String;
    fn is_visible(&self) -> bool;
    /// `navigator.webdriver`.
    fn webdriver(&self) -> bool;
    /// Whether `window[name]` exists and is truthy.
    fn global_is_truthy(&self, name: &str) -> bool;
    fn body_attribute(&self, name: &str) -> Option<String>;
    /// `content` of `<meta name="...">`.
    fn meta_content(&self, name: &str) -> Option<String>;

    fn location(&self) -> Option<Url> {
        self.href().and_then(|href| Url::parse(&href).ok())
    }

    fn pathname(&self) -> String {
        self.location()
            .map(|url| url.path().to_string())
            .unwrap_or_else(|| "/".to_string())
    }

    fn search(&self) -> String {
        self.location()
            .and_then(|url| url.query().map(str::to_string))
            .unwrap_or_default()
    }
}

/// Answer from `navigator.sendBeacon`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BeaconStatus {
    Queued,
    Declined,
    Unavailable,
}

/// Invoked at most once when an asynchronous request settles. It may never
/// run at all (a slow image load has no failure signal).
pub type SettleCallback = Box<dyn FnOnce(Result<(), String>)>;

/// Fire-and-forget delivery primitives. None of them report server receipt.
pub trait Transport {
    /// Loads `url` as a 1x1 image.
    fn load_image(&self, url: &str, on_settled: SettleCallback) -> TrackerResult<()>;
    fn send_beacon(&self, url: &str, body: &str) -> BeaconStatus;
    /// POSTs `body` as JSON with `keepalive`.
    fn fetch_keepalive(&self, url: &str, body: &str, on_settled: SettleCallback) -> TrackerResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    VisibilityChange,
    PopState,
    HashChange,
    Click,
    AuxClick,
}

impl ListenerKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            ListenerKind::VisibilityChange => "visibilitychange",
            ListenerKind::PopState => "popstate",
            ListenerKind::HashChange => "hashchange",
            ListenerKind::Click => "click",
            ListenerKind::AuxClick => "auxclick",
        }
    }

    /// Document-level listeners; the rest attach to the window.
    pub fn on_document(&self) -> bool {
        matches!(
            self,
            ListenerKind::VisibilityChange | ListenerKind::Click | ListenerKind::AuxClick
        )
    }
}

/// Element view used by the click-capture walk.
pub trait DomElement {
    fn tag_name(&self) -> String;
    fn attribute(&self, name: &str) -> Option<String>;
    fn parent(&self) -> Option<Rc<dyn DomElement>>;
}

/// Event delivered to a registered handler.
#[derive(Clone)]
pub struct HostEvent {
    pub kind: ListenerKind,
    /// `MouseEvent.button`; zero for non-pointer events.
    pub button: i16,
    pub target: Option<Rc<dyn DomElement>>,
}

impl HostEvent {
    pub fn signal(kind: ListenerKind) -> Self {
        Self {
            kind,
            button: 0,
            target: None,
        }
    }

    pub fn click(target: Rc<dyn DomElement>) -> Self {
        Self {
            kind: ListenerKind::Click,
            button: 0,
            target: Some(target),
        }
    }

    pub fn aux_click(target: Rc<dyn DomElement>, button: i16) -> Self {
        Self {
            kind: ListenerKind::AuxClick,
            button,
            target: Some(target),
        }
    }
}

impl fmt::Debug for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostEvent")
            .field("kind", &self.kind)
            .field("button", &self.button)
            .field("target", &self.target.as_ref().map(|t| t.tag_name()))
            .finish()
    }
}

pub type Handler = Rc<dyn Fn(&HostEvent)>;

/// Restores the original `history.pushState` when called.
pub type PushStateRestore = Box<dyn FnOnce()>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

pub trait EventWiring {
    fn add_listener(&self, kind: ListenerKind, handler: Handler) -> TrackerResult<ListenerId>;
    fn remove_listener(&self, id: ListenerId);
    /// Wraps `history.pushState` so `after_push` runs once the original returns.
    fn intercept_push_state(&self, after_push: Rc<dyn Fn()>) -> TrackerResult<PushStateRestore>;
    fn request_animation_frame(&self, callback: Box<dyn FnOnce()>);
}

pub trait BrowserHost: PageContext + Transport + EventWiring {}

impl<T> BrowserHost for T where T: PageContext + Transport + EventWiring + ?Sized {}
