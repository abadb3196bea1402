//! Browser host backed by `web-sys`, plus the JavaScript entry points.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use js_sys::{Function, Promise, Reflect, JSON};
use stonks_core_types::{PathOrProps, Props};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{Document, Element, Event, EventTarget, Headers, MouseEvent, RequestInit, VisibilityState, Window};

use crate::config::TrackerOptions;
use crate::errors::{TrackerError, TrackerResult};
use crate::host::{
    BeaconStatus, DomElement, EventWiring, Handler, HostEvent, ListenerId, ListenerKind, PageContext,
    PushStateRestore, SettleCallback, Transport,
};
use crate::session;

type Listener = (ListenerKind, Closure<dyn FnMut(Event)>);

pub struct WebHost {
    window: Window,
    document: Document,
    listeners: RefCell<HashMap<ListenerId, Listener>>,
    next_listener: Cell<u64>,
}

impl WebHost {
    /// `None` outside a browsing context (workers, server-side rendering).
    pub fn from_window() -> Option<Self> {
        let window = web_sys::window()?;
        let document = window.document()?;
        Some(Self {
            window,
            document,
            listeners: RefCell::new(HashMap::new()),
            next_listener: Cell::new(1),
        })
    }

    fn target(&self, kind: ListenerKind) -> &EventTarget {
        if kind.on_document() {
            self.document.as_ref()
        } else {
            self.window.as_ref()
        }
    }
}

fn js_error(value: &JsValue) -> String {
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

fn host_error(context: &str, value: JsValue) -> TrackerError {
    TrackerError::host(format!("{context}: {}", js_error(&value)))
}

impl PageContext for WebHost {
    fn has_document(&self) -> bool {
        true
    }

    fn user_agent(&self) -> Option<String> {
        self.window.navigator().user_agent().ok()
    }

    fn href(&self) -> Option<String> {
        self.window.location().href().ok()
    }

    fn referrer(&self) -> String {
        self.document.referrer()
    }

    fn is_visible(&self) -> bool {
        self.document.visibility_state() == VisibilityState::Visible
    }

    fn webdriver(&self) -> bool {
        Reflect::get(&self.window.navigator(), &JsValue::from_str("webdriver"))
            .map(|value| value.is_truthy())
            .unwrap_or(false)
    }

    fn global_is_truthy(&self, name: &str) -> bool {
        Reflect::get(&self.window, &JsValue::from_str(name))
            .map(|value| value.is_truthy())
            .unwrap_or(false)
    }

    fn body_attribute(&self, name: &str) -> Option<String> {
        self.document.body()?.get_attribute(name)
    }

    fn meta_content(&self, name: &str) -> Option<String> {
        let selector = format!("meta[name='{name}']");
        self.document
            .query_selector(&selector)
            .ok()
            .flatten()?
            .get_attribute("content")
    }
}

/// Reports the outcome of `promise` to `on_settled` once it settles.
fn settle_when(promise: Promise, on_settled: SettleCallback, describe: fn(JsValue) -> String) {
    spawn_local(async move {
        let result = JsFuture::from(promise).await.map(|_| ()).map_err(describe);
        on_settled(result);
    });
}

impl Transport for WebHost {
    fn load_image(&self, url: &str, on_settled: SettleCallback) -> TrackerResult<()> {
        let image = web_sys::HtmlImageElement::new_with_width_and_height(1, 1)
            .map_err(|err| host_error("Image", err))?;
        let loaded = Promise::new(&mut |resolve, reject| {
            image.set_onload(Some(&resolve));
            image.set_onerror(Some(&reject));
        });
        image.set_src(url);
        settle_when(loaded, on_settled, |_| "image failed to load".to_string());
        Ok(())
    }

    fn send_beacon(&self, url: &str, body: &str) -> BeaconStatus {
        match self.window.navigator().send_beacon_with_opt_str(url, Some(body)) {
            Ok(true) => BeaconStatus::Queued,
            Ok(false) => BeaconStatus::Declined,
            Err(_) => BeaconStatus::Unavailable,
        }
    }

    fn fetch_keepalive(&self, url: &str, body: &str, on_settled: SettleCallback) -> TrackerResult<()> {
        let headers = Headers::new().map_err(|err| host_error("Headers", err))?;
        headers
            .set("Content-Type", "application/json")
            .map_err(|err| host_error("Headers.set", err))?;

        let init = RequestInit::new();
        init.set_method("POST");
        init.set_body(&JsValue::from_str(body));
        init.set_keepalive(true);
        init.set_headers(&headers);

        let request = self.window.fetch_with_str_and_init(url, &init);
        settle_when(request, on_settled, |err| js_error(&err));
        Ok(())
    }
}

struct WebElement(Element);

impl DomElement for WebElement {
    fn tag_name(&self) -> String {
        self.0.tag_name()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.0.get_attribute(name)
    }

    fn parent(&self) -> Option<Rc<dyn DomElement>> {
        self.0
            .parent_element()
            .map(|parent| Rc::new(WebElement(parent)) as Rc<dyn DomElement>)
    }
}

fn to_host_event(kind: ListenerKind, event: &Event) -> HostEvent {
    let button = event
        .dyn_ref::<MouseEvent>()
        .map(MouseEvent::button)
        .unwrap_or(0);
    let target = event
        .target()
        .and_then(|target| target.dyn_into::<Element>().ok())
        .map(|element| Rc::new(WebElement(element)) as Rc<dyn DomElement>);
    HostEvent { kind, button, target }
}

impl EventWiring for WebHost {
    fn add_listener(&self, kind: ListenerKind, handler: Handler) -> TrackerResult<ListenerId> {
        let callback = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            handler(&to_host_event(kind, &event));
        });
        self.target(kind)
            .add_event_listener_with_callback(kind.event_type(), callback.as_ref().unchecked_ref())
            .map_err(|err| host_error("addEventListener", err))?;

        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().insert(id, (kind, callback));
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        let Some((kind, callback)) = self.listeners.borrow_mut().remove(&id) else {
            return;
        };
        if let Err(err) = self
            .target(kind)
            .remove_event_listener_with_callback(kind.event_type(), callback.as_ref().unchecked_ref())
        {
            tracing::warn!(error = %js_error(&err), kind = kind.event_type(), "removeEventListener failed");
        }
    }

    fn intercept_push_state(&self, after_push: Rc<dyn Fn()>) -> TrackerResult<PushStateRestore> {
        let history = self
            .window
            .history()
            .map_err(|err| host_error("history", err))?;
        let key = JsValue::from_str("pushState");
        let original: Function = Reflect::get(&history, &key)
            .map_err(|err| host_error("history.pushState", err))?
            .dyn_into()
            .map_err(|_| TrackerError::HostUnavailable("history.pushState"))?;

        let target = history.clone();
        let delegate = original.clone();
        let wrapper = Closure::<dyn FnMut(JsValue, JsValue, JsValue) -> Result<(), JsValue>>::new(
            move |state: JsValue, unused: JsValue, url: JsValue| {
                delegate.call3(&target, &state, &unused, &url)?;
                after_push();
                Ok(())
            },
        );
        Reflect::set(&history, &key, wrapper.as_ref())
            .map_err(|err| host_error("history.pushState", err))?;

        Ok(Box::new(move || {
            if let Err(err) = Reflect::set(&history, &key, &original) {
                tracing::warn!(error = %js_error(&err), "could not restore history.pushState");
            }
            drop(wrapper);
        }))
    }

    fn request_animation_frame(&self, callback: Box<dyn FnOnce()>) {
        let frame = Closure::once_into_js(move || callback());
        if let Err(err) = self.window.request_animation_frame(frame.unchecked_ref()) {
            tracing::warn!(error = %js_error(&err), "requestAnimationFrame failed");
        }
    }
}

fn json_of(value: &JsValue) -> Option<String> {
    if value.is_undefined() || value.is_null() {
        return None;
    }
    JSON::stringify(value).ok().and_then(|json| json.as_string())
}

/// Flattens a JS object into string props; non-string values keep their JSON form.
fn props_from_js(value: &JsValue) -> Option<Props> {
    if !value.is_object() {
        return None;
    }
    let json = json_of(value)?;
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&json).ok()?;
    Some(
        object
            .into_iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(text) => (key, text),
                other => (key, other.to_string()),
            })
            .collect(),
    )
}

fn path_or_props_from_js(value: &JsValue) -> Option<PathOrProps> {
    if let Some(path) = value.as_string() {
        return Some(PathOrProps::Path(path));
    }
    props_from_js(value).map(PathOrProps::Props)
}

#[wasm_bindgen(js_name = configure)]
pub fn js_configure(options: JsValue) {
    stonks_observe::init_tracing();
    let options = match json_of(&options).map(|json| TrackerOptions::from_json_str(&json)) {
        Some(Ok(options)) => options,
        Some(Err(err)) => {
            tracing::warn!(error = %err, "invalid tracker options, using defaults");
            TrackerOptions::default()
        }
        None => TrackerOptions::default(),
    };
    match WebHost::from_window() {
        Some(host) => session::configure(Rc::new(host), options),
        None => tracing::warn!("running in a non-browser environment, tracker stays inactive"),
    }
}

#[wasm_bindgen(js_name = event)]
pub fn js_event(name: String, path_or_props: JsValue, props: JsValue) {
    stonks_observe::init_tracing();
    session::event(&name, path_or_props_from_js(&path_or_props), props_from_js(&props));
}

#[wasm_bindgen(js_name = view)]
pub fn js_view(path_or_props: JsValue, props: JsValue) {
    stonks_observe::init_tracing();
    session::view(path_or_props_from_js(&path_or_props), props_from_js(&props));
}

#[wasm_bindgen(js_name = cleanup)]
pub fn js_cleanup() {
    session::cleanup();
}
