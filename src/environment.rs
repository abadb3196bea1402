//! Environment probes. Evaluated fresh on every call, never cached.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::host::PageContext;

static NON_BROWSER_AGENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)node|jsdom").expect("static regex"));

static LOCALHOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^localhost$|^127(\.[0-9]+){0,2}\.[0-9]+$|^\[::1?\]$").expect("static regex")
});

/// Globals injected by automation tools.
const AUTOMATION_GLOBALS: [&str; 3] = ["_phantom", "__nightmare", "Cypress"];

/// True in a real browser: window and document exist and the user agent is
/// not a server-side or test runtime.
pub fn is_client<P: PageContext + ?Sized>(page: &P) -> bool {
    if !page.has_document() {
        return false;
    }
    let agent = page.user_agent().unwrap_or_default();
    !NON_BROWSER_AGENT.is_match(&agent)
}

pub fn is_localhost<P: PageContext + ?Sized>(page: &P) -> bool {
    let Some(location) = page.location() else {
        return false;
    };
    if location.scheme() == "file" {
        return true;
    }
    location
        .host_str()
        .map(|host| LOCALHOST.is_match(host))
        .unwrap_or(false)
}

pub fn is_headless_browser<P: PageContext + ?Sized>(page: &P) -> bool {
    page.webdriver()
        || AUTOMATION_GLOBALS
            .iter()
            .any(|name| page.global_is_truthy(name))
}

/// Snapshot of the probes taken at one decision point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Environment {
    pub is_localhost: bool,
    pub is_headless: bool,
}

impl Environment {
    pub fn probe<P: PageContext + ?Sized>(page: &P) -> Self {
        Self {
            is_localhost: is_localhost(page),
            is_headless: is_headless_browser(page),
        }
    }

    /// Localhost without an override, or any automated browser, sends nothing.
    pub fn suppresses(&self, localhost_override: Option<&str>) -> bool {
        (self.is_localhost && localhost_override.is_none()) || self.is_headless
    }
}
