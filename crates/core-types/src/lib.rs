//! Shared primitives for the Stonks tracker.
//!
//! Field names on the wire types are intentionally one or two letters long: the
//! collector accepts the minimised shape only, and every byte counts against the
//! image-beacon URL budget.

use std::collections::BTreeMap;
use std::fmt;

/// Reserved event type for automatic and explicit page views.
pub const PAGE_VIEW: &str = "PageView";

/// Flat key/value annotations attached to an event.
pub type Props = BTreeMap<String, String>;

/// Campaign parameters keyed by their query-string name (`utm_source`, ...).
pub type UtmParams = BTreeMap<String, UtmValue>;

/// A campaign parameter appearing once or several times in the query string.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(untagged))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UtmValue {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for UtmValue {
    fn from(value: &str) -> Self {
        UtmValue::One(value.to_string())
    }
}

impl From<Vec<&str>> for UtmValue {
    fn from(values: Vec<&str>) -> Self {
        UtmValue::Many(values.into_iter().map(str::to_string).collect())
    }
}

/// Logical event before it is projected onto the wire.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RawEvent {
    #[cfg_attr(feature = "serde-full", serde(rename = "type"))]
    pub kind: String,
    pub path: Option<String>,
    pub props: Option<Props>,
    pub utm: Option<UtmParams>,
    pub referrer: Option<String>,
}

impl RawEvent {
    pub fn page_view(path: impl Into<String>, props: Option<Props>, utm: UtmParams) -> Self {
        Self {
            kind: PAGE_VIEW.to_string(),
            path: Some(path.into()),
            props,
            utm: Some(utm),
            referrer: None,
        }
    }

    pub fn custom(name: impl Into<String>, args: ViewArgs) -> Self {
        Self {
            kind: name.into(),
            path: args.path,
            props: args.props,
            utm: None,
            referrer: None,
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }
}

/// Minimised event projection: `t` type, `h` hash routing, `r` referrer, `p` props.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WireEvent {
    pub t: String,
    pub h: bool,
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub r: Option<String>,
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub p: Option<Props>,
}

/// Top-level request body sent to the collector.
///
/// `e` is a one-element array: the shape leaves room for batching but the
/// tracker never sends more than one event per request.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Envelope {
    pub u: String,
    pub e: [WireEvent; 1],
    #[cfg_attr(
        feature = "serde-full",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub qs: Option<UtmParams>,
    #[cfg_attr(feature = "serde-full", serde(default, skip_serializing_if = "is_false"))]
    pub debug: bool,
}

#[cfg(feature = "serde-full")]
fn is_false(value: &bool) -> bool {
    !*value
}

impl Envelope {
    /// Builds an envelope, dropping an empty UTM mapping.
    pub fn new(url: impl Into<String>, event: WireEvent, utm: Option<UtmParams>, debug: bool) -> Self {
        Self {
            u: url.into(),
            e: [event],
            qs: utm.filter(|params| !params.is_empty()),
            debug,
        }
    }

    pub fn event(&self) -> &WireEvent {
        &self.e[0]
    }

    #[cfg(feature = "serde-full")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Second argument of `event`/`view`: either a path override or a props mapping.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PathOrProps {
    Path(String),
    Props(Props),
}

impl From<&str> for PathOrProps {
    fn from(path: &str) -> Self {
        PathOrProps::Path(path.to_string())
    }
}

impl From<String> for PathOrProps {
    fn from(path: String) -> Self {
        PathOrProps::Path(path)
    }
}

impl From<Props> for PathOrProps {
    fn from(props: Props) -> Self {
        PathOrProps::Props(props)
    }
}

/// Normalised `{path?, props?}` shape used past the public boundary.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ViewArgs {
    pub path: Option<String>,
    pub props: Option<Props>,
}

impl ViewArgs {
    /// Collapses the flexible call shape. Trailing props only count when the
    /// second argument was a path; an empty path is the same as no path.
    pub fn normalize(path_or_props: Option<PathOrProps>, props: Option<Props>) -> Self {
        match path_or_props {
            Some(PathOrProps::Path(path)) => Self {
                path: Some(path).filter(|p| !p.is_empty()),
                props,
            },
            Some(PathOrProps::Props(props)) => Self {
                path: None,
                props: Some(props),
            },
            None => Self::default(),
        }
    }
}

/// Transport tier used for a single delivery attempt.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TransportKind {
    ImageBeacon,
    Beacon,
    Fetch,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::ImageBeacon => "image",
            TransportKind::Beacon => "beacon",
            TransportKind::Fetch => "fetch",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one transport attempt, published for debug listeners.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeliveryOutcome {
    pub transport: TransportKind,
    pub success: bool,
    /// Canonical page URL of the envelope that was sent.
    pub url: String,
    pub detail: String,
    pub debug: bool,
}

impl DeliveryOutcome {
    pub fn succeeded(transport: TransportKind, envelope: &Envelope) -> Self {
        Self {
            transport,
            success: true,
            url: envelope.u.clone(),
            detail: format!("{} sent via {}", envelope.event().t, transport),
            debug: envelope.debug,
        }
    }

    pub fn failed(transport: TransportKind, envelope: &Envelope, reason: impl Into<String>) -> Self {
        Self {
            transport,
            success: false,
            url: envelope.u.clone(),
            detail: reason.into(),
            debug: envelope.debug,
        }
    }
}
