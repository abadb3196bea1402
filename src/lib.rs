//! Stonks tracker library
//!
//! Cookie-free page-view and custom-event reporting for web pages. The
//! browser is reached through [`host::BrowserHost`]; the `web` feature
//! provides the `web-sys` implementation and the JavaScript entry points.

pub mod autocollect;
pub mod compose;
pub mod config;
pub mod delivery;
pub mod environment;
pub mod errors;
pub mod filter;
pub mod host;
pub mod path;
pub mod props;
pub mod session;
pub mod tracker;
pub mod utm;
#[cfg(feature = "web")]
pub mod web;

pub use config::{TrackerConfig, TrackerOptions};
pub use errors::{TrackerError, TrackerResult};
pub use filter::should_track_path;
pub use session::{cleanup, configure, event, subscribe_outcomes, view};
pub use stonks_core_types::{Envelope, PathOrProps, Props, RawEvent, UtmParams, UtmValue, ViewArgs};
pub use tracker::Tracker;
pub use utm::parse_utm_params;
