//! Three-tier delivery: image beacon, then `navigator.sendBeacon`, then
//! `fetch` with `keepalive`.
//!
//! The image beacon is a fast path only. Its failure signal is unreliable (a
//! slow load never errors), so the beacon/fetch chain always runs as well.
//! Nothing is retried beyond that chain and nothing is awaited.

use std::rc::Rc;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use stonks_core_types::{DeliveryOutcome, Envelope, TransportKind};
use stonks_event_bus::{publish_outcome, OutcomeBus};
use stonks_observe::delivery_span;
use url::Url;

use crate::errors::TrackerResult;
use crate::host::{BeaconStatus, Transport};

/// Longest encoded payload sent as a GET query value; longer URLs risk
/// truncation by proxies.
pub const SAFE_GET_THRESHOLD: usize = 1500;

/// What the channel will attempt for one envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryPlan {
    /// Canonical JSON body sent by beacon/fetch.
    pub body: String,
    /// Image-beacon URL, absent when the encoded payload is over the threshold.
    pub image_url: Option<String>,
}

pub struct DeliveryChannel {
    collector_url: String,
    outcomes: Arc<OutcomeBus>,
}

impl DeliveryChannel {
    pub fn new(collector_url: impl Into<String>, outcomes: Arc<OutcomeBus>) -> Self {
        Self {
            collector_url: collector_url.into(),
            outcomes,
        }
    }

    pub fn plan(&self, envelope: &Envelope) -> TrackerResult<DeliveryPlan> {
        let body = serde_json::to_string(envelope)?;
        let encoded = Base64.encode(body.as_bytes());
        let image_url = if encoded.len() <= SAFE_GET_THRESHOLD {
            let mut url = Url::parse(&self.collector_url)?;
            url.query_pairs_mut().append_pair("data", &encoded);
            Some(url.to_string())
        } else {
            tracing::debug!(
                encoded_len = encoded.len(),
                "payload over GET threshold, skipping image beacon"
            );
            None
        };
        Ok(DeliveryPlan { body, image_url })
    }

    pub fn deliver<T: Transport + ?Sized>(&self, transport: &T, envelope: &Envelope) -> TrackerResult<DeliveryPlan> {
        let span = delivery_span(&envelope.event().t, &envelope.u);
        let _entered = span.enter();

        let plan = self.plan(envelope)?;
        let envelope = Rc::new(envelope.clone());

        if let Some(image_url) = plan.image_url.as_deref() {
            let outcomes = Arc::clone(&self.outcomes);
            let sent = Rc::clone(&envelope);
            let dispatched = transport.load_image(
                image_url,
                Box::new(move |result| {
                    let outcome = match result {
                        Ok(()) => DeliveryOutcome::succeeded(TransportKind::ImageBeacon, &sent),
                        Err(reason) => {
                            tracing::warn!(%reason, "image beacon failed");
                            DeliveryOutcome::failed(TransportKind::ImageBeacon, &sent, reason)
                        }
                    };
                    publish_outcome(&outcomes, outcome);
                }),
            );
            if let Err(err) = dispatched {
                tracing::warn!(error = %err, "image beacon could not be dispatched");
                publish_outcome(
                    &self.outcomes,
                    DeliveryOutcome::failed(TransportKind::ImageBeacon, &envelope, err.to_string()),
                );
            }
        }

        self.send_with_beacon_or_fetch(transport, &plan.body, envelope);
        Ok(plan)
    }

    fn send_with_beacon_or_fetch<T: Transport + ?Sized>(&self, transport: &T, body: &str, envelope: Rc<Envelope>) {
        match transport.send_beacon(&self.collector_url, body) {
            BeaconStatus::Queued => {
                publish_outcome(
                    &self.outcomes,
                    DeliveryOutcome::succeeded(TransportKind::Beacon, &envelope),
                );
                return;
            }
            status => tracing::debug!(?status, "sendBeacon did not queue, falling back to fetch"),
        }

        let outcomes = Arc::clone(&self.outcomes);
        let sent = Rc::clone(&envelope);
        let dispatched = transport.fetch_keepalive(
            &self.collector_url,
            body,
            Box::new(move |result| {
                let outcome = match result {
                    Ok(()) => DeliveryOutcome::succeeded(TransportKind::Fetch, &sent),
                    Err(reason) => {
                        tracing::error!(%reason, "fetch() failed");
                        DeliveryOutcome::failed(TransportKind::Fetch, &sent, reason)
                    }
                };
                publish_outcome(&outcomes, outcome);
            }),
        );
        if let Err(err) = dispatched {
            tracing::error!(error = %err, "fetch() could not be dispatched");
            publish_outcome(
                &self.outcomes,
                DeliveryOutcome::failed(TransportKind::Fetch, &envelope, err.to_string()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::{MemoryHost, Request};
    use stonks_core_types::{Props, WireEvent};
    use stonks_event_bus::{EventBus, InMemoryBus};

    const COLLECTOR: &str = "https://collector.example/events";

    fn envelope(props: Option<Props>) -> Envelope {
        Envelope::new(
            "https://example.com/pricing",
            WireEvent {
                t: "PageView".into(),
                h: false,
                r: None,
                p: props,
            },
            None,
            false,
        )
    }

    fn oversized() -> Envelope {
        let mut props = Props::new();
        props.insert("blob".into(), "x".repeat(SAFE_GET_THRESHOLD));
        envelope(Some(props))
    }

    fn channel() -> (DeliveryChannel, Arc<OutcomeBus>) {
        let bus: Arc<OutcomeBus> = InMemoryBus::new(16);
        (DeliveryChannel::new(COLLECTOR, Arc::clone(&bus)), bus)
    }

    #[test]
    fn small_payload_uses_image_and_beacon() {
        let (channel, _bus) = channel();
        let host = MemoryHost::default();
        let sent = envelope(None);
        channel.deliver(&host, &sent).unwrap();

        let requests = host.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].transport(), TransportKind::ImageBeacon);
        assert!(requests[0].url().starts_with("https://collector.example/events?data="));
        assert_eq!(requests[1].transport(), TransportKind::Beacon);
        assert_eq!(requests[0].payload(), requests[1].payload());
        assert_eq!(requests[1].payload().unwrap(), serde_json::to_string(&sent).unwrap());
    }

    #[test]
    fn oversized_payload_skips_image() {
        let (channel, _bus) = channel();
        let host = MemoryHost::default();
        let plan = channel.deliver(&host, &oversized()).unwrap();
        assert!(plan.image_url.is_none());

        let requests = host.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].transport(), TransportKind::Beacon);
    }

    #[test]
    fn declined_beacon_falls_back_to_fetch() {
        let (channel, bus) = channel();
        let mut rx = bus.subscribe();
        let host = MemoryHost::default();
        host.set_beacon_status(BeaconStatus::Unavailable);
        channel.deliver(&host, &oversized()).unwrap();

        let requests = host.requests();
        assert_eq!(requests.len(), 1);
        assert!(matches!(&requests[0], Request::Fetch { url, .. } if url == COLLECTOR));
        let outcome = rx.try_recv().unwrap();
        assert_eq!(outcome.transport, TransportKind::Fetch);
        assert!(outcome.success);
    }

    #[test]
    fn failures_are_reported_not_raised() {
        let (channel, bus) = channel();
        let mut rx = bus.subscribe();
        let host = MemoryHost::default();
        host.set_image_fails(true);
        host.set_beacon_status(BeaconStatus::Declined);
        host.set_fetch_fails(true);
        assert!(channel.deliver(&host, &envelope(None)).is_ok());

        let image = rx.try_recv().unwrap();
        assert_eq!(image.transport, TransportKind::ImageBeacon);
        assert!(!image.success);
        let fetch = rx.try_recv().unwrap();
        assert_eq!(fetch.transport, TransportKind::Fetch);
        assert!(!fetch.success);
        assert_eq!(fetch.detail, "Failed to fetch");
    }

    #[test]
    fn threshold_is_measured_on_encoded_payload() {
        let (channel, _bus) = channel();
        let plan = channel.plan(&envelope(None)).unwrap();
        let encoded_len = Base64.encode(plan.body.as_bytes()).len();
        assert!(encoded_len <= SAFE_GET_THRESHOLD);
        assert!(plan.image_url.is_some());
    }
}
