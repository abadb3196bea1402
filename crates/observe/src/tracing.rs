use crate::policy::current_policy;
use once_cell::sync::OnceCell;
use tracing::{span, Level, Span};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

static INIT: OnceCell<()> = OnceCell::new();

/// Installs the global subscriber once; later calls are no-ops, as is a call
/// made after another subscriber was already set by the host application.
/// Records go to stderr natively and to the browser console on wasm.
pub fn init_tracing() {
    INIT.get_or_init(|| {
        let policy = current_policy();
        if !policy.enable_tracing {
            return;
        }
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(policy.filter.as_str()));
        let registry = Registry::default().with(filter);
        let layer = fmt::layer().with_ansi(false).with_target(policy.with_target);
        #[cfg(target_arch = "wasm32")]
        let layer = layer
            .without_time()
            .with_writer(crate::console::ConsoleMakeWriter);
        #[cfg(not(target_arch = "wasm32"))]
        let layer = layer.with_writer(std::io::stderr);
        let result = if policy.json {
            tracing::subscriber::set_global_default(registry.with(layer.json()))
        } else {
            tracing::subscriber::set_global_default(registry.with(layer))
        };
        let _ = result;
    });
}

pub fn delivery_span(event_type: &str, url: &str) -> Span {
    span!(Level::DEBUG, "delivery", event = %event_type, url = %url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
        let span = delivery_span("PageView", "https://example.com");
        span.in_scope(|| tracing::debug!("within span"));
    }
}
