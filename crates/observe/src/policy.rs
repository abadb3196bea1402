use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObsPolicyView {
    pub enable_tracing: bool,
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: String,
    pub json: bool,
    pub with_target: bool,
}

impl Default for ObsPolicyView {
    fn default() -> Self {
        Self {
            enable_tracing: true,
            filter: "stonks_tracker=info,warn".into(),
            json: false,
            with_target: false,
        }
    }
}

static GLOBAL_POLICY: OnceCell<Arc<RwLock<ObsPolicyView>>> = OnceCell::new();

#[derive(Clone)]
pub struct PolicyHandle {
    inner: Arc<RwLock<ObsPolicyView>>,
}

impl PolicyHandle {
    pub fn get() -> Self {
        let cell = GLOBAL_POLICY.get_or_init(|| Arc::new(RwLock::new(ObsPolicyView::default())));
        Self {
            inner: Arc::clone(cell),
        }
    }

    pub fn snapshot(&self) -> ObsPolicyView {
        self.inner.read().clone()
    }

    pub fn update(&self, view: ObsPolicyView) {
        *self.inner.write() = view;
    }
}

pub fn set_policy(view: ObsPolicyView) {
    PolicyHandle::get().update(view);
}

pub fn current_policy() -> ObsPolicyView {
    PolicyHandle::get().snapshot()
}
