pub mod console;
pub mod policy;
pub mod tracing;

pub use policy::{current_policy, set_policy, ObsPolicyView, PolicyHandle};
pub use self::tracing::{delivery_span, init_tracing};
