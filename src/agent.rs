//! Relay core: reply dispatch and the response lifecycle.

pub mod dispatcher;
pub mod lifecycle;
pub mod tracker;

pub use dispatcher::Dispatcher;
pub use lifecycle::ResponseLifecycle;
pub use tracker::{PendingResponse, ResponseState, ResponseTracker, TrackedResponse};
