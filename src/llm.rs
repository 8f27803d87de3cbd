//! Text generation backends.

pub mod backend;
pub mod local;
pub mod process;
pub mod remote;

pub use backend::{GenerationBackend, GenerationRequest, Generator};
pub use local::LocalBackend;
pub use remote::RemoteBackend;
