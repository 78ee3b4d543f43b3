pub mod auth;
pub mod dispatch;
pub mod probe;

pub use auth::{AuthError, AuthService};
pub use dispatch::{DispatchError, DispatchOutcome, DispatchService};
pub use probe::{ProbeError, ProbeService};
