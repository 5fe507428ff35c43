//! laneway core types
//!
//! Pure types with no I/O: the failure taxonomy every governed call resolves
//! to, the process-wide readiness gate, application identity and labels,
//! and a pluggable clock.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod app;
pub mod error;
pub mod failure;
pub mod id;
pub mod labels;
pub mod status;
pub mod time;

// Re-exports
pub use app::{AppService, Application, Location};
pub use error::{CoreError, CoreResult};
pub use failure::{DispatchKind, Failure, FailureKind, RejectKind, Rejection};
pub use id::{InstanceId, RequestId};
pub use status::{AppState, AppStatus, AppStatusView, InjectionMode, PolicyState};
pub use time::{Clock, ManualClock, SystemClock};
