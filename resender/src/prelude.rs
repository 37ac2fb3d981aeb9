//! The purpose of this module is to alleviate the need to import many of the `[resender]` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use resender::prelude::*;
//! ```
pub use crate::dispatch::{AttemptFailure, DispatchError, DispatchResult, Dispatcher};
pub use crate::job::{
    Generation, JobKey, JobRequest, JobSnapshot, Payload, StartOutcome, StartReport, StopOutcome,
};
pub use crate::query::{HealthSummary, QueryService};
pub use crate::scheduler::Scheduler;
pub use crate::ResenderError;
