//! Core data model.
//!
//! A task invocation is one execution attempt of a named task. When it belongs
//! to a scan and carries an activity slot, its lifecycle is recorded as an
//! activity row owned by that scan.

pub mod activity;
pub mod invocation;

pub use activity::{ActivityId, ActivityRecord, ActivityUpdate, NewActivity, ScanId, Status};
pub use invocation::{Kwargs, TaskContext, TaskInvocation};
