//! Core domain models for the jobline enqueue client.
//!
//! Provides strongly-typed task identifiers, job submissions, submission
//! outcomes and enqueue results, along with the error type and clock
//! abstraction shared by the queue crate and the CLI.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    EnqueueResult, ErrorCode, JobSubmission, Payload, SubmissionOutcome, TaskIdentifier,
    NO_STRATEGY,
};
pub use time::{Clock, RealClock, TestClock};
