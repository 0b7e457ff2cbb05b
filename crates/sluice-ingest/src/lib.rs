//! Ingestion engine: fan-out orchestration and bounded pull sessions.
//!
//! Two components do the real work here:
//!
//! - [`FanoutInvoker`] launches N parallel HTTP invocations of a worker
//!   endpoint and waits for every one of them to report, tolerating
//!   individual failures; its job is to schedule work, not to guarantee it.
//! - [`PullCoordinator`] runs one bounded ingestion session per worker
//!   invocation: broker delivery callbacks feed a single-slot rendezvous
//!   queue, one consumer persists and acknowledges each message under a
//!   single critical section, and a deadline watcher races the message-count
//!   cutoff to end the session exactly once.
//!
//! The coordinator's shutdown discipline is the subtle part: cancellation is
//! cooperative, in-flight deliveries are drained rather than dropped, and a
//! blocked delivery callback can never outlive its session.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod coordinator;
pub mod error;
pub mod fanout;
pub mod session;
pub mod validate;

pub use client::{ClientConfig, InvokerClient};
pub use coordinator::PullCoordinator;
pub use error::{IngestError, Result};
pub use fanout::{FanoutConfig, FanoutInvoker, FanoutReport, InstanceOutcome};
pub use session::{PullSessionConfig, SessionReport};
pub use validate::validate_worker_url;
