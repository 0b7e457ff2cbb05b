//! Core domain types and external-service boundaries for sluice.
//!
//! This crate defines everything the ingestion engine and the HTTP surface
//! share: the message and acknowledgment model, the blob-store and
//! broker-subscription boundaries with their in-memory and Google Cloud
//! implementations, object key naming, the error taxonomy, and the clock
//! abstraction used to keep deadlines and key timestamps testable.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;
pub mod error;
pub mod gcs;
pub mod message;
pub mod pubsub;
pub mod storage;
pub mod time;

pub use broker::{DeliveryHandler, ReceiveSettings, Subscriber};
pub use error::CoreError;
pub use gcs::GcsBlobStore;
pub use message::{AckHandle, ReceivedMessage};
pub use pubsub::PubSubSubscriber;
pub use storage::{BlobStore, KeySpec, MemoryBlobStore, ObjectKey};
pub use time::{Clock, RealClock, TestClock};
