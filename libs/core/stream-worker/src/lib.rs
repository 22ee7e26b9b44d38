//! Stream Worker Framework
//!
//! A generic Redis Streams worker for consuming event streams with
//! at-least-once semantics.
//!
//! ## Features
//!
//! - **Generic worker**: `StreamWorker<J, P>` processes any event type
//! - **Consumer groups**: each entry is delivered to exactly one consumer in
//!   the group, so independent service instances share one subscription
//!   without duplicating work
//! - **Crash recovery**: unacknowledged messages are re-read on startup and
//!   abandoned messages are claimed from dead consumers
//! - **Graceful shutdown**: via `tokio::sync::watch`
//!
//! Processing failures are logged and the message acknowledged: a bad event
//! is skipped, never allowed to block the stream. Redelivery (after a crash
//! between processing and ack) is expected and must be tolerated by
//! processors.
//!
//! ## Example
//!
//! ```ignore
//! use stream_worker::{StreamWorker, StreamJob, StreamProcessor, StreamDef, WorkerConfig};
//!
//! struct MyStream;
//! impl StreamDef for MyStream {
//!     const STREAM_NAME: &'static str = "my:events";
//!     const CONSUMER_GROUP: &'static str = "my_workers";
//! }
//!
//! let config = WorkerConfig::from_stream_def::<MyStream>();
//! let worker = StreamWorker::new(redis, processor, config);
//! worker.run(shutdown_rx).await?;
//! ```

mod config;
mod consumer;
mod error;
mod producer;
mod registry;
mod worker;

pub use config::WorkerConfig;
pub use consumer::StreamConsumer;
pub use error::StreamError;
pub use producer::StreamProducer;
pub use registry::{StreamDef, StreamJob, StreamProcessor};
pub use worker::StreamWorker;
