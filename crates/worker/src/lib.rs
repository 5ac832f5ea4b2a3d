//! Worker side of the image job lifecycle.
//!
//! The [`dispatcher::Dispatcher`] claims tasks from the broker with weighted
//! fair scheduling, runs each through the [`handler::HandlerRegistry`] under
//! bounded concurrency and a per-task timeout, and acknowledges or fails the
//! task afterwards. [`processor::ImageProcessor`] is the `process:image`
//! state machine.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod health;
pub mod processor;
pub mod recovery;

pub use config::WorkerConfig;
pub use dispatcher::Dispatcher;
pub use error::ProcessError;
pub use handler::{HandlerRegistry, TaskHandler};
pub use processor::ImageProcessor;
