//! asynciter - an asynchronous pull-based iterator framework
//!
//! Iterators produce a lazy, finite-or-unbounded sequence of items either
//! on demand through [`AsyncIterator::read`] or in flow mode through `data`
//! events, over a single-threaded cooperative scheduler. Buffered,
//! transforming, merging, and cloning iterators compose into pipelines.

pub mod bridge;
pub mod config;
pub mod emitter;
pub mod error;
pub mod iter;
pub mod queue;
pub mod scheduler;
pub mod wrap;

// Re-export the iterator surface at the crate root
pub use bridge::{from_stream, from_stream_with};
pub use config::{IteratorOptions, SimpleTransformOptions, TransformOptions};
pub use emitter::{EventKind, Subscription};
pub use error::IterError;
pub use iter::*;
pub use scheduler::{
    set_task_scheduler, task_scheduler, LocalScheduler, ManualScheduler, TaskScheduler,
};
pub use wrap::{wrap, SourceExpr};
