//! Asynchronous iterator core and the iterator kinds built on it.

pub mod buffered;
pub mod cloned;
pub mod core;
pub mod mapping;
pub mod primitives;
pub mod transform;
pub mod union;

// Re-export the full consumer surface
pub use self::buffered::{buffered, BufferedProducer, ProducerScope};
pub use self::core::{AsyncIterator, State};
pub use self::primitives::{
    empty, from_array, from_array_with, from_iter, range, range_step, single,
};
pub use self::transform::{multi_transform, transform_with, DoneFn, PushFn, TransformFn};
pub use self::union::{union, union_dynamic, union_dynamic_with, union_with};
