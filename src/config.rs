//! Configuration types for iterator construction

use crate::iter::core::AsyncIterator;
use crate::iter::transform::TransformFn;

/// Options shared by all buffered iterators.
#[derive(Debug, Clone)]
pub struct IteratorOptions {
    /// Buffer capacity: `None` is unbounded, `Some(0)` coerces to 1.
    pub max_buffer_size: Option<usize>,
    /// Whether buffering starts before the first read.
    pub auto_start: bool,
}

impl Default for IteratorOptions {
    fn default() -> Self {
        Self {
            max_buffer_size: Some(4),
            auto_start: true,
        }
    }
}

impl IteratorOptions {
    pub(crate) fn clamped_buffer_size(&self) -> usize {
        match self.max_buffer_size {
            None => usize::MAX,
            Some(0) => 1,
            Some(size) => size,
        }
    }
}

/// Options for source-backed transform iterators.
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub max_buffer_size: Option<usize>,
    pub auto_start: bool,
    /// Emit the original item when the transformation yields nothing.
    pub optional: bool,
    /// Destroy the source when this iterator ends.
    pub destroy_source: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            max_buffer_size: Some(4),
            auto_start: true,
            optional: false,
            destroy_source: true,
        }
    }
}

impl TransformOptions {
    pub(crate) fn iterator_options(&self) -> IteratorOptions {
        IteratorOptions {
            max_buffer_size: self.max_buffer_size,
            auto_start: self.auto_start,
        }
    }
}

/// Per-item pipeline options for [`AsyncIterator::transform`].
///
/// The per-item order is fixed: filter, offset, map, transform, limit;
/// `prepend` and `append` surround the transformed sequence.
pub struct SimpleTransformOptions<T: 'static> {
    pub max_buffer_size: Option<usize>,
    pub auto_start: bool,
    pub optional: bool,
    pub destroy_source: bool,
    /// Items to skip after filtering.
    pub offset: usize,
    /// Maximum number of items to push; `Some(0)` closes on the first read.
    pub limit: Option<usize>,
    pub filter: Option<Box<dyn FnMut(&T) -> bool>>,
    pub map: Option<Box<dyn FnMut(T) -> Option<T>>>,
    pub transform: Option<TransformFn<T>>,
    pub prepend: Option<AsyncIterator<T>>,
    pub append: Option<AsyncIterator<T>>,
}

impl<T: 'static> Default for SimpleTransformOptions<T> {
    fn default() -> Self {
        Self {
            max_buffer_size: Some(4),
            auto_start: true,
            optional: false,
            destroy_source: true,
            offset: 0,
            limit: None,
            filter: None,
            map: None,
            transform: None,
            prepend: None,
            append: None,
        }
    }
}
