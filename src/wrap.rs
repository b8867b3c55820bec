//! Adapting external inputs into async iterators

use std::future::Future;

use futures::future::LocalBoxFuture;

use crate::config::TransformOptions;
use crate::error::IterError;
use crate::iter::core::AsyncIterator;
use crate::iter::primitives::from_array;
use crate::iter::transform::wrap_transform;

/// A source for a transform iterator: an iterator, a future resolving to
/// one, or a zero-argument factory producing either.
///
/// Futures and factories resolve lazily: on the next tick under
/// `auto_start`, otherwise on the first read.
pub enum SourceExpr<T: 'static> {
    Iterator(AsyncIterator<T>),
    Future(LocalBoxFuture<'static, Result<AsyncIterator<T>, IterError>>),
    Factory(Box<dyn FnOnce() -> SourceExpr<T>>),
}

impl<T: 'static> SourceExpr<T> {
    /// A source resolved from a future.
    pub fn future(
        future: impl Future<Output = Result<AsyncIterator<T>, IterError>> + 'static,
    ) -> Self {
        SourceExpr::Future(Box::pin(future))
    }

    /// A source created on demand.
    pub fn factory(factory: impl FnOnce() -> AsyncIterator<T> + 'static) -> Self {
        SourceExpr::Factory(Box::new(|| SourceExpr::Iterator(factory())))
    }
}

impl<T: 'static> From<AsyncIterator<T>> for SourceExpr<T> {
    fn from(it: AsyncIterator<T>) -> Self {
        SourceExpr::Iterator(it)
    }
}

impl<T: 'static> From<Vec<T>> for SourceExpr<T> {
    fn from(items: Vec<T>) -> Self {
        SourceExpr::Iterator(from_array(items))
    }
}

/// Adapt `source` into an async iterator.
///
/// An already-constructed iterator passes through unchanged when no
/// options are given; any other source, or the presence of options,
/// produces a transform iterator over it.
pub fn wrap<T: 'static>(
    source: impl Into<SourceExpr<T>>,
    options: Option<TransformOptions>,
) -> AsyncIterator<T> {
    match (source.into(), options) {
        (SourceExpr::Iterator(it), None) => it,
        (expr, options) => wrap_transform(expr, options.unwrap_or_default()),
    }
}
