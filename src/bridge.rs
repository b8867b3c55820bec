//! Bridging between async iterators and `futures` streams

use std::cell::RefCell;
use std::rc::Rc;

use async_stream::stream;
use futures::channel::oneshot;
use futures_core::Stream;
use futures_util::{pin_mut, StreamExt};

use crate::config::IteratorOptions;
use crate::iter::buffered::new_buffered;
use crate::iter::core::AsyncIterator;
use crate::scheduler::schedule_future;

impl<T: 'static> AsyncIterator<T> {
    /// Adapt this iterator into a [`Stream`] of its items.
    ///
    /// The stream yields items as they become readable and terminates once
    /// the iterator is done; errors surface through `error` listeners, not
    /// through the stream.
    pub fn into_stream(self) -> impl Stream<Item = T> {
        stream! {
            loop {
                match self.read() {
                    Some(item) => yield item,
                    None => {
                        if self.done() {
                            break;
                        }
                        wait_for_change(&self).await;
                    }
                }
            }
        }
    }
}

// Resolve once the iterator becomes readable, ends, or errors.
async fn wait_for_change<T: 'static>(it: &AsyncIterator<T>) {
    let (sender, receiver) = oneshot::channel::<()>();
    let slot = Rc::new(RefCell::new(Some(sender)));
    let fire = move |slot: &RefCell<Option<oneshot::Sender<()>>>| {
        if let Some(sender) = slot.borrow_mut().take() {
            let _ = sender.send(());
        }
    };
    let readable_sub = {
        let slot = slot.clone();
        it.once_readable(move || fire(&slot))
    };
    let end_sub = {
        let slot = slot.clone();
        it.once_end(move || fire(&slot))
    };
    let error_sub = {
        let slot = slot.clone();
        it.once_error(move |_| fire(&slot))
    };
    // Terminal transitions drop the end listener without firing it
    if it.done() || it.readable() {
        fire(&slot);
    }
    let _ = receiver.await;
    for sub in [readable_sub, end_sub, error_sub] {
        it.off(sub);
    }
}

/// Feed a buffered iterator from a local [`Stream`].
///
/// The feeder task is driven by the task scheduler and is not throttled by
/// the buffer bound; it stops when the stream ends or every iterator
/// handle is dropped.
pub fn from_stream<T: 'static>(stream: impl Stream<Item = T> + 'static) -> AsyncIterator<T> {
    from_stream_with(stream, IteratorOptions::default())
}

pub fn from_stream_with<T: 'static>(
    stream: impl Stream<Item = T> + 'static,
    options: IteratorOptions,
) -> AsyncIterator<T> {
    let (it, behavior) = new_buffered(&options, "StreamIterator");
    let weak_it = it.downgrade();
    let weak_behavior = Rc::downgrade(&behavior);
    schedule_future(async move {
        pin_mut!(stream);
        while let Some(item) = stream.next().await {
            match (weak_it.upgrade(), weak_behavior.upgrade()) {
                (Some(it), Some(behavior)) => {
                    if it.done() {
                        return;
                    }
                    behavior.push(&it, item);
                }
                _ => return,
            }
        }
        if let Some(it) = weak_it.upgrade() {
            it.close();
        }
    });
    it
}
