//! # Activation Queue
//!
//! FIFO producer/consumer queue with capacity-based backpressure. Producers
//! block in [`BoundedQueue::enqueue`] while the queue is full and consumers
//! block in [`BoundedQueue::dequeue`] while it is empty.
//!
//! ## Design Principles
//! - The queue owns both channel halves, so the channel can never disconnect
//!   while a handle exists; enqueue and dequeue only ever block or succeed.
//! - Cloning a queue yields another handle to the same channel.

use std::time::Duration;

use flume::{Receiver, Sender};

#[derive(Debug)]
pub struct BoundedQueue<T> {
    /// The sending half of the channel
    sender: Sender<T>,
    /// The receiving half of the channel
    receiver: Receiver<T>,
    /// Maximum number of queued items, `None` when unbounded
    capacity: Option<usize>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// A capacity of zero would make every enqueue a rendezvous with a
    /// consumer, which the scheduler's own requeue path cannot satisfy, so it
    /// is raised to one.
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = flume::bounded(capacity);
        Self {
            sender,
            receiver,
            capacity: Some(capacity),
        }
    }

    pub fn unbounded() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender,
            receiver,
            capacity: None,
        }
    }

    /// Bounded when `capacity` is `Some`, unbounded otherwise.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        match capacity {
            Some(capacity) => Self::bounded(capacity),
            None => Self::unbounded(),
        }
    }

    /// Appends `item`, blocking while the queue is full.
    pub fn enqueue(&self, item: T) {
        // the receiver held by `self` keeps the channel connected
        if self.sender.send(item).is_err() {
            unreachable!("activation queue disconnected while a handle holds its receiver");
        }
    }

    /// Appends `item` without blocking; hands it back if the queue is full.
    pub fn try_enqueue(&self, item: T) -> Result<(), T> {
        self.sender.try_send(item).map_err(|err| err.into_inner())
    }

    /// Removes the head, blocking while the queue is empty.
    pub fn dequeue(&self) -> T {
        match self.receiver.recv() {
            Ok(item) => item,
            Err(_) => unreachable!("activation queue disconnected while a handle holds its sender"),
        }
    }

    /// Removes the head, waiting at most `timeout` for one to arrive.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<T> {
        self.receiver.recv_timeout(timeout).ok()
    }

    pub fn try_dequeue(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
