use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace, warn};

/// Default broadcast channel capacity for auth events
pub const EVENT_CAPACITY: usize = 64;
/// Default replay buffer size for late subscribers
pub const EVENT_BUFFER_SIZE: usize = 16;

/// Counters describing stream activity
#[derive(Debug, Clone, Copy, Default)]
pub struct EventStreamStats {
    /// Events delivered to at least one subscriber
    pub events_published: u64,
    /// Events published while nobody was listening (still buffered)
    pub events_unobserved: u64,
}

/// Shared buffer + stats, guarded together so publish updates are atomic
struct StreamShared<T> {
    buffer: VecDeque<T>,
    stats: EventStreamStats,
}

/// Broadcast event stream with a bounded replay buffer.
///
/// Subscribers attached after an event was published can still catch up via
/// [`Subscriber::replay_buffer`], which matters for UI collaborators that
/// attach after session bootstrap has already settled.
pub struct EventStream<T: Clone + Send + 'static> {
    sender: broadcast::Sender<T>,
    shared: Arc<RwLock<StreamShared<T>>>,
    buffer_size: usize,
}

impl<T: Clone + Send + 'static> EventStream<T> {
    /// Create a stream with the given channel capacity and replay buffer size
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            shared: Arc::new(RwLock::new(StreamShared {
                buffer: VecDeque::with_capacity(buffer_size),
                stats: EventStreamStats::default(),
            })),
            buffer_size,
        }
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> Subscriber<T> {
        trace!("new subscriber registered to event stream");
        Subscriber {
            receiver: self.sender.subscribe(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Publish an event to all subscribers, buffering it for replay.
    ///
    /// Returns the number of subscribers that received the event. Zero
    /// subscribers is not an error; the event is still buffered.
    pub async fn publish(&self, event: T) -> usize {
        let receivers = match self.sender.send(event.clone()) {
            Ok(count) => count,
            // broadcast::send only fails when there are no receivers
            Err(_) => 0,
        };

        let mut shared = self.shared.write().await;
        shared.buffer.push_back(event);
        while shared.buffer.len() > self.buffer_size {
            shared.buffer.pop_front();
        }
        if receivers == 0 {
            shared.stats.events_unobserved += 1;
            warn!("no subscribers for event, buffered for replay");
        } else {
            shared.stats.events_published += 1;
            debug!(receivers, "event published");
        }

        receivers
    }

    /// Current activity counters
    pub async fn stats(&self) -> EventStreamStats {
        self.shared.read().await.stats
    }

    /// Number of currently attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone + Send + 'static> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: Arc::clone(&self.shared),
            buffer_size: self.buffer_size,
        }
    }
}

/// Receiving side of an [`EventStream`]
pub struct Subscriber<T: Clone + Send + 'static> {
    receiver: broadcast::Receiver<T>,
    shared: Arc<RwLock<StreamShared<T>>>,
}

impl<T: Clone + Send + 'static> Subscriber<T> {
    /// Wait for the next event
    pub async fn recv(&mut self) -> Result<T, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Events published before this subscriber attached, oldest first
    pub async fn replay_buffer(&self) -> Vec<T> {
        self.shared.read().await.buffer.iter().cloned().collect()
    }
}
