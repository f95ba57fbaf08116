// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Generic fan-out from one producer to many subscribers.
//!
//! [`SubscriptionHub`] backs every SSE/websocket stream in the sidecar: DOM
//! snapshots, clipboard watch, fs watch, process stdout, virtual-media status.
//! `Publish` never blocks on a slow subscriber — it applies the subscriber's
//! own overflow policy instead.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;

/// What happens to a subscriber whose queue is full when a new event arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Pop the oldest queued event and push the new one.
    DropOldest,
    /// Close the subscriber; its stream ends early and is marked lagged.
    DropSubscriber,
}

/// How a newly-created subscription should be seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    /// Start with an empty queue.
    None,
    /// Enqueue the hub's last published value first, if one exists.
    LastValue,
}

struct SubscriberState<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    notify: Notify,
    closed: AtomicBool,
    lagged: AtomicBool,
}

impl<T> SubscriberState<T> {
    fn push(&self, event: T) {
        let mut queue = self.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if queue.len() < self.capacity {
            queue.push_back(event);
            drop(queue);
            self.notify.notify_one();
            return;
        }
        match self.policy {
            OverflowPolicy::DropOldest => {
                queue.pop_front();
                queue.push_back(event);
                drop(queue);
                self.notify.notify_one();
            },
            OverflowPolicy::DropSubscriber => {
                drop(queue);
                self.lagged.store(true, Ordering::Release);
                self.close();
            },
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// A single subscriber's handle on a [`SubscriptionHub`].
///
/// Dropping it unregisters the subscriber from the hub; the hub is never
/// blocked by a subscription that a caller forgot to poll.
pub struct Subscription<T> {
    id: u64,
    state: Arc<SubscriberState<T>>,
    hub: Weak<HubInner<T>>,
}

impl<T> Subscription<T> {
    /// Waits for the next event, or returns `None` once the subscription is
    /// closed (by [`SubscriptionHub::close`], by overflow under
    /// [`OverflowPolicy::DropSubscriber`], or by unsubscribing).
    pub async fn recv(&self) -> Option<T> {
        loop {
            {
                let mut queue =
                    self.state.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                if let Some(event) = queue.pop_front() {
                    return Some(event);
                }
                if self.state.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.state.notify.notified().await;
        }
    }

    /// True once this subscription was closed because it could not keep up
    /// (only possible under [`OverflowPolicy::DropSubscriber`]).
    #[must_use]
    pub fn is_lagged(&self) -> bool {
        self.state.lagged.load(Ordering::Acquire)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.subscribers.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&self.id);
        }
    }
}

struct HubInner<T> {
    subscribers: Mutex<HashMap<u64, Arc<SubscriberState<T>>>>,
    next_id: AtomicU64,
    last_value: Mutex<Option<T>>,
    closed: AtomicBool,
}

/// A cloneable handle to a fan-out point. All clones share the same
/// subscriber set; the hub itself is dropped once every handle and
/// subscription referencing it is gone.
pub struct SubscriptionHub<T> {
    inner: Arc<HubInner<T>>,
}

impl<T> Clone for SubscriptionHub<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> Default for SubscriptionHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SubscriptionHub<T> {
    /// Creates an empty hub with no cached last value.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                last_value: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the most recently published event, if any.
    #[must_use]
    pub fn last_value(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.last_value.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Registers a new subscriber. Returns `None` if the hub has been closed.
    pub fn subscribe(
        &self,
        capacity: usize,
        policy: OverflowPolicy,
        replay: Replay,
    ) -> Option<Subscription<T>>
    where
        T: Clone,
    {
        if self.inner.closed.load(Ordering::Acquire) {
            return None;
        }

        let mut initial = VecDeque::with_capacity(capacity.min(1));
        if replay == Replay::LastValue {
            if let Some(value) = self.last_value() {
                initial.push_back(value);
            }
        }

        let state = Arc::new(SubscriberState {
            queue: Mutex::new(initial),
            capacity: capacity.max(1),
            policy,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            lagged: AtomicBool::new(false),
        });

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, Arc::clone(&state));

        Some(Subscription { id, state, hub: Arc::downgrade(&self.inner) })
    }

    /// Delivers `event` to every current subscriber. Never blocks: a
    /// subscriber that cannot accept the event has its overflow policy
    /// applied instead. Safe to call from multiple producer tasks, though in
    /// this system there is typically exactly one.
    pub fn publish(&self, event: T)
    where
        T: Clone,
    {
        *self.inner.last_value.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            Some(event.clone());

        let subscribers: Vec<Arc<SubscriberState<T>>> = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for state in subscribers {
            state.push(event.clone());
        }
    }

    /// Closes every current subscriber and rejects future `subscribe` calls.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let subscribers =
            self.inner.subscribers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for state in subscribers.values() {
            state.close();
        }
    }

    /// Number of currently-registered subscribers (for tests/diagnostics).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drop_oldest_keeps_most_recent_events() {
        let hub: SubscriptionHub<u32> = SubscriptionHub::new();
        let sub = hub.subscribe(4, OverflowPolicy::DropOldest, Replay::None).unwrap();

        for i in 0..10u32 {
            hub.publish(i);
        }

        let mut received = Vec::new();
        while let Ok(Some(v)) =
            tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv()).await
        {
            received.push(v);
        }
        assert_eq!(received, vec![6, 7, 8, 9]);
        assert!(!sub.is_lagged());
    }

    #[tokio::test]
    async fn drop_subscriber_marks_lagged_and_ends_stream() {
        let hub: SubscriptionHub<u32> = SubscriptionHub::new();
        let sub = hub.subscribe(2, OverflowPolicy::DropSubscriber, Replay::None).unwrap();

        for i in 0..5u32 {
            hub.publish(i);
        }

        // Queue held at most 2 before overflow closed it; drain whatever is left then expect None.
        while sub.recv().await.is_some() {}
        assert!(sub.is_lagged());
    }

    #[tokio::test]
    async fn replay_last_value_seeds_new_subscriber() {
        let hub: SubscriptionHub<char> = SubscriptionHub::new();
        hub.publish('a');
        hub.publish('b');
        hub.publish('c');

        let sub = hub.subscribe(4, OverflowPolicy::DropOldest, Replay::LastValue).unwrap();
        assert_eq!(sub.recv().await, Some('c'));

        hub.publish('d');
        assert_eq!(sub.recv().await, Some('d'));
    }

    #[tokio::test]
    async fn publish_ordering_is_preserved_per_subscriber() {
        let hub: SubscriptionHub<u32> = SubscriptionHub::new();
        let sub_a = hub.subscribe(16, OverflowPolicy::DropOldest, Replay::None).unwrap();
        let sub_b = hub.subscribe(16, OverflowPolicy::DropOldest, Replay::None).unwrap();

        for i in 0..5u32 {
            hub.publish(i);
        }

        for expected in 0..5u32 {
            assert_eq!(sub_a.recv().await, Some(expected));
            assert_eq!(sub_b.recv().await, Some(expected));
        }
    }

    #[tokio::test]
    async fn close_terminates_all_subscribers_and_rejects_new_ones() {
        let hub: SubscriptionHub<u32> = SubscriptionHub::new();
        let sub = hub.subscribe(4, OverflowPolicy::DropOldest, Replay::None).unwrap();
        hub.close();
        assert_eq!(sub.recv().await, None);
        assert!(hub.subscribe(4, OverflowPolicy::DropOldest, Replay::None).is_none());
    }

    #[tokio::test]
    async fn unsubscribe_on_drop_removes_from_hub() {
        let hub: SubscriptionHub<u32> = SubscriptionHub::new();
        let sub = hub.subscribe(4, OverflowPolicy::DropOldest, Replay::None).unwrap();
        assert_eq!(hub.subscriber_count(), 1);
        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
