// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
Bounded FIFO queues for impressions and events (spec §4.4).

Both queues share the same overflow contract: `put` accepts items in order
until capacity would be exceeded, then rejects the overflowing tail as a
unit and returns `false`. The queue-full hook fires exactly once per
transition from "had space" to "overflowed" - not once per rejected item -
and is re-armed the next time `pop_many` frees space.

Impressions are bounded by item count; events are bounded by the aggregate
serialized `size` of their properties (spec §4.4), so the two queues use
the same generic engine parameterized by a per-item weight function.
"#]

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::models::{Event, Impression};

type QueueFullHook = Arc<dyn Fn() + Send + Sync>;

struct Queue<T> {
    items: Mutex<VecDeque<T>>,
    current_weight: AtomicUsize,
    capacity: usize,
    overflowed: AtomicBool,
    on_full: Mutex<Option<QueueFullHook>>,
    weight_of: fn(&T) -> usize,
}

impl<T> Queue<T> {
    fn new(capacity: usize, weight_of: fn(&T) -> usize) -> Self {
        Queue {
            items: Mutex::new(VecDeque::new()),
            current_weight: AtomicUsize::new(0),
            capacity,
            overflowed: AtomicBool::new(false),
            on_full: Mutex::new(None),
            weight_of,
        }
    }

    fn set_queue_full_hook(&self, hook: QueueFullHook) {
        *self.on_full.lock() = Some(hook);
    }

    fn put(&self, incoming: Vec<T>) -> bool {
        let mut items = self.items.lock();
        let mut accepted = 0usize;
        let mut weight = self.current_weight.load(Ordering::Acquire);
        let mut rejected_any = false;

        let mut incoming = incoming.into_iter();
        for item in &mut incoming {
            let w = (self.weight_of)(&item);
            if weight + w > self.capacity {
                rejected_any = true;
                break;
            }
            weight += w;
            items.push_back(item);
            accepted += 1;
        }
        let _ = accepted;
        // Remaining items in `incoming` (if any) are the overflowing tail;
        // dropping the iterator discards them.

        self.current_weight.store(weight, Ordering::Release);

        if rejected_any {
            if !self.overflowed.swap(true, Ordering::AcqRel) {
                if let Some(hook) = self.on_full.lock().as_ref() {
                    hook();
                }
            }
            false
        } else {
            true
        }
    }

    fn pop_many(&self, n: usize) -> Vec<T> {
        let mut items = self.items.lock();
        let mut out = Vec::with_capacity(n.min(items.len()));
        let mut freed = 0usize;
        for _ in 0..n {
            match items.pop_front() {
                Some(item) => {
                    freed += (self.weight_of)(&item);
                    out.push(item);
                }
                None => break,
            }
        }
        if freed > 0 {
            self.current_weight.fetch_sub(freed, Ordering::AcqRel);
            // Space was just freed; re-arm the overflow hook for the next transition.
            self.overflowed.store(false, Ordering::Release);
        }
        out
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }

    fn current_weight(&self) -> usize {
        self.current_weight.load(Ordering::Acquire)
    }

    fn clear(&self) {
        let mut items = self.items.lock();
        items.clear();
        self.current_weight.store(0, Ordering::Release);
        self.overflowed.store(false, Ordering::Release);
    }
}

/// Count-bounded impression queue.
pub struct ImpressionQueue {
    inner: Queue<Impression>,
}

impl ImpressionQueue {
    pub fn new(capacity: usize) -> Self {
        ImpressionQueue { inner: Queue::new(capacity, |_| 1) }
    }

    pub fn set_queue_full_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner.set_queue_full_hook(Arc::new(hook));
    }

    pub fn put(&self, items: Vec<Impression>) -> bool {
        self.inner.put(items)
    }

    pub fn pop_many(&self, n: usize) -> Vec<Impression> {
        self.inner.pop_many(n)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    pub fn clear(&self) {
        self.inner.clear()
    }
}

/// Byte-bounded event queue: capacity is an aggregate size in bytes, not a
/// count (spec §4.4).
pub struct EventQueue {
    inner: Queue<Event>,
}

impl EventQueue {
    pub fn new(capacity_bytes: usize) -> Self {
        EventQueue { inner: Queue::new(capacity_bytes, |e| e.size) }
    }

    pub fn set_queue_full_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner.set_queue_full_hook(Arc::new(hook));
    }

    pub fn put(&self, items: Vec<Event>) -> bool {
        self.inner.put(items)
    }

    pub fn pop_many(&self, n: usize) -> Vec<Event> {
        self.inner.pop_many(n)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn current_bytes(&self) -> usize {
        self.inner.current_weight()
    }

    pub fn clear(&self) {
        self.inner.clear()
    }
}
