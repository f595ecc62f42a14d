use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: u64,
    pub level: ToastLevel,
    pub message: String,
    pub created: Instant,
}

/// Bounded queue of transient notifications. Expired toasts are dropped
/// lazily whenever the queue is touched.
#[derive(Debug)]
pub struct ToastQueue {
    toasts: VecDeque<Toast>,
    capacity: usize,
    ttl: Duration,
    next_id: u64,
}

impl ToastQueue {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            toasts: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            ttl,
            next_id: 1,
        }
    }

    pub fn push(&mut self, level: ToastLevel, message: impl Into<String>, now: Instant) -> u64 {
        self.prune(now);
        let id = self.next_id;
        self.next_id += 1;
        self.toasts.push_back(Toast {
            id,
            level,
            message: message.into(),
            created: now,
        });
        while self.toasts.len() > self.capacity {
            self.toasts.pop_front();
        }
        id
    }

    pub fn dismiss(&mut self, id: u64) {
        self.toasts.retain(|t| t.id != id);
    }

    pub fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.toasts.retain(|t| now.saturating_duration_since(t.created) < ttl);
    }

    /// Live toasts, oldest first.
    pub fn active(&mut self, now: Instant) -> Vec<Toast> {
        self.prune(now);
        self.toasts.iter().cloned().collect()
    }
}

/// Shared handle that also mirrors every toast into the log.
#[derive(Clone)]
pub struct Notifier {
    queue: Arc<Mutex<ToastQueue>>,
}

impl Notifier {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            queue: Arc::new(Mutex::new(ToastQueue::new(capacity, ttl))),
        }
    }

    pub fn notify(&self, level: ToastLevel, message: impl Into<String>) -> u64 {
        let message = message.into();
        match level {
            ToastLevel::Error => error!(toast = %message, "notification"),
            ToastLevel::Warning => warn!(toast = %message, "notification"),
            ToastLevel::Info | ToastLevel::Success => info!(toast = %message, "notification"),
        }
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(level, message, Instant::now())
    }

    pub fn dismiss(&self, id: u64) {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).dismiss(id);
    }

    pub fn active(&self) -> Vec<Toast> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_toast_is_evicted_past_capacity() {
        let now = Instant::now();
        let mut queue = ToastQueue::new(5, Duration::from_secs(5));

        for i in 0..7 {
            queue.push(ToastLevel::Info, format!("toast {i}"), now);
        }

        let active = queue.active(now);
        assert_eq!(active.len(), 5);
        assert_eq!(active[0].message, "toast 2");
        assert_eq!(active[4].message, "toast 6");
    }

    #[test]
    fn toasts_expire_after_ttl() {
        let start = Instant::now();
        let mut queue = ToastQueue::new(5, Duration::from_secs(5));
        queue.push(ToastLevel::Error, "old", start);
        queue.push(ToastLevel::Success, "new", start + Duration::from_secs(3));

        let active = queue.active(start + Duration::from_secs(5));

        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "new");
    }

    #[test]
    fn dismiss_removes_by_id() {
        let now = Instant::now();
        let mut queue = ToastQueue::new(5, Duration::from_secs(5));
        let first = queue.push(ToastLevel::Info, "a", now);
        queue.push(ToastLevel::Info, "b", now);

        queue.dismiss(first);

        let active = queue.active(now);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "b");
    }
}
