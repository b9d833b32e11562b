// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock relay transport for deterministic testing.
//!
//! [`MockRelay`] implements `RelayTransport` with injectable inbound events
//! (or receive errors) and captured outbound events for assertion. The
//! transport half is moved into a connection manager; the [`MockRelayHandle`]
//! keeps shared access for the test body.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::traits::auth::Credentials;
use parley_core::{ParleyError, RelayEvent, RelayTransport};
use tokio::sync::{Mutex, Notify};

#[derive(Default)]
struct MockRelayInner {
    /// Inbound queue: events, or error messages for injected failures.
    inbound: Mutex<VecDeque<Result<RelayEvent, String>>>,
    inbound_notify: Notify,
    sent: Mutex<Vec<RelayEvent>>,
    sent_notify: Notify,
    connect_count: AtomicU32,
    fail_connects_remaining: AtomicU32,
    connected: AtomicBool,
}

/// A mock realtime relay for testing.
pub struct MockRelay {
    inner: Arc<MockRelayInner>,
}

/// Shared test-side handle to a [`MockRelay`].
#[derive(Clone)]
pub struct MockRelayHandle {
    inner: Arc<MockRelayInner>,
}

impl MockRelay {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockRelayInner::default()),
        }
    }

    /// Handle retaining access after the transport is moved into a manager.
    pub fn handle(&self) -> MockRelayHandle {
        MockRelayHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for MockRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRelayHandle {
    /// Queue an inbound event; the next `receive()` returns it.
    pub async fn inject_event(&self, event: RelayEvent) {
        self.inner.inbound.lock().await.push_back(Ok(event));
        self.inner.inbound_notify.notify_one();
    }

    /// Queue an inbound receive failure.
    pub async fn inject_receive_error(&self, message: &str) {
        self.inner
            .inbound
            .lock()
            .await
            .push_back(Err(message.to_string()));
        self.inner.inbound_notify.notify_one();
    }

    /// All events passed to `send()` so far, across reconnects.
    pub async fn sent_events(&self) -> Vec<RelayEvent> {
        self.inner.sent.lock().await.clone()
    }

    /// Number of `connect()` calls, successful or failed.
    pub fn connect_count(&self) -> u32 {
        self.inner.connect_count.load(Ordering::SeqCst)
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.inner
            .fail_connects_remaining
            .store(n, Ordering::SeqCst);
    }

    /// Block until at least `count` events have been sent.
    ///
    /// # Panics
    /// Panics if the count is not reached within `timeout`.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.inner.sent.lock().await.len() >= count {
                return;
            }
            if tokio::time::timeout_at(deadline, self.inner.sent_notify.notified())
                .await
                .is_err()
            {
                panic!("timed out waiting for {count} sent events");
            }
        }
    }
}

#[async_trait]
impl RelayTransport for MockRelay {
    async fn connect(&mut self, _credentials: &Credentials) -> Result<(), ParleyError> {
        self.inner.connect_count.fetch_add(1, Ordering::SeqCst);
        let remaining = self.inner.fail_connects_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.inner
                .fail_connects_remaining
                .store(remaining - 1, Ordering::SeqCst);
            return Err(ParleyError::connection("mock connect failure"));
        }
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&mut self, event: &RelayEvent) -> Result<(), ParleyError> {
        if !self.inner.connected.load(Ordering::SeqCst) {
            return Err(ParleyError::connection("mock transport not connected"));
        }
        self.inner.sent.lock().await.push(event.clone());
        self.inner.sent_notify.notify_one();
        Ok(())
    }

    async fn receive(&mut self) -> Result<RelayEvent, ParleyError> {
        loop {
            if let Some(item) = self.inner.inbound.lock().await.pop_front() {
                return item.map_err(ParleyError::connection);
            }
            self.inner.inbound_notify.notified().await;
        }
    }

    async fn close(&mut self) -> Result<(), ParleyError> {
        self.inner.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
