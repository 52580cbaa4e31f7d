//! Mock transport for testing.
//!
//! Allows queueing responses and capturing sent messages for verification.
//! Unlike a socket, nothing arrives until the test queues it: `recv()` waits
//! for [`MockTransport::queue_response`] or [`MockTransport::close_remote`].

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Mock transport for testing.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    wakeup: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connected_address: Option<String>,
    remote_closed: bool,
    sent_messages: Vec<Vec<u8>>,
    receive_queue: VecDeque<Vec<u8>>,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a message to be returned by a `recv()` call.
    pub fn queue_response(&self, data: Vec<u8>) {
        self.lock().receive_queue.push_back(data);
        self.wakeup.notify_waiters();
    }

    /// Simulate the conductor closing the connection.
    ///
    /// Queued messages are still delivered first.
    pub fn close_remote(&self) {
        self.lock().remote_closed = true;
        self.wakeup.notify_waiters();
    }

    /// Get all messages that were sent.
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        self.lock().sent_messages.clone()
    }

    /// Get the last message that was sent.
    pub fn last_sent(&self) -> Option<Vec<u8>> {
        self.lock().sent_messages.last().cloned()
    }

    /// Get the address that was connected to.
    pub fn connected_address(&self) -> Option<String> {
        self.lock().connected_address.clone()
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.lock().fail_next_connect = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.lock().fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        self.lock().fail_next_recv = Some(error.to_string());
        self.wakeup.notify_waiters();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();

        // Check for forced failure
        if let Some(error) = inner.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.connected = true;
        inner.connected_address = Some(address.to_string());
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.lock();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent_messages.push(data.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        loop {
            // Registered before checking so a wakeup between check and await
            // is not lost
            let notified = self.wakeup.notified();
            {
                let mut inner = self.lock();

                if !inner.connected {
                    return Err(TransportError::NotConnected);
                }
                if let Some(error) = inner.fail_next_recv.take() {
                    return Err(TransportError::ReceiveFailed(error));
                }
                if let Some(data) = inner.receive_queue.pop_front() {
                    return Ok(data);
                }
                if inner.remote_closed {
                    inner.connected = false;
                    return Err(TransportError::ConnectionClosed);
                }
            }
            notified.await;
        }
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.lock().connected = false;
        self.wakeup.notify_waiters();
        Ok(())
    }
}
