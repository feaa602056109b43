//! Mock channel for testing.
//!
//! Allows queueing inbound frames and capturing sent frames for verification.

use super::{Channel, ChannelError};
use async_trait::async_trait;
use codesync_types::Message;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Mock channel for testing.
///
/// Clones share state, so a test can keep one handle while the client owns
/// another.
#[derive(Debug, Default)]
pub struct MockChannel {
    inner: Arc<Mutex<MockChannelInner>>,
}

#[derive(Debug, Default)]
struct MockChannelInner {
    connected: bool,
    connected_address: Option<String>,
    connect_count: usize,
    close_count: usize,
    sent_frames: Vec<Vec<u8>>,
    receive_queue: VecDeque<Vec<u8>>,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
}

impl MockChannel {
    /// Create a new mock channel.
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MockChannelInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a raw frame to be returned by the next `recv()` call.
    pub fn queue_frame(&self, frame: Vec<u8>) {
        self.inner().receive_queue.push_back(frame);
    }

    /// Encode and queue a message.
    pub fn queue_message(&self, message: &Message) {
        // Every Message variant is plain data and encodes infallibly.
        if let Ok(frame) = message.to_bytes() {
            self.queue_frame(frame);
        }
    }

    /// Get all raw frames that were sent.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.inner().sent_frames.clone()
    }

    /// Decode all sent frames. Frames that fail to decode are skipped.
    pub fn sent_messages(&self) -> Vec<Message> {
        self.inner()
            .sent_frames
            .iter()
            .filter_map(|f| Message::from_bytes(f).ok())
            .collect()
    }

    /// Get the last message that was sent.
    pub fn last_sent(&self) -> Option<Message> {
        let inner = self.inner();
        inner
            .sent_frames
            .last()
            .and_then(|f| Message::from_bytes(f).ok())
    }

    /// Forget the frames sent so far.
    pub fn clear_sent(&self) {
        self.inner().sent_frames.clear();
    }

    /// Get the address that was connected to.
    pub fn connected_address(&self) -> Option<String> {
        self.inner().connected_address.clone()
    }

    /// Number of successful `connect()` calls.
    pub fn connect_count(&self) -> usize {
        self.inner().connect_count
    }

    /// Number of `close()` calls.
    pub fn close_count(&self) -> usize {
        self.inner().close_count
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.inner().fail_next_connect = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.inner().fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        self.inner().fail_next_recv = Some(error.to_string());
    }

    /// Simulate the server going away without a close handshake.
    pub fn drop_connection(&self) {
        let mut inner = self.inner();
        inner.connected = false;
        inner.receive_queue.clear();
    }

    /// Clear all state (frames, queue, connection, counters).
    pub fn reset(&self) {
        *self.inner() = MockChannelInner::default();
    }
}

impl Clone for MockChannel {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn connect(&self, address: &str) -> Result<(), ChannelError> {
        let mut inner = self.inner();

        // Check for forced failure
        if let Some(error) = inner.fail_next_connect.take() {
            return Err(ChannelError::ConnectionFailed(error));
        }

        inner.connected = true;
        inner.connect_count += 1;
        inner.connected_address = Some(address.to_string());
        Ok(())
    }

    async fn send(&self, frame: &[u8]) -> Result<(), ChannelError> {
        let mut inner = self.inner();

        if !inner.connected {
            return Err(ChannelError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(ChannelError::SendFailed(error));
        }

        inner.sent_frames.push(frame.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        let mut inner = self.inner();

        if !inner.connected {
            return Err(ChannelError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_recv.take() {
            return Err(ChannelError::ReceiveFailed(error));
        }

        inner
            .receive_queue
            .pop_front()
            .ok_or(ChannelError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.inner().connected
    }

    async fn close(&self) -> Result<(), ChannelError> {
        let mut inner = self.inner();
        inner.connected = false;
        inner.close_count += 1;
        Ok(())
    }
}
