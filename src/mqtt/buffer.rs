//! Bounded message ring buffers
//!
//! Every inbound message lands in one buffer per matching subscription
//! filter; every successful publish lands in matching buffers plus the
//! cross-topic history. Buffers are FIFO with a hard capacity; readers
//! always receive snapshot copies.

use std::collections::VecDeque;
use std::time::Instant;

use serde_json::Value;

/// Decoded payload of a buffered message
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    /// Valid JSON
    Json(Value),
    /// Not JSON (or not UTF-8); decoded lossily for inspection
    Raw(String),
}

impl MessagePayload {
    /// Decode broker bytes: JSON when possible, lossy text otherwise
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).map_or_else(
            |_| Self::Raw(String::from_utf8_lossy(bytes).into_owned()),
            Self::Json,
        )
    }

    /// The JSON value, when this payload decoded as JSON
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }
}

/// Direction of a buffered message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Arrived from the broker
    Received,
    /// Published by this process
    Sent,
}

/// One message as seen by the buffers
#[derive(Debug, Clone)]
pub struct BufferedMessage {
    /// Concrete topic
    pub topic: String,

    /// Decoded payload
    pub payload: MessagePayload,

    /// Monotonic arrival/emission instant
    pub at: Instant,

    /// QoS the message carried
    pub qos: u8,

    /// Retain flag the message carried
    pub retain: bool,

    /// Received or sent
    pub kind: MessageKind,
}

impl BufferedMessage {
    /// Build a record stamped now
    #[must_use]
    pub fn new(topic: &str, payload: MessagePayload, qos: u8, retain: bool, kind: MessageKind) -> Self {
        Self {
            topic: topic.to_string(),
            payload,
            at: Instant::now(),
            qos,
            retain,
            kind,
        }
    }
}

/// Bounded FIFO ring of buffered messages
#[derive(Debug)]
pub struct RingBuffer {
    items: VecDeque<BufferedMessage>,
    capacity: usize,
    evicted: u64,
}

impl RingBuffer {
    /// Create a ring with the given capacity (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.clamp(1, 1024)),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    /// Append, evicting the oldest entry at capacity
    pub fn push(&mut self, message: BufferedMessage) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
            self.evicted += 1;
        }
        self.items.push_back(message);
    }

    /// Snapshot copy of the current contents, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<BufferedMessage> {
        self.items.iter().cloned().collect()
    }

    /// Drop all contents
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Change capacity, evicting oldest entries as needed
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.items.len() > self.capacity {
            self.items.pop_front();
            self.evicted += 1;
        }
    }

    /// Current length
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the ring is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Configured capacity
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total evictions since creation
    #[must_use]
    pub const fn evicted(&self) -> u64 {
        self.evicted
    }
}
