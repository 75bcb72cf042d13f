//! InMemoryEventSource - development / test message transport.
//!
//! # Behaviour
//! - `publish` enqueues a message on an unbounded channel
//! - `next` hands out messages with a fresh delivery tag and tracks them as
//!   in flight until acked or nacked
//! - `nack` puts the message back on the channel (redelivery); after
//!   `redelivery_limit` nacks the message is dead-lettered instead
//! - `close` wakes up every pending `next` with `None`

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::{DeliveryTag, InboundMessage, TetherError};
use crate::ports::EventSource;

const DEFAULT_REDELIVERY_LIMIT: u32 = 5;

#[derive(Debug, Clone)]
struct Envelope {
    exchange: String,
    payload: Value,
    nacks: u32,
}

#[derive(Debug, Default)]
struct SourceState {
    bindings: HashSet<String>,
    connected: bool,
    next_tag: u64,
    in_flight: HashMap<DeliveryTag, Envelope>,
    acked: usize,
    nacked: usize,
    dead_lettered: Vec<(String, Value)>,
}

/// Counters for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCounts {
    pub acked: usize,
    pub nacked: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
}

pub struct InMemoryEventSource {
    state: Mutex<SourceState>,
    tx: mpsc::UnboundedSender<Envelope>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope>>,
    closed: CancellationToken,
    redelivery_limit: u32,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::with_redelivery_limit(DEFAULT_REDELIVERY_LIMIT)
    }

    pub fn with_redelivery_limit(redelivery_limit: u32) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(SourceState::default()),
            tx,
            rx: tokio::sync::Mutex::new(rx),
            closed: CancellationToken::new(),
            redelivery_limit,
        }
    }

    /// Counters and in-flight bookkeeping stay consistent across a panic
    /// in another holder, so a poisoned lock is recovered.
    fn lock(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish a message on `exchange`.
    pub fn publish(&self, exchange: &str, payload: Value) -> Result<(), TetherError> {
        self.tx
            .send(Envelope {
                exchange: exchange.to_string(),
                payload,
                nacks: 0,
            })
            .map_err(|_| TetherError::Source("event source is closed".to_string()))
    }

    pub fn bindings(&self) -> Result<Vec<String>, TetherError> {
        let mut bindings: Vec<String> = self.lock().bindings.iter().cloned().collect();
        bindings.sort();
        Ok(bindings)
    }

    pub fn is_connected(&self) -> Result<bool, TetherError> {
        Ok(self.lock().connected)
    }

    pub fn counts(&self) -> Result<SourceCounts, TetherError> {
        let state = self.lock();
        Ok(SourceCounts {
            acked: state.acked,
            nacked: state.nacked,
            in_flight: state.in_flight.len(),
            dead_lettered: state.dead_lettered.len(),
        })
    }
}

impl Default for InMemoryEventSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn bind(&self, exchange: &str) -> Result<(), TetherError> {
        self.lock().bindings.insert(exchange.to_string());
        Ok(())
    }

    async fn connect(&self) -> Result<(), TetherError> {
        if self.closed.is_cancelled() {
            return Err(TetherError::Source("cannot connect a closed source".to_string()));
        }
        self.lock().connected = true;
        Ok(())
    }

    async fn next(&self) -> Option<InboundMessage> {
        let envelope = {
            let mut rx = tokio::select! {
                _ = self.closed.cancelled() => return None,
                rx = self.rx.lock() => rx,
            };
            tokio::select! {
                _ = self.closed.cancelled() => return None,
                envelope = rx.recv() => envelope?,
            }
        };

        let mut state = self.lock();
        state.next_tag += 1;
        let delivery = DeliveryTag(state.next_tag);
        let message = InboundMessage {
            exchange: envelope.exchange.clone(),
            payload: envelope.payload.clone(),
            delivery,
            redelivered: envelope.nacks > 0,
        };
        state.in_flight.insert(delivery, envelope);
        Some(message)
    }

    async fn ack(&self, delivery: DeliveryTag) -> Result<(), TetherError> {
        let mut state = self.lock();
        state
            .in_flight
            .remove(&delivery)
            .ok_or_else(|| TetherError::Source(format!("unknown delivery {delivery:?}")))?;
        state.acked += 1;
        Ok(())
    }

    async fn nack(&self, delivery: DeliveryTag) -> Result<(), TetherError> {
        let mut envelope = {
            let mut state = self.lock();
            let envelope = state
                .in_flight
                .remove(&delivery)
                .ok_or_else(|| TetherError::Source(format!("unknown delivery {delivery:?}")))?;
            state.nacked += 1;
            envelope
        };
        envelope.nacks += 1;
        if envelope.nacks > self.redelivery_limit {
            self.lock()
                .dead_lettered
                .push((envelope.exchange, envelope.payload));
            return Ok(());
        }
        self.tx
            .send(envelope)
            .map_err(|_| TetherError::Source("redelivery channel is gone".to_string()))
    }

    async fn close(&self) -> Result<(), TetherError> {
        self.closed.cancel();
        self.lock().connected = false;
        Ok(())
    }
}
