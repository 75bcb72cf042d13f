//! Handler - consumes lifecycle events and dispatches them.
//!
//! # Flow
//! 1. `setup()` binds task-defined / task-completed, connects, and spawns
//!    the consume loop
//! 2. The loop pulls one message per free `prefetch` slot and handles it
//!    on its own tokio task
//! 3. `Ok` -> ack, `Err` -> nack (the source redelivers later)
//! 4. `terminate()` stops intake, waits for in-flight messages, closes the
//!    source

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::domain::{Exchanges, InboundMessage, TaskEvent, TetherError};
use crate::ports::EventSource;

use super::maintainer::{DefineOutcome, DependencyMaintainer};
use super::propagator::{CompletionPropagator, PropagationReport};

/// What handling one message produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    Defined(DefineOutcome),
    Completed(PropagationReport),
}

/// Routes a message to the maintainer or the propagator by exchange.
#[derive(Clone)]
pub struct Dispatcher {
    exchanges: Exchanges,
    maintainer: DependencyMaintainer,
    propagator: CompletionPropagator,
}

impl Dispatcher {
    pub fn new(
        exchanges: Exchanges,
        maintainer: DependencyMaintainer,
        propagator: CompletionPropagator,
    ) -> Self {
        Self {
            exchanges,
            maintainer,
            propagator,
        }
    }

    pub fn exchanges(&self) -> &Exchanges {
        &self.exchanges
    }

    pub async fn dispatch(&self, message: &InboundMessage) -> Result<Handled, TetherError> {
        let event = TaskEvent::decode(message, &self.exchanges).inspect_err(|err| {
            error!(
                alert = "operator",
                exchange = %message.exchange,
                payload = %message.payload,
                error = %err,
                "received message from unexpected exchange or with bad payload"
            );
        })?;

        match event {
            TaskEvent::Defined(task_id) => self
                .maintainer
                .on_task_defined(&task_id)
                .await
                .map(Handled::Defined),
            TaskEvent::Completed(task_id) => self
                .propagator
                .on_task_completed(&task_id)
                .await
                .map(Handled::Completed),
        }
    }
}

struct Listener {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Long-running event consumer.
pub struct Handler {
    dispatcher: Arc<Dispatcher>,
    source: Arc<dyn EventSource>,
    prefetch: usize,
    listener: Mutex<Option<Listener>>,
    started: AtomicBool,
}

impl Handler {
    pub fn new(dispatcher: Dispatcher, source: Arc<dyn EventSource>, prefetch: usize) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            source,
            prefetch: prefetch.max(1),
            listener: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Bind, connect and start consuming. Fails if called twice.
    pub async fn setup(&self) -> Result<(), TetherError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TetherError::Setup("cannot setup twice".to_string()));
        }

        let exchanges = self.dispatcher.exchanges();
        self.source.bind(&exchanges.task_defined).await?;
        self.source.bind(&exchanges.task_completed).await?;
        self.source.connect().await?;

        let cancel = CancellationToken::new();
        let join = tokio::spawn(consume_loop(
            Arc::clone(&self.source),
            Arc::clone(&self.dispatcher),
            self.prefetch,
            cancel.clone(),
        ));
        let mut listener = self
            .listener
            .lock()
            .map_err(|e| TetherError::Setup(format!("lock poisoned: {e}")))?;
        *listener = Some(Listener { cancel, join });
        info!(prefetch = self.prefetch, "started listening for tasks");
        Ok(())
    }

    /// Stop consuming, wait for in-flight messages, release the source.
    ///
    /// Calling it before `setup` (or twice) only closes the source.
    pub async fn terminate(&self) -> Result<(), TetherError> {
        let listener = self
            .listener
            .lock()
            .map_err(|e| TetherError::Setup(format!("lock poisoned: {e}")))?
            .take();
        if let Some(Listener { cancel, join }) = listener {
            cancel.cancel();
            if let Err(e) = join.await {
                error!(error = %e, "consume loop panicked");
            }
        }
        self.source.close().await?;
        info!("stopped listening for tasks");
        Ok(())
    }
}

async fn consume_loop(
    source: Arc<dyn EventSource>,
    dispatcher: Arc<Dispatcher>,
    prefetch: usize,
    cancel: CancellationToken,
) {
    let slots = Arc::new(Semaphore::new(prefetch));
    let mut in_flight = JoinSet::new();

    loop {
        // prefetch: don't pull another message until a slot is free
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = source.next() => message,
        };
        let Some(message) = message else {
            debug!("event source closed");
            break;
        };

        while let Some(done) = in_flight.try_join_next() {
            if let Err(e) = done {
                error!(error = %e, "message handler panicked");
            }
        }

        let source = Arc::clone(&source);
        let dispatcher = Arc::clone(&dispatcher);
        let span = info_span!(
            "message",
            exchange = %message.exchange,
            delivery = message.delivery.0,
            redelivered = message.redelivered
        );
        in_flight.spawn(
            async move {
                let _permit = permit;
                handle_one(source.as_ref(), &dispatcher, message).await;
            }
            .instrument(span),
        );
    }

    // graceful: in-flight handlers finish and get acked / nacked
    while let Some(done) = in_flight.join_next().await {
        if let Err(e) = done {
            error!(error = %e, "message handler panicked");
        }
    }
}

async fn handle_one(source: &dyn EventSource, dispatcher: &Dispatcher, message: InboundMessage) {
    let started = Instant::now();
    let result = dispatcher.dispatch(&message).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(handled) => {
            debug!(elapsed_ms, outcome = ?handled, "message handled");
            if let Err(e) = source.ack(message.delivery).await {
                warn!(error = %e, "ack failed");
            }
        }
        Err(err) => {
            warn!(elapsed_ms, error = %err, kind = ?err.kind(), "message handling failed, requesting redelivery");
            if let Err(e) = source.nack(message.delivery).await {
                warn!(error = %e, "nack failed");
            }
        }
    }
}
