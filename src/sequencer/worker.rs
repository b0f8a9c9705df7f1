//! The single-consumer command sequencer (§4.11, §5). Grounded on
//! `original_source/src/disruptor.h`'s `MatchingLoop` (one dedicated
//! matching thread draining an MPSC queue of commands, each optionally
//! carrying a response channel), reimplemented with
//! `crossbeam::channel::bounded` standing in for the original's
//! hand-rolled `spsc_queue.h` ring buffer — the teacher depends on
//! `crossbeam` without reaching for its channel module anywhere in the
//! sampled code; this is where that dependency earns a real call site.

use std::sync::mpsc::{sync_channel, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, Sender, TrySendError};
use tracing::warn;

use crate::sequencer::error::SequencerError;
use crate::sequencer::types::{Command, CommandResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

struct Envelope {
    command: Command,
    respond: Option<std::sync::mpsc::SyncSender<CommandResponse>>,
}

struct Inner {
    sender: Sender<Envelope>,
    worker: Option<JoinHandle<()>>,
}

/// Cloneable handle to the running sequencer thread. All mutating
/// operations funnel through `submit_sync`/`submit_async`; the consumer
/// thread applies them strictly in arrival order (§5 Ordering
/// guarantees).
#[derive(Clone)]
pub struct Sequencer {
    inner: Arc<Inner>,
}

impl Sequencer {
    /// Spawns the consumer thread. `capacity` should be a power of two
    /// (§5 memory discipline); `handler` runs exclusively on the
    /// consumer thread and must not block on I/O.
    pub fn spawn<F>(capacity: usize, mut handler: F) -> Self
    where
        F: FnMut(Command) -> CommandResponse + Send + 'static,
    {
        let (sender, receiver) = bounded::<Envelope>(capacity);
        let worker = std::thread::Builder::new()
            .name("command-sequencer".to_string())
            .spawn(move || {
                for envelope in receiver.iter() {
                    let response = handler(envelope.command);
                    if let Some(respond) = envelope.respond {
                        if respond.send(response).is_err() {
                            warn!("sequencer response channel dropped before reply delivered");
                        }
                    }
                }
            })
            .expect("failed to spawn command-sequencer thread");

        Self {
            inner: Arc::new(Inner {
                sender,
                worker: Some(worker),
            }),
        }
    }

    /// Enqueues `command` and blocks until either a response arrives or
    /// `timeout` elapses. On timeout the command is **not** cancelled —
    /// the consumer still executes it when it reaches the front of the
    /// queue (§5 Cancellation and timeouts); this call simply stops
    /// waiting.
    pub fn submit_sync(&self, command: Command, timeout: Duration) -> Result<CommandResponse, SequencerError> {
        let (respond, response_rx) = sync_channel(1);
        let envelope = Envelope {
            command,
            respond: Some(respond),
        };
        self.inner
            .sender
            .try_send(envelope)
            .map_err(|e| match e {
                TrySendError::Full(_) => SequencerError::QueueFull,
                TrySendError::Disconnected(_) => SequencerError::Closed,
            })?;

        match response_rx.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => Err(SequencerError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(SequencerError::Closed),
        }
    }

    pub fn submit(&self, command: Command) -> Result<CommandResponse, SequencerError> {
        self.submit_sync(command, DEFAULT_TIMEOUT)
    }

    /// Fire-and-forget: enqueues without waiting for a response.
    pub fn submit_async(&self, command: Command) -> Result<(), SequencerError> {
        let envelope = Envelope {
            command,
            respond: None,
        };
        self.inner.sender.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => SequencerError::QueueFull,
            TrySendError::Disconnected(_) => SequencerError::Closed,
        })
    }

    /// Tokio-friendly wrapper around [`Sequencer::submit_sync`] for
    /// async call sites (§6: "each has a synchronous and asynchronous
    /// form"); the blocking wait itself still happens off the async
    /// runtime's worker threads.
    pub async fn submit_async_await(&self, command: Command, timeout: Duration) -> Result<CommandResponse, SequencerError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.submit_sync(command, timeout))
            .await
            .map_err(|_| SequencerError::Closed)?
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            if !handle.is_finished() {
                // Closing the sender lets the consumer's `for envelope in
                // receiver.iter()` loop drain and exit on its own; we
                // don't block shutdown waiting for it here.
                let _ = handle;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderType, Side};

    #[test]
    fn commands_are_applied_in_arrival_order() {
        let order_log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = order_log.clone();
        let sequencer = Sequencer::spawn(16, move |command| {
            if let Command::Deposit { user, amount } = command {
                log.lock().unwrap().push((user, amount));
            }
            CommandResponse::Ack
        });

        for i in 0..5 {
            sequencer
                .submit(Command::Deposit {
                    user: "u1".to_string(),
                    amount: i,
                })
                .unwrap();
        }

        assert_eq!(
            order_log.lock().unwrap().clone(),
            vec![
                ("u1".to_string(), 0),
                ("u1".to_string(), 1),
                ("u1".to_string(), 2),
                ("u1".to_string(), 3),
                ("u1".to_string(), 4),
            ]
        );
    }

    #[test]
    fn submit_async_does_not_block_on_a_response() {
        let sequencer = Sequencer::spawn(16, |_command| CommandResponse::Ack);
        sequencer
            .submit_async(Command::CancelOrder {
                symbol: "XAU-PERP".to_string(),
                order_id: 1,
            })
            .unwrap();
    }

    #[test]
    fn handler_sees_the_submitted_order_fields() {
        let seen_qty = Arc::new(std::sync::Mutex::new(0i64));
        let captured = seen_qty.clone();
        let sequencer = Sequencer::spawn(16, move |command| {
            if let Command::SubmitOrder { quantity, .. } = command {
                *captured.lock().unwrap() = quantity;
            }
            CommandResponse::Ack
        });
        let response = sequencer
            .submit(Command::SubmitOrder {
                symbol: "XAU-PERP".to_string(),
                user: "u1".to_string(),
                side: Side::Buy,
                order_type: OrderType::Limit,
                price: 100,
                stop_price: 0,
                quantity: 7,
                client_id: None,
            })
            .unwrap();
        assert!(matches!(response, CommandResponse::Ack));
        assert_eq!(*seen_qty.lock().unwrap(), 7);
    }
}
