//! Pending-call registry and inbound demultiplexing.
//!
//! Each command id has at most one continuation. A report is routed to the
//! continuation registered for its command id. A final report unregisters the
//! continuation before it runs, so the continuation may issue a new `call` for
//! the same command id.

use crate::protocol;
use crate::session::ReportSink;
use crate::types::{CommandId, PendingPolicy};
use crate::{RawImuError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One slot per possible command id.
pub const REGISTRY_SLOTS: usize = CommandId::MAX as usize + 1;

/// One inbound report, as handed to a continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply<'a> {
    pub command: CommandId,
    pub payload: &'a [u8],
    /// No more reports follow for this response.
    pub is_final: bool,
}

type Handler = dyn FnMut(Reply<'_>) + Send;

/// Registered callback. Cloned out of the registry so it runs without the
/// registry lock held.
#[derive(Clone)]
struct Continuation(Arc<Mutex<Box<Handler>>>);

impl Continuation {
    fn new<F>(handler: F) -> Self
    where
        F: FnMut(Reply<'_>) + Send + 'static,
    {
        Continuation(Arc::new(Mutex::new(Box::new(handler))))
    }

    fn invoke(&self, reply: Reply<'_>) {
        let mut handler = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        (*handler)(reply);
    }
}

/// Outcome of routing one inbound report.
#[derive(Debug)]
pub enum Delivery {
    /// A continuation ran. When `is_final`, it has been unregistered.
    Delivered { command: CommandId, is_final: bool },
    /// Nobody was waiting for this command id.
    Orphaned(CommandId),
    /// The report could not be decoded.
    Malformed(RawImuError),
}

struct Registry {
    slots: [Option<Continuation>; REGISTRY_SLOTS],
}

impl Registry {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }
}

pub struct CommandDispatcher<S: ReportSink> {
    sink: S,
    registry: Mutex<Registry>,
    policy: PendingPolicy,
}

impl<S: ReportSink> CommandDispatcher<S> {
    pub fn new(sink: S, policy: PendingPolicy) -> Self {
        Self {
            sink,
            registry: Mutex::new(Registry::new()),
            policy,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encode and send `payload` for `command`, then register `continuation`
    /// for its replies.
    ///
    /// Nothing is registered if encoding or sending fails. Sending happens
    /// under the registry lock, so a reply is never routed before its
    /// continuation is in place.
    pub fn call<F>(&self, command: impl Into<CommandId>, payload: &[u8], continuation: F) -> Result<()>
    where
        F: FnMut(Reply<'_>) + Send + 'static,
    {
        let command = command.into();
        let mut registry = self.registry();
        let slot = &mut registry.slots[command as usize];

        if slot.is_some() && self.policy == PendingPolicy::Strict {
            return Err(RawImuError::AlreadyPending(command));
        }

        let report = protocol::encode_command(command, payload)?;
        self.sink.send_report(&report)?;

        let previous = slot.replace(Continuation::new(continuation));
        drop(registry);

        if previous.is_some() {
            log::warn!(
                "Command {} called while a reply was pending; previous continuation replaced",
                command
            );
        }
        log::debug!("Command {} sent ({} payload bytes)", command, payload.len());
        Ok(())
    }

    /// Route one raw inbound report (report-number byte included).
    ///
    /// Never fails: malformed and orphan reports are logged and reported
    /// through the returned [`Delivery`].
    pub fn on_report(&self, raw: &[u8]) -> Delivery {
        let frame = match protocol::decode_report(raw) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Dropping malformed report: {}", e);
                return Delivery::Malformed(e);
            }
        };

        let continuation = {
            let mut registry = self.registry();
            let slot = &mut registry.slots[frame.command as usize];
            if frame.is_final {
                slot.take()
            } else {
                slot.clone()
            }
        };

        let Some(continuation) = continuation else {
            log::warn!("{}, dropped", RawImuError::OrphanReport(frame.command));
            return Delivery::Orphaned(frame.command);
        };

        log::trace!(
            "Reply for command {}: {} bytes, final={}",
            frame.command,
            frame.declared_len,
            frame.is_final
        );
        continuation.invoke(Reply {
            command: frame.command,
            payload: frame.payload,
            is_final: frame.is_final,
        });

        Delivery::Delivered {
            command: frame.command,
            is_final: frame.is_final,
        }
    }

    /// Stop listening for `command` without waiting for a final report.
    /// Returns whether a continuation was registered.
    pub fn release(&self, command: impl Into<CommandId>) -> bool {
        let command = command.into();
        let previous = self.registry().slots[command as usize].take();
        if previous.is_some() {
            log::debug!("Released continuation for command {}", command);
        }
        previous.is_some()
    }

    pub fn is_pending(&self, command: impl Into<CommandId>) -> bool {
        self.registry().slots[command.into() as usize].is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.registry().slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn policy(&self) -> PendingPolicy {
        self.policy
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
