use crate::dispatcher::{CommandDispatcher, Delivery};
use crate::protocol::InboundReport;
use crate::session::{DeviceSession, ReportSink};
use crate::{RawImuError, Result};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often the worker thread wakes up to check its stop flag.
const WORKER_POLL: Duration = Duration::from_millis(100);

/// Single consumer of the inbound report queue.
///
/// Continuations run on whichever thread drives the pump, one at a time.
/// The pump is not `Clone` and every dispatch method takes `&mut self`, so
/// there is exactly one such thread.
pub struct ReportPump<S: ReportSink = DeviceSession> {
    receiver: Receiver<InboundReport>,
    dispatcher: Arc<CommandDispatcher<S>>,
}

impl<S: ReportSink + 'static> ReportPump<S> {
    pub fn new(receiver: Receiver<InboundReport>, dispatcher: Arc<CommandDispatcher<S>>) -> Self {
        Self {
            receiver,
            dispatcher,
        }
    }

    /// Route every report already queued, without blocking.
    /// Returns how many reports were taken off the queue.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(report) = self.receiver.try_recv() {
            self.dispatcher.on_report(report.as_bytes());
            count += 1;
        }
        count
    }

    /// Wait up to `timeout` for one report and route it.
    pub fn dispatch_timeout(&mut self, timeout: Duration) -> Result<Delivery> {
        let report = self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => RawImuError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => RawImuError::ChannelDisconnected,
        })?;
        Ok(self.dispatcher.on_report(report.as_bytes()))
    }

    /// Block until one report arrives and route it.
    pub fn dispatch_blocking(&mut self) -> Result<Delivery> {
        let report = self
            .receiver
            .recv()
            .map_err(|_| RawImuError::ChannelDisconnected)?;
        Ok(self.dispatcher.on_report(report.as_bytes()))
    }

    /// Reports waiting in the queue.
    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher<S>> {
        &self.dispatcher
    }

    /// Move the pump onto its own thread.
    pub fn spawn(self) -> Result<DispatchWorker> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let thread = std::thread::Builder::new()
            .name("rawimu-dispatch".into())
            .spawn(move || {
                let mut pump = self;
                log::info!("Dispatch worker started");
                while !stop_clone.load(Ordering::Relaxed) {
                    match pump.dispatch_timeout(WORKER_POLL) {
                        Ok(_) | Err(RawImuError::Timeout) => {}
                        Err(_) => {
                            log::info!("Report queue disconnected, dispatch worker stopping");
                            break;
                        }
                    }
                }
                log::info!("Dispatch worker stopped");
            })
            .map_err(RawImuError::Spawn)?;

        Ok(DispatchWorker {
            stop_flag,
            thread: Some(thread),
        })
    }
}

/// Handle to a pump running on its own thread. Stops and joins on drop.
pub struct DispatchWorker {
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl DispatchWorker {
    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the worker and wait for it to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_report, OutboundReport};
    use crate::types::{Command, PendingPolicy};
    use std::sync::Mutex;

    struct NullSink;

    impl ReportSink for NullSink {
        fn send_report(&self, _report: &OutboundReport) -> Result<()> {
            Ok(())
        }
    }

    fn setup() -> (
        crossbeam_channel::Sender<InboundReport>,
        ReportPump<NullSink>,
    ) {
        let (sender, receiver) = crossbeam_channel::bounded(16);
        let dispatcher = Arc::new(CommandDispatcher::new(NullSink, PendingPolicy::Replace));
        (sender, ReportPump::new(receiver, dispatcher))
    }

    fn report(command: Command, payload: &[u8], is_final: bool) -> InboundReport {
        InboundReport::from_wire_bytes(&encode_report(command.id(), payload, is_final).unwrap())
    }

    #[test]
    fn test_dispatch_pending_drains_queue() {
        let (sender, mut pump) = setup();
        let seen: Arc<Mutex<Vec<bool>>> = Arc::default();
        let s = seen.clone();
        pump.dispatcher()
            .call(Command::ReadRegs, &[0], move |reply| {
                s.lock().unwrap().push(reply.is_final)
            })
            .unwrap();

        sender.send(report(Command::ReadRegs, &[0, 1], false)).unwrap();
        sender.send(report(Command::ReadRegs, &[1, 2], false)).unwrap();
        sender.send(report(Command::ReadRegs, &[2, 3], true)).unwrap();
        sender.send(report(Command::ReadRegs, &[3, 4], true)).unwrap();
        assert_eq!(pump.queued(), 4);

        assert_eq!(pump.dispatch_pending(), 4);
        assert_eq!(*seen.lock().unwrap(), vec![false, false, true]);
        assert_eq!(pump.dispatch_pending(), 0);
    }

    #[test]
    fn test_dispatch_timeout_outcomes() {
        let (sender, mut pump) = setup();
        assert!(matches!(
            pump.dispatch_timeout(Duration::from_millis(5)),
            Err(RawImuError::Timeout)
        ));

        sender.send(report(Command::Stop, &[1], true)).unwrap();
        assert!(matches!(
            pump.dispatch_timeout(Duration::from_millis(5)),
            Ok(Delivery::Orphaned(1))
        ));

        drop(sender);
        assert!(matches!(
            pump.dispatch_timeout(Duration::from_millis(5)),
            Err(RawImuError::ChannelDisconnected)
        ));
        assert!(matches!(
            pump.dispatch_blocking(),
            Err(RawImuError::ChannelDisconnected)
        ));
    }

    #[test]
    fn test_worker_runs_continuations_on_its_own_thread() {
        let (sender, pump) = setup();
        let dispatcher = pump.dispatcher().clone();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        dispatcher
            .call(Command::Stop, &[], move |_reply| {
                let name = std::thread::current().name().map(str::to_owned);
                let _ = done_tx.send(name);
            })
            .unwrap();

        let worker = pump.spawn().unwrap();
        assert!(worker.is_active());
        sender.send(report(Command::Stop, &[1], true)).unwrap();

        let name = done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(name.as_deref(), Some("rawimu-dispatch"));
        assert!(!dispatcher.is_pending(Command::Stop));
        worker.stop();
    }

    #[test]
    fn test_worker_exits_when_queue_disconnects() {
        let (sender, pump) = setup();
        let worker = pump.spawn().unwrap();
        drop(sender);
        for _ in 0..50 {
            if !worker.is_active() {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!worker.is_active());
    }
}
