use crate::protocol::{InboundReport, REPORT_SIZE};
use crate::{RawImuError, Result};
use crossbeam_channel::{SendTimeoutError, Sender, TrySendError};
use hidapi::HidDevice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Consecutive read failures after which the device is considered gone.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// How long a blocked final report waits on the queue before the stop flag
/// is checked again.
const FINAL_SEND_POLL: Duration = Duration::from_millis(100);

/// Background thread that reads HID input reports and forwards them, undecoded,
/// to the report queue.
///
/// It never runs continuations; that is the pump's job.
pub(crate) struct ReportReader {
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ReportReader {
    /// Start the reader thread. It owns `device` and polls it every
    /// `read_timeout_ms` to check the stop flag.
    pub(crate) fn start(
        device: HidDevice,
        sender: Sender<InboundReport>,
        read_timeout_ms: i32,
    ) -> Result<ReportReader> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let thread = std::thread::Builder::new()
            .name("rawimu-reader".into())
            .spawn(move || {
                reader_loop(device, sender, stop_clone, read_timeout_ms);
            })
            .map_err(RawImuError::Spawn)?;

        Ok(ReportReader {
            stop_flag,
            thread: Some(thread),
        })
    }

    pub(crate) fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the thread and wait for it to exit. Idempotent.
    pub(crate) fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ReportReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Each read yields one 64-byte report without the report-number byte;
/// `InboundReport` puts the prefix back.
fn reader_loop(
    device: HidDevice,
    sender: Sender<InboundReport>,
    stop_flag: Arc<AtomicBool>,
    read_timeout_ms: i32,
) {
    let mut buf = [0u8; REPORT_SIZE];
    let mut consecutive_errors = 0u32;

    log::info!("Report reader started");

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            log::info!("Report reader stopping (stop flag set)");
            break;
        }

        let len = match device.read_timeout(&mut buf, read_timeout_ms) {
            Ok(0) => continue,
            Ok(n) => {
                consecutive_errors = 0;
                n
            }
            Err(e) => {
                consecutive_errors += 1;
                log::warn!("HID read error: {}", e);
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    log::error!("Report reader giving up after {} read errors", consecutive_errors);
                    break;
                }
                continue;
            }
        };

        let report = InboundReport::from_device_bytes(&buf[..len]);
        match forward_report(&sender, report, &stop_flag) {
            Forwarded::Queued | Forwarded::Dropped => {}
            Forwarded::Disconnected => {
                log::info!("Report queue disconnected, stopping reader");
                break;
            }
            Forwarded::Stopped => {
                log::info!("Report reader stopping (stop flag set)");
                break;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Forwarded {
    Queued,
    Dropped,
    Disconnected,
    Stopped,
}

/// Push one report onto the queue.
///
/// Streamed reports are dropped when the queue is full. A final report ends a
/// response, so it waits for room instead; meanwhile the OS buffers further
/// input.
fn forward_report(
    sender: &Sender<InboundReport>,
    report: InboundReport,
    stop_flag: &AtomicBool,
) -> Forwarded {
    if !report.is_final() {
        return match sender.try_send(report) {
            Ok(()) => Forwarded::Queued,
            Err(TrySendError::Full(report)) => {
                log::warn!(
                    "Report queue full, dropping report for command {}",
                    report.command()
                );
                Forwarded::Dropped
            }
            Err(TrySendError::Disconnected(_)) => Forwarded::Disconnected,
        };
    }

    let mut pending = report;
    loop {
        match sender.send_timeout(pending, FINAL_SEND_POLL) {
            Ok(()) => return Forwarded::Queued,
            Err(SendTimeoutError::Disconnected(_)) => return Forwarded::Disconnected,
            Err(SendTimeoutError::Timeout(report)) => {
                if stop_flag.load(Ordering::Relaxed) {
                    return Forwarded::Stopped;
                }
                log::debug!(
                    "Report queue full, holding final report for command {}",
                    report.command()
                );
                pending = report;
            }
        }
    }
}
