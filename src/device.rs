use crate::config::DeviceConfig;
use crate::dispatcher::{CommandDispatcher, Reply};
use crate::pump::ReportPump;
use crate::reader::ReportReader;
use crate::session::DeviceSession;
use crate::telemetry::RegisterMap;
use crate::types::{CommandId, FusionAlgorithm, MagCalibration, SensorSample};
use crate::Result;
use std::sync::Arc;

/// An opened IMU board: session, reader thread, dispatcher and report pump.
///
/// Replies are queued by the reader thread and only routed to continuations
/// when the pump runs. Take it with [`Device::take_pump`] and either drive it
/// from your own loop or [`ReportPump::spawn`] it.
pub struct Device {
    dispatcher: Arc<CommandDispatcher<DeviceSession>>,
    reader: ReportReader,
    pump: Option<ReportPump>,
}

impl Device {
    /// Open the board described by `config`. Tries once; returns
    /// `DeviceNotFound` if no matching interface is present.
    pub fn open(config: &DeviceConfig) -> Result<Device> {
        let session = DeviceSession::open(&config.identity)?;
        let reader_handle = session.open_reader()?;

        let (sender, receiver) = crossbeam_channel::bounded(config.queue_capacity);
        let dispatcher = Arc::new(CommandDispatcher::new(session, config.pending_policy));
        let reader = ReportReader::start(reader_handle, sender, config.read_timeout_ms)?;
        let pump = ReportPump::new(receiver, dispatcher.clone());

        log::info!(
            "IMU board ready (policy={:?}, queue={})",
            config.pending_policy,
            config.queue_capacity
        );

        Ok(Device {
            dispatcher,
            reader,
            pump: Some(pump),
        })
    }

    /// Open the board with the firmware's default USB identity.
    pub fn open_default() -> Result<Device> {
        Self::open(&DeviceConfig::default())
    }

    /// The single consumer of inbound reports. `None` once taken.
    pub fn take_pump(&mut self) -> Option<ReportPump> {
        self.pump.take()
    }

    /// Shared handle for continuations that need to issue further calls.
    pub fn dispatcher(&self) -> Arc<CommandDispatcher<DeviceSession>> {
        self.dispatcher.clone()
    }

    pub fn session(&self) -> &DeviceSession {
        self.dispatcher.sink()
    }

    /// Send a raw command and register `continuation` for its replies.
    pub fn call<F>(&self, command: impl Into<CommandId>, payload: &[u8], continuation: F) -> Result<()>
    where
        F: FnMut(Reply<'_>) + Send + 'static,
    {
        self.dispatcher.call(command, payload, continuation)
    }

    pub fn release(&self, command: impl Into<CommandId>) -> bool {
        self.dispatcher.release(command)
    }

    pub fn is_pending(&self, command: impl Into<CommandId>) -> bool {
        self.dispatcher.is_pending(command)
    }

    pub fn start_sensors<F>(&self, rate_divider: u8, algorithm: FusionAlgorithm, on_sample: F) -> Result<()>
    where
        F: FnMut(Result<SensorSample>) + Send + 'static,
    {
        self.dispatcher.start_sensors(rate_divider, algorithm, on_sample)
    }

    pub fn stop_sensors<F>(&self, on_stopped: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        self.dispatcher.stop_sensors(on_stopped)
    }

    pub fn calibrate_magnetometer<F>(&self, on_result: F) -> Result<()>
    where
        F: FnMut(Result<MagCalibration>) + Send + 'static,
    {
        self.dispatcher.calibrate_magnetometer(on_result)
    }

    pub fn read_registers<F>(&self, setup: bool, on_complete: F) -> Result<()>
    where
        F: FnMut(Result<RegisterMap>) + Send + 'static,
    {
        self.dispatcher.read_registers(setup, on_complete)
    }

    /// Whether the reader thread is still receiving reports.
    pub fn is_reading(&self) -> bool {
        self.reader.is_running()
    }

    /// Stop the reader thread and release the device handle. Idempotent.
    ///
    /// Pending continuations stay registered but will not be called again.
    pub fn close(&mut self) {
        self.reader.stop();
        self.dispatcher.sink().close();
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.close();
    }
}
