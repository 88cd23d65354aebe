//! Typed wrappers around [`CommandDispatcher::call`] for the firmware command set.
//!
//! Each wrapper builds the request payload and decodes replies before handing
//! them to the caller's continuation.

use crate::dispatcher::CommandDispatcher;
use crate::protocol;
use crate::session::ReportSink;
use crate::telemetry::{self, RegisterMap};
use crate::types::{Command, FusionAlgorithm, MagCalibration, SensorSample};
use crate::Result;
use std::sync::Arc;

impl<S: ReportSink + 'static> CommandDispatcher<S> {
    /// Start streaming. `on_sample` runs once per streamed report until the
    /// stream is stopped or released.
    pub fn start_sensors<F>(
        &self,
        rate_divider: u8,
        algorithm: FusionAlgorithm,
        mut on_sample: F,
    ) -> Result<()>
    where
        F: FnMut(Result<SensorSample>) + Send + 'static,
    {
        let payload = protocol::start_sensors_payload(rate_divider, algorithm);
        self.call(Command::StartSensors, &payload, move |reply| {
            on_sample(telemetry::decode_sensor_sample(reply.payload))
        })
    }

    /// Stop the firmware's current task. When the ack arrives the
    /// `StartSensors` continuation is released and `on_stopped` runs.
    pub fn stop_sensors<F>(self: &Arc<Self>, mut on_stopped: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        let dispatcher = Arc::downgrade(self);
        self.call(Command::Stop, &[], move |reply| {
            if !reply.is_final {
                return;
            }
            if let Some(dispatcher) = dispatcher.upgrade() {
                dispatcher.release(Command::StartSensors);
            }
            on_stopped();
        })
    }

    /// Run the magnetometer calibration. The device answers once, after
    /// roughly 20 seconds of sampling.
    pub fn calibrate_magnetometer<F>(&self, mut on_result: F) -> Result<()>
    where
        F: FnMut(Result<MagCalibration>) + Send + 'static,
    {
        self.call(Command::MagCalib, &[], move |reply| {
            on_result(telemetry::decode_mag_calibration(reply.payload))
        })
    }

    /// Dump the register file, assembling chunks until the final one.
    ///
    /// `on_complete` gets the assembled map once. A chunk that fails to decode
    /// is reported immediately as an error; assembly continues with the rest.
    pub fn read_registers<F>(&self, setup: bool, mut on_complete: F) -> Result<()>
    where
        F: FnMut(Result<RegisterMap>) + Send + 'static,
    {
        let mut map = RegisterMap::new();
        self.call(
            Command::ReadRegs,
            &protocol::read_regs_payload(setup),
            move |reply| {
                match telemetry::decode_register_chunk(reply.payload) {
                    Ok(chunk) => {
                        map.apply(&chunk);
                    }
                    Err(e) => on_complete(Err(e)),
                }
                if reply.is_final {
                    on_complete(Ok(std::mem::take(&mut map)));
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_report, OutboundReport};
    use crate::telemetry::encode_sensor_sample;
    use crate::types::PendingPolicy;
    use crate::RawImuError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox(Mutex<Vec<OutboundReport>>);

    impl ReportSink for Outbox {
        fn send_report(&self, report: &OutboundReport) -> Result<()> {
            self.0.lock().unwrap().push(*report);
            Ok(())
        }
    }

    fn dispatcher() -> Arc<CommandDispatcher<Outbox>> {
        Arc::new(CommandDispatcher::new(Outbox::default(), PendingPolicy::Replace))
    }

    #[test]
    fn test_start_sensors_decodes_samples() {
        let d = dispatcher();
        let samples: Arc<Mutex<Vec<Result<SensorSample>>>> = Arc::default();
        let s = samples.clone();
        d.start_sensors(100, FusionAlgorithm::Madgwick, move |sample| {
            s.lock().unwrap().push(sample)
        })
        .unwrap();
        assert_eq!(&d.sink().0.lock().unwrap()[0][..5], &[0, 0, 2, 100, 0]);

        let sample = SensorSample {
            quaternion: [1.0, 0.0, 0.0, 0.0],
            update_rate_hz: 100.0,
            ..Default::default()
        };
        let report = encode_report(0, &encode_sensor_sample(&sample), false).unwrap();
        d.on_report(&report);
        let short = encode_report(0, &[0u8; 12], false).unwrap();
        d.on_report(&short);

        let samples = samples.lock().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(*samples[0].as_ref().unwrap(), sample);
        assert!(matches!(samples[1], Err(RawImuError::ShortPayload { .. })));
    }

    #[test]
    fn test_stop_releases_stream() {
        let d = dispatcher();
        d.start_sensors(100, FusionAlgorithm::Mahony, |_| {}).unwrap();
        let stopped = Arc::new(Mutex::new(false));
        let st = stopped.clone();
        d.stop_sensors(move || *st.lock().unwrap() = true).unwrap();
        assert_eq!(d.pending_count(), 2);

        let ack = encode_report(Command::Stop.id(), &[1], true).unwrap();
        d.on_report(&ack);
        assert!(*stopped.lock().unwrap());
        assert_eq!(d.pending_count(), 0);
    }

    #[test]
    fn test_calibrate_magnetometer() {
        let d = dispatcher();
        let result: Arc<Mutex<Option<MagCalibration>>> = Arc::default();
        let r = result.clone();
        d.calibrate_magnetometer(move |cal| *r.lock().unwrap() = cal.ok())
            .unwrap();

        let payload: Vec<u8> = [1.0f32, 2.0, 3.0, 0.5, 1.0, 1.5]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        d.on_report(&encode_report(Command::MagCalib.id(), &payload, true).unwrap());

        let cal = result.lock().unwrap().unwrap();
        assert_eq!(cal.bias, [1.0, 2.0, 3.0]);
        assert_eq!(cal.scale, [0.5, 1.0, 1.5]);
        assert!(!d.is_pending(Command::MagCalib));
    }

    #[test]
    fn test_read_registers_assembles_dump() {
        let d = dispatcher();
        let maps: Arc<Mutex<Vec<RegisterMap>>> = Arc::default();
        let m = maps.clone();
        d.read_registers(true, move |map| m.lock().unwrap().push(map.unwrap()))
            .unwrap();
        assert_eq!(&d.sink().0.lock().unwrap()[0][..4], &[0, 3, 1, 1]);

        let regs: Vec<u8> = (0..127u8).collect();
        for (start, end, last) in [(0usize, 60usize, false), (60, 120, false), (120, 127, true)] {
            let mut payload = vec![start as u8];
            payload.extend_from_slice(&regs[start..end]);
            d.on_report(&encode_report(Command::ReadRegs.id(), &payload, last).unwrap());
            assert_eq!(d.is_pending(Command::ReadRegs), !last);
        }

        let maps = maps.lock().unwrap();
        assert_eq!(maps.len(), 1);
        assert!(maps[0].is_complete());
        assert_eq!(maps[0].get(0x75), Some(0x75));
    }
}
