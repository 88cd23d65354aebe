//! Typed decoding of the payloads the firmware sends back.
//!
//! All multi-byte values are little-endian IEEE-754 `f32`, packed without padding.

use crate::types::{Command, MagCalibration, RegisterDump, SensorSample};
use crate::{RawImuError, Result};

pub const SENSOR_SAMPLE_LEN: usize = SensorSample::FIELD_COUNT * 4;
pub const MAG_CALIBRATION_LEN: usize = 6 * 4;

/// Registers the firmware dumps in response to `ReadRegs` (0x00..=0x7E).
pub const MPU9250_REGISTER_COUNT: usize = 127;

fn expect_len(command: Command, payload: &[u8], expected: usize) -> Result<()> {
    if payload.len() != expected {
        return Err(RawImuError::ShortPayload {
            command: command.id(),
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn read_f32s<const N: usize>(payload: &[u8]) -> [f32; N] {
    let mut out = [0f32; N];
    for (slot, c) in out.iter_mut().zip(payload.chunks_exact(4)) {
        *slot = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
    }
    out
}

/// Decode one `StartSensors` report payload (15 floats).
pub fn decode_sensor_sample(payload: &[u8]) -> Result<SensorSample> {
    expect_len(Command::StartSensors, payload, SENSOR_SAMPLE_LEN)?;
    let f: [f32; SensorSample::FIELD_COUNT] = read_f32s(payload);
    Ok(SensorSample {
        gyroscope: [f[0], f[1], f[2]],
        accelerometer: [f[3], f[4], f[5]],
        magnetometer: [f[6], f[7], f[8]],
        temperature: f[9],
        quaternion: [f[10], f[11], f[12], f[13]],
        update_rate_hz: f[14],
    })
}

/// Decode the `MagCalib` result: bias [x, y, z] then scale [x, y, z].
pub fn decode_mag_calibration(payload: &[u8]) -> Result<MagCalibration> {
    expect_len(Command::MagCalib, payload, MAG_CALIBRATION_LEN)?;
    let f: [f32; 6] = read_f32s(payload);
    Ok(MagCalibration {
        bias: [f[0], f[1], f[2]],
        scale: [f[3], f[4], f[5]],
    })
}

/// Decode one `ReadRegs` chunk: `[start_addr, values...]`.
pub fn decode_register_chunk(payload: &[u8]) -> Result<RegisterDump> {
    let Some((&start_address, values)) = payload.split_first() else {
        return Err(RawImuError::ShortPayload {
            command: Command::ReadRegs.id(),
            expected: 1,
            actual: 0,
        });
    };
    Ok(RegisterDump {
        start_address,
        values: values.to_vec(),
    })
}

/// Encode a sensor record the way the firmware does. Used by simulated devices.
pub fn encode_sensor_sample(sample: &SensorSample) -> [u8; SENSOR_SAMPLE_LEN] {
    let mut out = [0u8; SENSOR_SAMPLE_LEN];
    for (c, v) in out.chunks_exact_mut(4).zip(sample.to_array()) {
        c.copy_from_slice(&v.to_le_bytes());
    }
    out
}

/// Register file assembled from `ReadRegs` chunks.
#[derive(Debug, Clone)]
pub struct RegisterMap {
    values: Vec<Option<u8>>,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterMap {
    pub fn new() -> Self {
        Self {
            values: vec![None; MPU9250_REGISTER_COUNT],
        }
    }

    /// Store a chunk. Returns how many registers were written; values past the
    /// end of the register file are dropped.
    pub fn apply(&mut self, chunk: &RegisterDump) -> usize {
        let mut written = 0;
        for (addr, value) in chunk.iter() {
            if let Some(slot) = self.values.get_mut(addr as usize) {
                *slot = Some(value);
                written += 1;
            } else {
                log::debug!("Register 0x{:02x} outside the register file, dropped", addr);
            }
        }
        written
    }

    pub fn get(&self, address: u8) -> Option<u8> {
        self.values.get(address as usize).copied().flatten()
    }

    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    pub fn known_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// `(address, value)` for every register received so far.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(addr, v)| v.map(|v| (addr as u8, v)))
    }
}
