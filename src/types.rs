use crate::descriptor::DescriptorSummary;
use crate::quaternion::Quaternion;

/// Application-level command selector agreed with the firmware.
pub type CommandId = u8;

/// Commands understood by the IMU board firmware.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Start streaming fused sensor samples. Never answered with a final report.
    StartSensors = 0,
    /// Stop whatever the firmware is running. Answered with a single final ack.
    Stop = 1,
    /// Run the magnetometer hard/soft iron calibration (takes ~20 s on device).
    MagCalib = 2,
    /// Dump the MPU-9250 register file in several chunks.
    ReadRegs = 3,
}

impl Command {
    pub const fn id(self) -> CommandId {
        self as CommandId
    }

    pub fn from_id(id: CommandId) -> Option<Command> {
        match id {
            0 => Some(Command::StartSensors),
            1 => Some(Command::Stop),
            2 => Some(Command::MagCalib),
            3 => Some(Command::ReadRegs),
            _ => None,
        }
    }
}

impl From<Command> for CommandId {
    fn from(cmd: Command) -> CommandId {
        cmd.id()
    }
}

/// Sensor fusion filter run by the firmware while streaming.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionAlgorithm {
    #[default]
    Madgwick = 0,
    Mahony = 1,
    /// Not a filter the firmware knows, so it streams raw readings and leaves
    /// the quaternion at its start value. Used when collecting calibration data.
    Disabled = 4,
}

/// What `call` does when the command id already has a registered continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingPolicy {
    /// Last caller wins: the previous continuation is dropped.
    #[default]
    Replace,
    /// Refuse with `AlreadyPending` and leave the registry untouched.
    Strict,
}

/// USB identification of the raw HID interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub usage_page: u16,
    pub usage_id: u16,
}

impl Default for UsbIdentity {
    /// Teensy RawHID defaults.
    fn default() -> Self {
        Self {
            vendor_id: crate::protocol::VID,
            product_id: crate::protocol::PID,
            usage_page: crate::protocol::USAGE_PAGE,
            usage_id: crate::protocol::USAGE_ID,
        }
    }
}

/// One fused sample streamed in response to `StartSensors`.
///
/// Field order matches the 15-float wire record.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSample {
    /// Record fields 0..3. The reference firmware packs the accelerometer
    /// (m/s^2) here rather than the gyroscope.
    pub gyroscope: [f32; 3],
    /// Record fields 3..6. The reference firmware packs the gyroscope (rad/s)
    /// here rather than the accelerometer.
    pub accelerometer: [f32; 3],
    /// Calibrated magnetometer [x, y, z] in uT, already remapped to the accel/gyro axes.
    pub magnetometer: [f32; 3],
    /// Die temperature in degrees Celsius.
    pub temperature: f32,
    /// Filter output [w, x, y, z].
    pub quaternion: [f32; 4],
    /// Filter update rate on the device, in Hz.
    pub update_rate_hz: f32,
}

impl SensorSample {
    /// Number of `f32` fields in the wire record.
    pub const FIELD_COUNT: usize = 15;

    pub fn orientation(&self) -> Quaternion {
        let [w, x, y, z] = self.quaternion;
        Quaternion::new(w as f64, x as f64, y as f64, z as f64)
    }

    /// Flatten back to wire field order, e.g. for CSV rows.
    pub fn to_array(&self) -> [f32; Self::FIELD_COUNT] {
        let mut out = [0f32; Self::FIELD_COUNT];
        out[0..3].copy_from_slice(&self.gyroscope);
        out[3..6].copy_from_slice(&self.accelerometer);
        out[6..9].copy_from_slice(&self.magnetometer);
        out[9] = self.temperature;
        out[10..14].copy_from_slice(&self.quaternion);
        out[14] = self.update_rate_hz;
        out
    }
}

/// Result of `MagCalib`: hard iron bias and soft iron scale per axis.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MagCalibration {
    pub bias: [f32; 3],
    pub scale: [f32; 3],
}

/// One `ReadRegs` chunk: values for the registers [start_address, start_address + len).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterDump {
    pub start_address: u8,
    pub values: Vec<u8>,
}

impl RegisterDump {
    /// Iterate `(address, value)` pairs. Addresses are widened so a chunk
    /// running past 0xFF does not wrap.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u8)> + '_ {
        let start = self.start_address as u16;
        self.values
            .iter()
            .enumerate()
            .map(move |(i, &v)| (start + i as u16, v))
    }

    pub fn end_address(&self) -> u16 {
        self.start_address as u16 + self.values.len() as u16
    }
}

/// HID interface matching the configured vendor/product pair.
#[derive(Debug, Clone)]
pub struct CandidateInfo {
    pub path: String,
    pub interface_number: i32,
    /// Usage page as reported by the OS (0 when the platform does not report it).
    pub usage_page: u16,
    pub usage: u16,
    pub product: Option<String>,
    pub serial: Option<String>,
    /// `None` when the interface could not be opened or its descriptor read.
    pub descriptor: Option<DescriptorSummary>,
}

impl CandidateInfo {
    /// True when the interface declares no Feature report under the usage.
    pub fn is_raw_hid(&self) -> bool {
        self.descriptor
            .map(|d| d.feature_reports_in_usage == 0)
            .unwrap_or(false)
    }
}
