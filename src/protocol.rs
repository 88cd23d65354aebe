use crate::types::{CommandId, FusionAlgorithm};
use crate::{RawImuError, Result};

// -- USB identifiers (Teensy RawHID) --
pub const VID: u16 = 0x16C0;
pub const PID: u16 = 0x0486;
pub const USAGE_PAGE: u16 = 0xFFAB;
pub const USAGE_ID: u16 = 0x0200;

// -- Packet geometry --
/// Data bytes in one physical report, excluding the report-number byte.
pub const REPORT_SIZE: usize = 64;
/// Bytes handed to the transport: report-number byte + report.
pub const WIRE_REPORT_SIZE: usize = REPORT_SIZE + 1;
/// Report number used for both directions; the device does not number its reports.
pub const REPORT_PREFIX: u8 = 0x00;

/// Outbound header after the prefix: command id + payload length.
pub const COMMAND_HEADER_LEN: usize = 2;
pub const MAX_COMMAND_PAYLOAD: usize = REPORT_SIZE - COMMAND_HEADER_LEN;

/// Inbound header: prefix + command id + declared length + final flag.
pub const REPORT_HEADER_LEN: usize = 4;
/// Final-flag value marking the last report of a response. Any other value means more follow.
pub const FINAL_FLAG: u8 = 1;
pub const MAX_REPORT_PAYLOAD: usize = WIRE_REPORT_SIZE - REPORT_HEADER_LEN;

/// A fully encoded outbound report, ready for `hidapi::HidDevice::write`.
pub type OutboundReport = [u8; WIRE_REPORT_SIZE];

/// Encode a command frame.
/// Format: [0x00, cmd_id, len, payload..., 0x00 padding...]
pub fn encode_command(cmd_id: CommandId, payload: &[u8]) -> Result<OutboundReport> {
    if payload.len() > MAX_COMMAND_PAYLOAD {
        return Err(RawImuError::PayloadTooLarge(payload.len()));
    }
    let mut buf = [0u8; WIRE_REPORT_SIZE];
    buf[0] = REPORT_PREFIX;
    buf[1] = cmd_id;
    buf[2] = payload.len() as u8;
    buf[3..3 + payload.len()].copy_from_slice(payload);
    Ok(buf)
}

/// Encode a device-to-host report the way the firmware lays it out, with the
/// report-number byte the reader re-inserts.
/// Format: [0x00, cmd_id, len, final, payload..., 0x00 padding...]
///
/// Used by loopback tests and simulated devices.
pub fn encode_report(cmd_id: CommandId, payload: &[u8], is_final: bool) -> Result<OutboundReport> {
    if payload.len() > MAX_REPORT_PAYLOAD {
        return Err(RawImuError::PayloadTooLarge(payload.len()));
    }
    let mut buf = [0u8; WIRE_REPORT_SIZE];
    buf[0] = REPORT_PREFIX;
    buf[1] = cmd_id;
    buf[2] = payload.len() as u8;
    buf[3] = if is_final { FINAL_FLAG } else { 0 };
    buf[REPORT_HEADER_LEN..REPORT_HEADER_LEN + payload.len()].copy_from_slice(payload);
    Ok(buf)
}

/// A decoded inbound report borrowing its payload from the raw buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundFrame<'a> {
    pub command: CommandId,
    pub declared_len: usize,
    pub is_final: bool,
    pub payload: &'a [u8],
}

/// Decode an inbound report.
///
/// Report layout:
/// - `[0]`: report-number prefix (ignored)
/// - `[1]`: command id being answered
/// - `[2]`: declared payload length
/// - `[3]`: final flag, only [`FINAL_FLAG`] ends the response
/// - `[4..4+len]`: payload
pub fn decode_report(data: &[u8]) -> Result<InboundFrame<'_>> {
    if data.len() < REPORT_HEADER_LEN || data.len() > WIRE_REPORT_SIZE {
        return Err(RawImuError::MalformedReport {
            declared: data.get(2).copied().unwrap_or(0) as usize,
            available: data.len().saturating_sub(REPORT_HEADER_LEN),
        });
    }
    let declared_len = data[2] as usize;
    let available = data.len() - REPORT_HEADER_LEN;
    if declared_len > available {
        return Err(RawImuError::MalformedReport {
            declared: declared_len,
            available,
        });
    }
    Ok(InboundFrame {
        command: data[1],
        declared_len,
        is_final: data[3] == FINAL_FLAG,
        payload: &data[REPORT_HEADER_LEN..REPORT_HEADER_LEN + declared_len],
    })
}

/// An owned copy of one report as received from the reader thread.
#[derive(Clone, Copy)]
pub struct InboundReport {
    data: [u8; WIRE_REPORT_SIZE],
    len: usize,
}

impl InboundReport {
    /// Wrap report bytes as returned by `hidapi` (no report-number byte),
    /// re-inserting the prefix so offsets match the wire layout.
    pub fn from_device_bytes(bytes: &[u8]) -> InboundReport {
        let mut data = [0u8; WIRE_REPORT_SIZE];
        data[0] = REPORT_PREFIX;
        let n = bytes.len().min(REPORT_SIZE);
        data[1..1 + n].copy_from_slice(&bytes[..n]);
        InboundReport { data, len: 1 + n }
    }

    /// Wrap bytes that already carry the report-number prefix.
    pub fn from_wire_bytes(bytes: &[u8]) -> InboundReport {
        let mut data = [0u8; WIRE_REPORT_SIZE];
        let n = bytes.len().min(WIRE_REPORT_SIZE);
        data[..n].copy_from_slice(&bytes[..n]);
        InboundReport { data, len: n }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Whether this report ends a response. Such reports must reach the dispatcher.
    pub fn is_final(&self) -> bool {
        self.len >= REPORT_HEADER_LEN && self.data[3] == FINAL_FLAG
    }

    pub fn command(&self) -> CommandId {
        self.data[1]
    }
}

impl std::fmt::Debug for InboundReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InboundReport({:02x?})", self.as_bytes())
    }
}

/// `StartSensors` request: send a sample every `rate_divider` filter updates
/// (firmware default 100), using the given fusion filter.
pub fn start_sensors_payload(rate_divider: u8, algorithm: FusionAlgorithm) -> [u8; 2] {
    [rate_divider, algorithm as u8]
}

/// `ReadRegs` request: `setup` re-runs the MPU-9250 init sequence before the dump.
pub fn read_regs_payload(setup: bool) -> [u8; 1] {
    [setup as u8]
}
