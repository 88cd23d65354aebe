use crate::types::CommandId;
use std::fmt;

/// Errors that can occur when talking to the IMU board.
#[derive(Debug, thiserror::Error)]
pub enum RawImuError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("Device not found (VID={vendor_id:04X} PID={product_id:04X})")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    #[error("Payload too large: {0} bytes (max 62)")]
    PayloadTooLarge(usize),

    #[error("Malformed report: declared {declared} payload bytes, {available} available")]
    MalformedReport { declared: usize, available: usize },

    #[error("Short payload for command {command}: expected {expected} bytes, got {actual}")]
    ShortPayload {
        command: CommandId,
        expected: usize,
        actual: usize,
    },

    #[error("Device exposes no output report")]
    NoOutputEndpoint,

    #[error("Orphan report for command {0}")]
    OrphanReport(CommandId),

    #[error("Command {0} already has a pending call")]
    AlreadyPending(CommandId),

    #[error("Device session closed")]
    SessionClosed,

    #[error("Timeout waiting for a report")]
    Timeout,

    #[error("Channel disconnected")]
    ChannelDisconnected,

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &RawImuError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_error_roundtrip() {
        let last = LastError::new();
        assert!(last.as_ptr().is_null());

        last.set(&RawImuError::AlreadyPending(3));
        let ptr = last.as_ptr();
        assert!(!ptr.is_null());
        let msg = unsafe { std::ffi::CStr::from_ptr(ptr) };
        assert_eq!(msg.to_str().unwrap(), "Command 3 already has a pending call");

        last.clear();
        assert!(last.as_ptr().is_null());
    }

    #[test]
    fn test_device_not_found_message() {
        let err = RawImuError::DeviceNotFound {
            vendor_id: 0x16C0,
            product_id: 0x0486,
        };
        assert_eq!(err.to_string(), "Device not found (VID=16C0 PID=0486)");
    }
}
