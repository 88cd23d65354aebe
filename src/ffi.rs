//! C FFI layer for rawimu.
//!
//! Provides an opaque handle-based API for C/C++ consumers.
//! The generated C header is written to `include/rawimu.h` by cbindgen.

use crate::config::DeviceConfig;
use crate::device::Device;
use crate::dispatcher::{Delivery, Reply};
use crate::error::LastError;
use crate::pump::ReportPump;
use crate::telemetry;
use crate::types::{MagCalibration, SensorSample, UsbIdentity};
use crate::RawImuError;
use std::ffi::{c_char, c_int, c_void};
use std::time::Duration;

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque device handle for C consumers.
pub struct RiDevice {
    device: Device,
    pump: Option<ReportPump>,
}

/// Reply callback. `payload` is valid only for the duration of the call.
pub type RiReplyCallback = unsafe extern "C" fn(
    user_data: *mut c_void,
    command: u8,
    payload: *const u8,
    len: usize,
    is_final: bool,
);

/// Caller-owned context pointer handed back to the callback.
struct UserData(*mut c_void);

// The C caller guarantees the pointer may be used from the dispatching thread.
unsafe impl Send for UserData {}

impl UserData {
    fn get(&self) -> *mut c_void {
        self.0
    }
}

fn open_with_config(config: &DeviceConfig) -> *mut RiDevice {
    match Device::open(config) {
        Ok(mut device) => {
            LAST_ERROR.clear();
            let pump = device.take_pump();
            Box::into_raw(Box::new(RiDevice { device, pump }))
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Open the IMU board with the default USB identity.
/// Returns NULL on error (check ri_last_error()).
#[no_mangle]
pub extern "C" fn ri_open() -> *mut RiDevice {
    open_with_config(&DeviceConfig::default())
}

/// Open a board with a custom USB identity.
/// Returns NULL on error.
#[no_mangle]
pub extern "C" fn ri_open_with(
    vendor_id: u16,
    product_id: u16,
    usage_page: u16,
    usage_id: u16,
) -> *mut RiDevice {
    let identity = UsbIdentity {
        vendor_id,
        product_id,
        usage_page,
        usage_id,
    };
    open_with_config(&DeviceConfig::default().with_identity(identity))
}

/// Close a device and free its resources.
///
/// # Safety
/// `dev` must be a pointer returned by `ri_open` or `ri_open_with`, or null.
#[no_mangle]
pub unsafe extern "C" fn ri_close(dev: *mut RiDevice) {
    if !dev.is_null() {
        drop(Box::from_raw(dev));
    }
}

/// Send `command` with `len` payload bytes and register `callback` for its
/// replies. Callbacks run inside `ri_dispatch_pending` / `ri_dispatch_timeout`.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `dev` must be a valid device pointer, or null. `payload` must point to
/// `len` readable bytes, or be null with `len == 0`.
#[no_mangle]
pub unsafe extern "C" fn ri_call(
    dev: *mut RiDevice,
    command: u8,
    payload: *const u8,
    len: usize,
    callback: Option<RiReplyCallback>,
    user_data: *mut c_void,
) -> c_int {
    if dev.is_null() || (payload.is_null() && len > 0) {
        return -1;
    }
    let dev = &*dev;
    let payload = if len == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(payload, len)
    };

    let user_data = UserData(user_data);
    let result = dev.device.call(command, payload, move |reply: Reply<'_>| {
        if let Some(callback) = callback {
            callback(
                user_data.get(),
                reply.command,
                reply.payload.as_ptr(),
                reply.payload.len(),
                reply.is_final,
            );
        }
    });

    match result {
        Ok(()) => 0,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Drop the callback registered for `command`. Returns true if one was pending.
///
/// # Safety
/// `dev` must be a valid device pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ri_release(dev: *mut RiDevice, command: u8) -> bool {
    if dev.is_null() {
        return false;
    }
    (*dev).device.release(command)
}

/// # Safety
/// `dev` must be a valid device pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ri_is_pending(dev: *const RiDevice, command: u8) -> bool {
    if dev.is_null() {
        return false;
    }
    (*dev).device.is_pending(command)
}

/// Route every queued reply to its callback without blocking.
/// Returns the number of reports processed, or -1 on error.
///
/// # Safety
/// `dev` must be a valid device pointer, or null. Must not be called from
/// inside a reply callback.
#[no_mangle]
pub unsafe extern "C" fn ri_dispatch_pending(dev: *mut RiDevice) -> c_int {
    if dev.is_null() {
        return -1;
    }
    match (*dev).pump.as_mut() {
        Some(pump) => pump.dispatch_pending().min(c_int::MAX as usize) as c_int,
        None => {
            LAST_ERROR.set(&RawImuError::ChannelDisconnected);
            -1
        }
    }
}

/// Wait up to `timeout_ms` for one reply and route it.
/// Returns 1 if a callback ran, 0 if the report had no pending call,
/// -1 on error or timeout.
///
/// # Safety
/// `dev` must be a valid device pointer, or null. Must not be called from
/// inside a reply callback.
#[no_mangle]
pub unsafe extern "C" fn ri_dispatch_timeout(dev: *mut RiDevice, timeout_ms: u32) -> c_int {
    if dev.is_null() {
        return -1;
    }
    let Some(pump) = (*dev).pump.as_mut() else {
        LAST_ERROR.set(&RawImuError::ChannelDisconnected);
        return -1;
    };

    match pump.dispatch_timeout(Duration::from_millis(timeout_ms as u64)) {
        Ok(Delivery::Delivered { .. }) => 1,
        Ok(Delivery::Orphaned(_)) => 0,
        Ok(Delivery::Malformed(e)) | Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Decode a `StartSensors` reply payload. Returns 0 on success, -1 on error.
///
/// # Safety
/// `payload` must point to `len` readable bytes and `out` to a writable
/// `SensorSample`, or either may be null.
#[no_mangle]
pub unsafe extern "C" fn ri_decode_sensor_sample(
    payload: *const u8,
    len: usize,
    out: *mut SensorSample,
) -> c_int {
    if payload.is_null() || out.is_null() {
        return -1;
    }
    match telemetry::decode_sensor_sample(std::slice::from_raw_parts(payload, len)) {
        Ok(sample) => {
            out.write(sample);
            0
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Decode a `MagCalib` reply payload. Returns 0 on success, -1 on error.
///
/// # Safety
/// `payload` must point to `len` readable bytes and `out` to a writable
/// `MagCalibration`, or either may be null.
#[no_mangle]
pub unsafe extern "C" fn ri_decode_mag_calibration(
    payload: *const u8,
    len: usize,
    out: *mut MagCalibration,
) -> c_int {
    if payload.is_null() || out.is_null() {
        return -1;
    }
    match telemetry::decode_mag_calibration(std::slice::from_raw_parts(payload, len)) {
        Ok(calibration) => {
            out.write(calibration);
            0
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Euler angles [roll, pitch, yaw] in degrees of a sample's orientation.
///
/// # Safety
/// `sample` must point to a valid `SensorSample` and `out` to 3 writable
/// doubles, or either may be null.
#[no_mangle]
pub unsafe extern "C" fn ri_sample_euler_deg(sample: *const SensorSample, out: *mut f64) -> c_int {
    if sample.is_null() || out.is_null() {
        return -1;
    }
    let euler = (*sample).orientation().to_euler_deg();
    std::ptr::copy_nonoverlapping(euler.as_ptr(), out, euler.len());
    0
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next rawimu API call.
#[no_mangle]
pub extern "C" fn ri_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
