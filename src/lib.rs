//! # rawimu - host side of the raw-HID IMU board protocol
//!
//! Cross-platform driver using hidapi. Provides:
//! - Discovery of the board's vendor-defined raw HID interface
//! - Command/response dispatch with per-command continuations
//! - Decoders for streamed sensor samples, magnetometer calibration and register dumps
//! - C FFI for integration with C/C++ hosts
//!
//! ## Quick Start
//! ```no_run
//! use rawimu::{Device, DeviceConfig, FusionAlgorithm};
//! use std::time::Duration;
//!
//! let mut device = Device::open(&DeviceConfig::default()).unwrap();
//! let mut pump = device.take_pump().unwrap();
//!
//! device
//!     .start_sensors(100, FusionAlgorithm::Madgwick, |sample| {
//!         if let Ok(sample) = sample {
//!             println!("euler: {:?}", sample.orientation().to_euler_deg());
//!         }
//!     })
//!     .unwrap();
//!
//! for _ in 0..100 {
//!     let _ = pump.dispatch_timeout(Duration::from_secs(1));
//! }
//! ```

pub mod error;
pub mod types;
pub mod quaternion;
pub mod protocol;
pub mod descriptor;
pub mod telemetry;
pub mod session;
pub mod dispatcher;
pub mod commands;
pub mod config;
mod reader;
pub mod pump;
pub mod device;
pub mod ffi;

pub use error::RawImuError;
pub use types::*;
pub use quaternion::Quaternion;
pub use config::DeviceConfig;
pub use device::Device;
pub use dispatcher::{CommandDispatcher, Delivery, Reply};
pub use pump::{DispatchWorker, ReportPump};
pub use session::{list_candidates, DeviceSession, ReportSink};
pub use telemetry::RegisterMap;

/// Result type alias for rawimu operations.
pub type Result<T> = std::result::Result<T, RawImuError>;
