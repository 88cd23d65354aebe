//! Run the magnetometer calibration on the IMU board.
//!
//! Usage: cargo run --example mag_calib
//! Rotate the board through every orientation until the result is printed.

use rawimu::{Device, DeviceConfig, MagCalibration, RawImuError};
use std::time::{Duration, Instant};

const CALIBRATION_TIMEOUT: Duration = Duration::from_secs(40);

fn main() {
    env_logger::init();

    let mut device = match Device::open(&DeviceConfig::from_env()) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Failed to open device: {}", e);
            std::process::exit(1);
        }
    };
    let Some(mut pump) = device.take_pump() else {
        eprintln!("Report pump already taken");
        std::process::exit(1);
    };

    let (done_tx, done_rx) = crossbeam_channel::bounded::<rawimu::Result<MagCalibration>>(1);
    if let Err(e) = device.calibrate_magnetometer(move |result| {
        let _ = done_tx.try_send(result);
    }) {
        eprintln!("Failed to start calibration: {}", e);
        std::process::exit(1);
    }

    println!("Calibrating, keep rotating the board...");

    let start = Instant::now();
    let result = loop {
        if let Ok(result) = done_rx.try_recv() {
            break result;
        }
        if start.elapsed() >= CALIBRATION_TIMEOUT {
            break Err(RawImuError::Timeout);
        }
        match pump.dispatch_timeout(Duration::from_secs(1)) {
            Ok(_) | Err(RawImuError::Timeout) => {}
            Err(e) => break Err(e),
        }
    };

    match result {
        Ok(cal) => {
            println!("bias  = [{:+.3}, {:+.3}, {:+.3}] uT", cal.bias[0], cal.bias[1], cal.bias[2]);
            println!("scale = [{:.4}, {:.4}, {:.4}]", cal.scale[0], cal.scale[1], cal.scale[2]);
        }
        Err(e) => {
            eprintln!("Calibration failed: {}", e);
            device.release(rawimu::Command::MagCalib);
            std::process::exit(1);
        }
    }

    device.close();
}
