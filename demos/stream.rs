//! Stream fused orientation from the IMU board to stdout.
//!
//! Usage: cargo run --example stream
//! Waits for the board to be plugged in. Press Ctrl+C to stop.

use rawimu::{Device, DeviceConfig, FusionAlgorithm};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let config = DeviceConfig::from_env();

    let mut device = loop {
        match Device::open(&config) {
            Ok(d) => break d,
            Err(e) => {
                eprintln!("Failed to open device: {} (retrying in 5s)", e);
                std::thread::sleep(Duration::from_secs(5));
            }
        }
    };

    let session = device.session();
    println!("Path:     {}", session.path().to_string_lossy());
    println!("Output:   {}", session.has_output());
    println!("Report:   {:?}", session.descriptor());
    println!();

    let pump = match device.take_pump() {
        Some(p) => p,
        None => {
            eprintln!("Report pump already taken");
            std::process::exit(1);
        }
    };
    let worker = match pump.spawn() {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Failed to start dispatch worker: {}", e);
            std::process::exit(1);
        }
    };

    let count = Arc::new(AtomicU64::new(0));
    let counter = count.clone();
    let result = device.start_sensors(100, FusionAlgorithm::Madgwick, move |sample| {
        let sample = match sample {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Bad sample: {}", e);
                return;
            }
        };
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;

        // Print every ~50th sample to avoid flooding the terminal
        if n % 50 == 1 {
            let q = sample.quaternion;
            let [roll, pitch, yaw] = sample.orientation().to_euler_deg();
            println!(
                "quat=[{:+.3}, {:+.3}, {:+.3}, {:+.3}]  euler=[{:+7.2}, {:+7.2}, {:+7.2}]  temp={:.1}C  rate={:.0}Hz",
                q[0], q[1], q[2], q[3], roll, pitch, yaw, sample.temperature, sample.update_rate_hz,
            );
        }
    });
    if let Err(e) = result {
        eprintln!("Failed to start sensors: {}", e);
        std::process::exit(1);
    }

    println!("Streaming (Ctrl+C to stop)...");

    let start = Instant::now();
    let mut last_count = 0;
    while device.is_reading() && worker.is_active() {
        std::thread::sleep(Duration::from_secs(3));
        let total = count.load(Ordering::Relaxed);
        let elapsed = start.elapsed().as_secs_f64();
        println!(
            "--- {} samples in {:.1}s ({:.1} Hz over last 3s) ---",
            total,
            elapsed,
            (total - last_count) as f64 / 3.0
        );
        last_count = total;
    }

    eprintln!("Device stopped responding");
    worker.stop();
    device.close();
}
