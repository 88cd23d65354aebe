//! Dump the MPU9250 register file of the IMU board.
//!
//! Usage: cargo run --example read_regs [--setup]
//! With `--setup` the firmware re-runs its sensor setup before dumping.

use rawimu::{Device, DeviceConfig, RegisterMap};
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let setup = std::env::args().any(|a| a == "--setup");

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

    let (done_tx, done_rx) = crossbeam_channel::bounded::<RegisterMap>(1);
    let result = device.read_registers(setup, move |map| match map {
        Ok(map) => {
            let _ = done_tx.try_send(map);
        }
        Err(e) => eprintln!("Bad register chunk: {}", e),
    });
    if let Err(e) = result {
        eprintln!("Failed to request registers: {}", e);
        std::process::exit(1);
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    let map = loop {
        if let Ok(map) = done_rx.try_recv() {
            break map;
        }
        if Instant::now() >= deadline {
            eprintln!("Timeout waiting for register dump");
            std::process::exit(1);
        }
        if let Err(e) = pump.dispatch_timeout(Duration::from_millis(200)) {
            log::debug!("dispatch: {}", e);
        }
    };

    println!(
        "{} of 127 registers read{}",
        map.known_count(),
        if map.is_complete() { "" } else { " (incomplete)" }
    );
    println!("      {}", (0..16).map(|c| format!("{:>3X}", c)).collect::<String>());
    for row in 0..8u8 {
        let cells: String = (0..16u8)
            .map(|col| match map.get(row * 16 + col) {
                Some(v) => format!(" {:02X}", v),
                None => "  -".to_string(),
            })
            .collect();
        println!("  {:02X}: {}", row * 16, cells);
    }

    device.close();
}
