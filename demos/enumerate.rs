//! List HID interfaces of connected IMU boards and show which one is the raw channel.

fn main() {
    env_logger::init();

    let config = rawimu::DeviceConfig::from_env();
    let identity = config.identity;

    match rawimu::list_candidates(&identity) {
        Ok(candidates) => {
            println!(
                "Found {} interface(s) for {:04X}:{:04X}:",
                candidates.len(),
                identity.vendor_id,
                identity.product_id
            );
            for (i, c) in candidates.iter().enumerate() {
                println!(
                    "  [{}] iface={}  usage={:04X}:{:04X}  product={:?}  serial={:?}  raw={}  path={}",
                    i,
                    c.interface_number,
                    c.usage_page,
                    c.usage,
                    c.product,
                    c.serial,
                    c.is_raw_hid(),
                    c.path,
                );
                if let Some(summary) = &c.descriptor {
                    println!(
                        "      reports={:?}  feature_reports_in_usage={}  usage_collection={}",
                        summary.kinds, summary.feature_reports_in_usage, summary.has_usage_collection
                    );
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
