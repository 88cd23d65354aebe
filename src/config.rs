use crate::types::{PendingPolicy, UsbIdentity};

/// Default poll interval of the reader thread, so it notices a stop request.
pub const DEFAULT_READ_TIMEOUT_MS: i32 = 100;
/// Default depth of the inbound report queue between reader and pump.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Settings for [`crate::Device::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub identity: UsbIdentity,
    pub read_timeout_ms: i32,
    pub queue_capacity: usize,
    pub pending_policy: PendingPolicy,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            identity: UsbIdentity::default(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            pending_policy: PendingPolicy::Replace,
        }
    }
}

impl DeviceConfig {
    pub fn with_identity(mut self, identity: UsbIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_read_timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.read_timeout_ms = timeout_ms.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_pending_policy(mut self, policy: PendingPolicy) -> Self {
        self.pending_policy = policy;
        self
    }

    /// Defaults overridden from `RAWIMU_*` environment variables.
    ///
    /// Meant for host tools; the library itself never reads the environment.
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let id = defaults.identity;
        let identity = UsbIdentity {
            vendor_id: read_u16(&lookup, "RAWIMU_VID", id.vendor_id),
            product_id: read_u16(&lookup, "RAWIMU_PID", id.product_id),
            usage_page: read_u16(&lookup, "RAWIMU_USAGE_PAGE", id.usage_page),
            usage_id: read_u16(&lookup, "RAWIMU_USAGE_ID", id.usage_id),
        };
        let strict = read_bool(&lookup, "RAWIMU_STRICT_PENDING", false);

        defaults
            .with_identity(identity)
            .with_read_timeout_ms(read_parsed(
                &lookup,
                "RAWIMU_READ_TIMEOUT_MS",
                defaults.read_timeout_ms,
            ))
            .with_queue_capacity(read_parsed(
                &lookup,
                "RAWIMU_QUEUE_CAPACITY",
                defaults.queue_capacity,
            ))
            .with_pending_policy(if strict {
                PendingPolicy::Strict
            } else {
                PendingPolicy::Replace
            })
    }
}

fn read_value(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

fn read_bool(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    read_value(lookup, name)
        .and_then(|v| match v.as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                log::warn!("Ignoring {}='{}' (expected a boolean)", name, v);
                None
            }
        })
        .unwrap_or(default)
}

/// Hex with a `0x` prefix, or decimal.
fn read_u16(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u16) -> u16 {
    read_value(lookup, name)
        .and_then(|v| {
            let parsed = match v.strip_prefix("0x") {
                Some(hex) => u16::from_str_radix(hex, 16).ok(),
                None => v.parse::<u16>().ok(),
            };
            if parsed.is_none() {
                log::warn!("Ignoring {}='{}' (expected a 16-bit id)", name, v);
            }
            parsed
        })
        .unwrap_or(default)
}

fn read_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> T {
    read_value(lookup, name)
        .and_then(|v| {
            let parsed = v.parse::<T>().ok();
            if parsed.is_none() {
                log::warn!("Ignoring {}='{}'", name, v);
            }
            parsed
        })
        .unwrap_or(default)
}
