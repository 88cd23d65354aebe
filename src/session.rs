use crate::descriptor::{self, DescriptorSummary, ReportKinds, MAX_DESCRIPTOR_SIZE};
use crate::protocol::OutboundReport;
use crate::types::{CandidateInfo, UsbIdentity};
use crate::{RawImuError, Result};
use hidapi::{HidApi, HidDevice};
use std::ffi::{CStr, CString};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Where encoded command reports go.
///
/// `DeviceSession` is the hardware implementation; tests plug in an
/// in-memory sink.
pub trait ReportSink: Send + Sync {
    fn send_report(&self, report: &OutboundReport) -> Result<()>;
}

fn create_hid_api() -> Result<HidApi> {
    let api = HidApi::new()?;
    #[cfg(target_os = "macos")]
    {
        // The reader thread opens a second handle on the same interface.
        api.set_open_exclusive(false);
    }
    Ok(api)
}

fn matches_vid_pid(d: &hidapi::DeviceInfo, identity: &UsbIdentity) -> bool {
    d.vendor_id() == identity.vendor_id && d.product_id() == identity.product_id
}

/// Whether the OS reports the identity's usage for this interface. Not every
/// backend fills these in (libusb reports 0).
fn reports_usage(d: &hidapi::DeviceInfo, identity: &UsbIdentity) -> bool {
    d.usage_page() == identity.usage_page && d.usage() == identity.usage_id
}

fn read_summary(device: &HidDevice, identity: &UsbIdentity) -> Option<DescriptorSummary> {
    let mut buf = [0u8; MAX_DESCRIPTOR_SIZE];
    match device.get_report_descriptor(&mut buf) {
        Ok(len) => Some(descriptor::summarize(
            &buf[..len],
            identity.usage_page,
            identity.usage_id,
        )),
        Err(e) => {
            log::debug!("Report descriptor unavailable: {}", e);
            None
        }
    }
}

/// List every HID interface matching the identity's vendor/product pair.
///
/// Opens each interface temporarily to read its report descriptor.
pub fn list_candidates(identity: &UsbIdentity) -> Result<Vec<CandidateInfo>> {
    let api = create_hid_api()?;
    let mut candidates = Vec::new();

    for dev_info in api.device_list() {
        if !matches_vid_pid(dev_info, identity) {
            continue;
        }

        let descriptor = match dev_info.open_device(&api) {
            Ok(device) => read_summary(&device, identity),
            Err(e) => {
                log::warn!("Failed to open candidate at {:?}: {}", dev_info.path(), e);
                None
            }
        };

        candidates.push(CandidateInfo {
            path: dev_info.path().to_string_lossy().into_owned(),
            interface_number: dev_info.interface_number(),
            usage_page: dev_info.usage_page(),
            usage: dev_info.usage(),
            product: dev_info.product_string().map(str::to_owned),
            serial: dev_info.serial_number().map(str::to_owned),
            descriptor,
        });
    }

    Ok(candidates)
}

/// Exclusive owner of the opened raw HID interface.
///
/// The command handle sits behind a mutex so `send` and `close` are
/// serialized; inbound reports are read through a separate handle from
/// [`DeviceSession::open_reader`].
pub struct DeviceSession {
    /// Kept for opening the reader handle; also keeps the IOKit run loop alive on macOS.
    api: Mutex<HidApi>,
    device: Mutex<Option<HidDevice>>,
    path: CString,
    identity: UsbIdentity,
    descriptor: Option<DescriptorSummary>,
}

impl DeviceSession {
    /// Find and open the raw HID interface for `identity`.
    ///
    /// Every VID/PID match is opened and its report descriptor inspected; the
    /// first one declaring no Feature report under the identity's usage wins.
    /// Interfaces whose OS-reported usage equals the identity are tried first.
    /// When the descriptor cannot be read, the OS-reported usage decides.
    pub fn open(identity: &UsbIdentity) -> Result<DeviceSession> {
        let api = create_hid_api()?;

        let selected = {
            let mut candidates: Vec<&hidapi::DeviceInfo> = api
                .device_list()
                .filter(|d| matches_vid_pid(d, identity))
                .collect();
            candidates.sort_by_key(|d| !reports_usage(d, identity));

            let mut selected = None;
            for dev_info in candidates {
                let device = match dev_info.open_device(&api) {
                    Ok(device) => device,
                    Err(e) => {
                        log::warn!("Failed to open candidate at {:?}: {}", dev_info.path(), e);
                        continue;
                    }
                };

                let summary = read_summary(&device, identity);
                let eligible = match summary {
                    Some(s) => s.feature_reports_in_usage == 0,
                    None => reports_usage(dev_info, identity),
                };
                if !eligible {
                    log::debug!(
                        "Skipping {:?} (interface {}): {:?}",
                        dev_info.path(),
                        dev_info.interface_number(),
                        summary
                    );
                    continue;
                }

                selected = Some((device, dev_info.path().to_owned(), summary));
                break;
            }
            selected
        };

        let (device, path, descriptor) = selected.ok_or(RawImuError::DeviceNotFound {
            vendor_id: identity.vendor_id,
            product_id: identity.product_id,
        })?;

        log::info!(
            "Opened raw HID interface {:?} (VID={:04X} PID={:04X} descriptor={:?})",
            path,
            identity.vendor_id,
            identity.product_id,
            descriptor
        );

        Ok(DeviceSession {
            api: Mutex::new(api),
            device: Mutex::new(Some(device)),
            path,
            identity: *identity,
            descriptor,
        })
    }

    fn handle(&self) -> MutexGuard<'_, Option<HidDevice>> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write one encoded report (report-number byte included).
    pub fn send(&self, report: &OutboundReport) -> Result<()> {
        let guard = self.handle();
        let device = guard.as_ref().ok_or(RawImuError::SessionClosed)?;
        if !self.has_output() {
            return Err(RawImuError::NoOutputEndpoint);
        }

        let written = device.write(report)?;
        if written < report.len() {
            log::warn!("Short HID write: {} of {} bytes", written, report.len());
        }
        log::trace!("Sent command {} ({} payload bytes)", report[1], report[2]);
        Ok(())
    }

    /// Release the command handle. Safe to call more than once.
    pub fn close(&self) {
        if self.handle().take().is_some() {
            log::info!("Closed raw HID interface {:?}", self.path);
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle().is_some()
    }

    /// Open a second handle on the same interface for the reader thread.
    pub(crate) fn open_reader(&self) -> Result<HidDevice> {
        if !self.is_open() {
            return Err(RawImuError::SessionClosed);
        }
        let api = self.api.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(api.open_path(&self.path)?)
    }

    /// False only when the descriptor was read and declares no Output report.
    pub fn has_output(&self) -> bool {
        self.descriptor
            .map(|d| d.kinds.contains(ReportKinds::OUTPUT))
            .unwrap_or(true)
    }

    pub fn path(&self) -> &CStr {
        &self.path
    }

    pub fn identity(&self) -> &UsbIdentity {
        &self.identity
    }

    pub fn descriptor(&self) -> Option<DescriptorSummary> {
        self.descriptor
    }
}

impl ReportSink for DeviceSession {
    fn send_report(&self, report: &OutboundReport) -> Result<()> {
        self.send(report)
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}
