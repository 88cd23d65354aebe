//! Minimal HID report descriptor walker.
//!
//! Only short items are interpreted. Long items are skipped. The walk tracks
//! Usage Page, Report ID, local Usages and the collection stack, which is
//! enough to tell which report kinds an interface declares and how many
//! Feature reports live under a given usage.

/// Upper bound for descriptors read from the device.
pub const MAX_DESCRIPTOR_SIZE: usize = 4096;

bitflags::bitflags! {
    /// Main item kinds present in a report descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReportKinds: u8 {
        const INPUT   = 1 << 0;
        const OUTPUT  = 1 << 1;
        const FEATURE = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSummary {
    pub kinds: ReportKinds,
    /// Distinct Feature reports declared inside a collection (or on an item)
    /// carrying the queried usage.
    pub feature_reports_in_usage: usize,
    /// Whether some collection carries the queried usage.
    pub has_usage_collection: bool,
}

// Item types
const TYPE_MAIN: u8 = 0;
const TYPE_GLOBAL: u8 = 1;
const TYPE_LOCAL: u8 = 2;

// Main item tags
const TAG_INPUT: u8 = 0x8;
const TAG_OUTPUT: u8 = 0x9;
const TAG_COLLECTION: u8 = 0xA;
const TAG_FEATURE: u8 = 0xB;
const TAG_END_COLLECTION: u8 = 0xC;

// Global item tags
const TAG_USAGE_PAGE: u8 = 0x0;
const TAG_REPORT_ID: u8 = 0x8;

// Local item tags
const TAG_USAGE: u8 = 0x0;

const LONG_ITEM_PREFIX: u8 = 0xFE;

/// Walk `descriptor` and summarize it relative to `(usage_page, usage_id)`.
pub fn summarize(descriptor: &[u8], usage_page: u16, usage_id: u16) -> DescriptorSummary {
    let target = ((usage_page as u32) << 16) | usage_id as u32;

    let mut kinds = ReportKinds::empty();
    let mut current_page: u16 = 0;
    let mut report_id: u8 = 0;
    let mut local_usages: Vec<u32> = Vec::new();
    // Each entry: does this collection carry the target usage?
    let mut collections: Vec<bool> = Vec::new();
    let mut feature_ids: Vec<u8> = Vec::new();
    let mut has_usage_collection = false;

    let mut i = 0;
    while i < descriptor.len() {
        let prefix = descriptor[i];

        if prefix == LONG_ITEM_PREFIX {
            let Some(&size) = descriptor.get(i + 1) else { break };
            i += 3 + size as usize;
            continue;
        }

        let size = match prefix & 0x03 {
            3 => 4,
            n => n as usize,
        };
        let item_type = (prefix >> 2) & 0x03;
        let tag = prefix >> 4;

        let Some(data) = descriptor.get(i + 1..i + 1 + size) else {
            log::debug!("Report descriptor truncated at offset {}", i);
            break;
        };
        let value = data
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32);
        i += 1 + size;

        match item_type {
            TYPE_MAIN => {
                let in_usage = collections.iter().any(|&c| c)
                    || local_usages.iter().any(|&u| u == target);
                match tag {
                    TAG_INPUT => kinds |= ReportKinds::INPUT,
                    TAG_OUTPUT => kinds |= ReportKinds::OUTPUT,
                    TAG_FEATURE => {
                        kinds |= ReportKinds::FEATURE;
                        if in_usage && !feature_ids.contains(&report_id) {
                            feature_ids.push(report_id);
                        }
                    }
                    TAG_COLLECTION => {
                        let carries = local_usages.first() == Some(&target);
                        has_usage_collection |= carries;
                        collections.push(carries);
                    }
                    TAG_END_COLLECTION => {
                        collections.pop();
                    }
                    _ => {}
                }
                local_usages.clear();
            }
            TYPE_GLOBAL => match tag {
                TAG_USAGE_PAGE => current_page = value as u16,
                TAG_REPORT_ID => report_id = value as u8,
                _ => {}
            },
            TYPE_LOCAL => {
                if tag == TAG_USAGE {
                    // A 4-byte usage carries its own page in the high half.
                    let full = if size == 4 {
                        value
                    } else {
                        ((current_page as u32) << 16) | value
                    };
                    local_usages.push(full);
                }
            }
            _ => {}
        }
    }

    DescriptorSummary {
        kinds,
        feature_reports_in_usage: feature_ids.len(),
        has_usage_collection,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Teensy RawHID interface: 64-byte input and output, no feature report.
    const RAWHID: &[u8] = &[
        0x06, 0xAB, 0xFF, // Usage Page (0xFFAB)
        0x0A, 0x00, 0x02, // Usage (0x0200)
        0xA1, 0x01, //       Collection (Application)
        0x75, 0x08, //         Report Size (8)
        0x15, 0x00, //         Logical Minimum (0)
        0x26, 0xFF, 0x00, //   Logical Maximum (255)
        0x95, 0x40, //         Report Count (64)
        0x09, 0x01, //         Usage (1)
        0x81, 0x02, //         Input (Data, Var, Abs)
        0x95, 0x40, //         Report Count (64)
        0x09, 0x02, //         Usage (2)
        0x91, 0x02, //         Output (Data, Var, Abs)
        0xC0, //             End Collection
    ];

    /// Same usage, but with a feature report, like a configuration interface.
    const WITH_FEATURE: &[u8] = &[
        0x06, 0xAB, 0xFF, 0x0A, 0x00, 0x02, 0xA1, 0x01, 0x75, 0x08, 0x95, 0x40, 0x09, 0x01,
        0x81, 0x02, 0x95, 0x04, 0x09, 0x03, 0xB1, 0x02, 0xC0,
    ];

    /// Serial emulation interface under a different vendor page, input only.
    const SEREMU: &[u8] = &[
        0x06, 0xC9, 0xFF, 0x09, 0x04, 0xA1, 0x5C, 0x75, 0x08, 0x95, 0x40, 0x09, 0x75, 0x81,
        0x02, 0x95, 0x04, 0x09, 0x76, 0xB1, 0x02, 0xC0,
    ];

    #[test]
    fn test_rawhid_descriptor() {
        let summary = summarize(RAWHID, 0xFFAB, 0x0200);
        assert_eq!(summary.kinds, ReportKinds::INPUT | ReportKinds::OUTPUT);
        assert_eq!(summary.feature_reports_in_usage, 0);
        assert!(summary.has_usage_collection);
    }

    #[test]
    fn test_feature_under_usage_is_counted() {
        let summary = summarize(WITH_FEATURE, 0xFFAB, 0x0200);
        assert!(summary.kinds.contains(ReportKinds::FEATURE));
        assert!(!summary.kinds.contains(ReportKinds::OUTPUT));
        assert_eq!(summary.feature_reports_in_usage, 1);
    }

    #[test]
    fn test_feature_under_other_usage_is_ignored() {
        let summary = summarize(SEREMU, 0xFFAB, 0x0200);
        assert!(summary.kinds.contains(ReportKinds::FEATURE));
        assert_eq!(summary.feature_reports_in_usage, 0);
        assert!(!summary.has_usage_collection);

        let own = summarize(SEREMU, 0xFFC9, 0x0004);
        assert_eq!(own.feature_reports_in_usage, 1);
        assert!(own.has_usage_collection);
    }

    #[test]
    fn test_distinct_report_ids() {
        let desc: &[u8] = &[
            0x06, 0xAB, 0xFF, 0x0A, 0x00, 0x02, 0xA1, 0x01, //
            0x85, 0x01, 0x09, 0x01, 0xB1, 0x02, // Report ID 1, Feature
            0x09, 0x02, 0xB1, 0x02, //             Report ID 1, Feature
            0x85, 0x02, 0x09, 0x03, 0xB1, 0x02, // Report ID 2, Feature
            0xC0,
        ];
        assert_eq!(summarize(desc, 0xFFAB, 0x0200).feature_reports_in_usage, 2);
    }

    #[test]
    fn test_truncated_and_long_items() {
        // Long item (0xFE, size 2, tag) followed by a truncated Usage Page.
        let desc: &[u8] = &[0xFE, 0x02, 0x10, 0xAA, 0xBB, 0x81, 0x02, 0x06, 0xAB];
        let summary = summarize(desc, 0xFFAB, 0x0200);
        assert_eq!(summary.kinds, ReportKinds::INPUT);
        assert_eq!(summary.feature_reports_in_usage, 0);
    }

    #[test]
    fn test_empty_descriptor() {
        let summary = summarize(&[], 0xFFAB, 0x0200);
        assert!(summary.kinds.is_empty());
        assert!(!summary.has_usage_collection);
    }
}
