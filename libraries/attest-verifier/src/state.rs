//! Platform state derived from replay-verified events.

use attest_proto::platform_state::Firmware;
use attest_proto::{Event, GceConfidentialTechnology, GceInstanceInfo, PlatformState};
use boot_eventlog::{EV_NONHOST_INFO, EV_S_CRTM_VERSION};

/// Text GCE virtual firmware measures as its S-CRTM version, UCS-2 encoded
/// and followed by the decimal version number.
const GCE_VERSION_PREFIX: &str = "GCE Virtual Firmware v";

/// Signature opening the EV_NONHOST_INFO payload GCE firmware measures to
/// announce a confidential computing technology.
const GCE_NONHOST_INFO_SIGNATURE: &[u8] = b"GCE NonHostInfo\0";

/// Derives the platform firmware identity and confidential computing
/// technology from the replay-verified PCR 0 events.
///
/// Only events whose recorded digest matched their data are consulted. When
/// firmware measured several version records the last one wins; when several
/// technology announcements are present the highest tier wins. The instance
/// metadata is attached as supplied and is not authenticated here.
pub fn platform_state(events: &[Event], instance_info: Option<GceInstanceInfo>) -> PlatformState {
    let mut firmware = None;
    let mut technology = GceConfidentialTechnology::None;

    for event in events {
        if event.pcr_index != 0 || !event.digest_verified {
            continue;
        }
        match event.untrusted_type {
            EV_S_CRTM_VERSION => {
                firmware = Some(match parse_gce_version(&event.data) {
                    Some(version) => Firmware::GceVersion(version),
                    None => Firmware::ScrtmVersionId(event.data.clone()),
                });
            }
            EV_NONHOST_INFO => {
                if let Some(announced) = parse_nonhost_info(&event.data) {
                    technology = technology.max(announced);
                }
            }
            _ => {}
        }
    }

    PlatformState {
        technology: technology as i32,
        instance_info,
        firmware,
    }
}

/// Extracts the numeric firmware version from a GCE EV_S_CRTM_VERSION
/// payload, `None` when the payload is not the GCE encoding.
fn parse_gce_version(data: &[u8]) -> Option<u32> {
    let text = decode_ucs2(data)?;
    text.strip_prefix(GCE_VERSION_PREFIX)?.parse().ok()
}

/// Extracts the announced technology from a GCE EV_NONHOST_INFO payload,
/// `None` when the payload is not the GCE encoding. An announcement byte
/// outside the known range counts as no technology, not as an error.
fn parse_nonhost_info(data: &[u8]) -> Option<GceConfidentialTechnology> {
    if !data.starts_with(GCE_NONHOST_INFO_SIGNATURE) {
        return None;
    }
    let announced = i32::from(*data.get(GCE_NONHOST_INFO_SIGNATURE.len())?);
    Some(
        GceConfidentialTechnology::try_from(announced)
            .unwrap_or(GceConfidentialTechnology::None),
    )
}

/// Decodes UCS-2 little-endian text, tolerating one terminating NUL.
fn decode_ucs2(data: &[u8]) -> Option<String> {
    if data.len() % 2 != 0 {
        return None;
    }
    let mut units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    if units.last() == Some(&0) {
        units.pop();
    }
    if units.contains(&0) {
        return None;
    }
    String::from_utf16(&units).ok()
}
