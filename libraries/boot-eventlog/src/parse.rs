//! TCG PC Client event log parsing.
//!
//! Both log formats are supported: the legacy SHA-1 format, and the
//! crypto-agile format from the TCG PC Client Platform Firmware Profile
//! where the first record is an informative "Spec ID Event03" header
//! declaring the digest algorithms every later record carries. Integer
//! fields are little-endian throughout, unlike TPM structures. Every length
//! field is bounds-checked against the remaining input before use.

use attest_proto::HashAlgo;
use nom::bytes::complete::take;
use nom::number::complete::{le_u16, le_u32};
use nom::IResult;

/// EV_NO_ACTION: informative records that are never extended into a PCR.
pub const EV_NO_ACTION: u32 = 0x0000_0003;
/// EV_SEPARATOR: delimits pre-boot and post-boot measurements.
pub const EV_SEPARATOR: u32 = 0x0000_0004;
/// EV_S_CRTM_VERSION: version string of the static root of trust.
pub const EV_S_CRTM_VERSION: u32 = 0x0000_0008;
/// EV_NONHOST_INFO: platform-defined information about non-host platform code.
pub const EV_NONHOST_INFO: u32 = 0x0000_0011;

pub(crate) const SPEC_ID_SIGNATURE: &[u8; 16] = b"Spec ID Event03\0";
const SHA1_DIGEST_SIZE: usize = 20;

/// Ways an event log can fail to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("event log contains no events")]
    Empty,
    #[error("event log is truncated")]
    Truncated,
    #[error("spec id header is malformed")]
    BadSpecIdHeader,
    #[error("event names digest algorithm {0:#06x} absent from the spec id header")]
    UnknownDigestAlgorithm(u16),
}

/// One measured-boot record, carrying a digest per bank the log declares.
///
/// Nothing in a record is trustworthy on its own; the digests gain meaning
/// only once the log replays to quoted PCR values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub pcr_index: u32,
    pub event_type: u32,
    /// (TPM algorithm identifier, digest), one entry per declared bank
    pub digests: Vec<(u16, Vec<u8>)>,
    pub data: Vec<u8>,
}

impl RawEvent {
    /// The digest this record carries in the given bank, if any.
    pub fn digest(&self, alg: u16) -> Option<&[u8]> {
        self.digests
            .iter()
            .find(|(a, _)| *a == alg)
            .map(|(_, d)| d.as_slice())
    }
}

/// A parsed TCG PC Client event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog {
    /// Declared digest algorithms with their digest sizes
    banks: Vec<(u16, usize)>,
    events: Vec<RawEvent>,
}

impl EventLog {
    /// Parses a raw event log, auto-detecting the format.
    ///
    /// A log whose first record is the PCR 0, EV_NO_ACTION "Spec ID Event03"
    /// header is parsed as crypto-agile; anything else is parsed as the
    /// legacy SHA-1 format. The header itself does not appear in
    /// [`EventLog::events`].
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        if raw.is_empty() {
            return Err(ParseError::Empty);
        }
        let (rest, first) = step(legacy_event(raw))?;
        if first.pcr_index == 0
            && first.event_type == EV_NO_ACTION
            && first.data.starts_with(SPEC_ID_SIGNATURE)
        {
            let banks = parse_spec_id(&first.data)?;
            let mut events = Vec::new();
            let mut input = rest;
            while !input.is_empty() {
                let (remaining, event) = agile_event(input, &banks)?;
                events.push(event);
                input = remaining;
            }
            if events.is_empty() {
                return Err(ParseError::Empty);
            }
            Ok(EventLog { banks, events })
        } else {
            let mut events = vec![first];
            let mut input = rest;
            while !input.is_empty() {
                let (remaining, event) = step(legacy_event(input))?;
                events.push(event);
                input = remaining;
            }
            Ok(EventLog {
                banks: vec![(HashAlgo::Sha1 as u16, SHA1_DIGEST_SIZE)],
                events,
            })
        }
    }

    /// The digest algorithms the log declares, in declaration order.
    pub fn banks(&self) -> impl Iterator<Item = u16> + '_ {
        self.banks.iter().map(|(alg, _)| *alg)
    }

    pub fn has_bank(&self, bank: HashAlgo) -> bool {
        self.banks.iter().any(|(alg, _)| *alg == bank as u16)
    }

    /// The measured-boot records in log order, spec id header excluded.
    pub fn events(&self) -> &[RawEvent] {
        &self.events
    }
}

fn step<'a, T>(parsed: IResult<&'a [u8], T>) -> Result<(&'a [u8], T), ParseError> {
    match parsed {
        Ok(output) => Ok(output),
        Err(_) => Err(ParseError::Truncated),
    }
}

/// Event data: a 32-bit size followed by that many bytes.
fn sized_data(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, size) = le_u32(input)?;
    take(size)(input)
}

fn legacy_event(input: &[u8]) -> IResult<&[u8], RawEvent> {
    let (input, pcr_index) = le_u32(input)?;
    let (input, event_type) = le_u32(input)?;
    let (input, digest) = take(SHA1_DIGEST_SIZE)(input)?;
    let (input, data) = sized_data(input)?;
    Ok((
        input,
        RawEvent {
            pcr_index,
            event_type,
            digests: vec![(HashAlgo::Sha1 as u16, digest.to_vec())],
            data: data.to_vec(),
        },
    ))
}

fn agile_event<'a>(
    input: &'a [u8],
    banks: &[(u16, usize)],
) -> Result<(&'a [u8], RawEvent), ParseError> {
    let (input, pcr_index) = step(le_u32(input))?;
    let (input, event_type) = step(le_u32(input))?;
    let (mut input, digest_count) = step(le_u32(input))?;
    let mut digests = Vec::new();
    for _ in 0..digest_count {
        let (rest, alg) = step(le_u16(input))?;
        let size = banks
            .iter()
            .find(|(a, _)| *a == alg)
            .map(|(_, size)| *size)
            .ok_or(ParseError::UnknownDigestAlgorithm(alg))?;
        let (rest, digest) = step(take(size)(rest))?;
        digests.push((alg, digest.to_vec()));
        input = rest;
    }
    let (input, data) = step(sized_data(input))?;
    Ok((
        input,
        RawEvent {
            pcr_index,
            event_type,
            digests,
            data: data.to_vec(),
        },
    ))
}

/// Extracts the digest algorithm table from a "Spec ID Event03" payload.
fn parse_spec_id(data: &[u8]) -> Result<Vec<(u16, usize)>, ParseError> {
    fn table(input: &[u8]) -> IResult<&[u8], Vec<(u16, usize)>> {
        let (input, _platform_class) = le_u32(input)?;
        // spec version minor, major, errata, uintn size
        let (input, _version) = take(4usize)(input)?;
        let (mut input, algorithm_count) = le_u32(input)?;
        let mut banks = Vec::new();
        for _ in 0..algorithm_count {
            let (rest, alg) = le_u16(input)?;
            let (rest, size) = le_u16(input)?;
            banks.push((alg, size as usize));
            input = rest;
        }
        Ok((input, banks))
    }

    let body = &data[SPEC_ID_SIGNATURE.len()..];
    let (_vendor_info, banks) = table(body).map_err(|_| ParseError::BadSpecIdHeader)?;
    if banks.is_empty() {
        return Err(ParseError::BadSpecIdHeader);
    }
    for &(alg, size) in &banks {
        // Declared sizes must agree with the algorithms we know
        let known = HashAlgo::try_from(i32::from(alg))
            .ok()
            .and_then(|h| h.digest_size());
        if known.is_some_and(|expected| expected != size) {
            return Err(ParseError::BadSpecIdHeader);
        }
    }
    Ok(banks)
}
