// Messages mirror the `attest` protobuf package. The structs are maintained
// by hand in prost output style so the crate builds without protoc; field
// numbers and enum values are a compatibility contract and must never be
// renumbered.

/// Metadata about a GCE instance, as reported by the guest.
///
/// This content is never covered by a quote. It travels with an attestation
/// for transport convenience and must be treated as unverified.
#[serde_with::serde_as]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GceInstanceInfo {
    /// Compute zone, e.g. "us-central1-a"
    #[prost(string, tag = "1")]
    pub zone: ::prost::alloc::string::String,
    /// Project identifier (human readable)
    #[prost(string, tag = "2")]
    pub project_id: ::prost::alloc::string::String,
    /// Numeric project identifier
    #[prost(uint64, tag = "3")]
    pub project_number: u64,
    /// Instance name within the project
    #[prost(string, tag = "4")]
    pub instance_name: ::prost::alloc::string::String,
    /// Numeric instance identifier
    #[prost(uint64, tag = "5")]
    pub instance_id: u64,
}
/// The values of one PCR bank: the bank's hash algorithm and a map from PCR
/// index to the register value read under that algorithm.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Pcrs {
    #[prost(enumeration = "HashAlgo", tag = "1")]
    pub hash: i32,
    /// PCR index to register value; values are one digest long for `hash`
    #[prost(btree_map = "uint32, bytes", tag = "2")]
    pub pcrs: ::prost::alloc::collections::BTreeMap<u32, ::prost::alloc::vec::Vec<u8>>,
}
/// A single TPM 2.0 quote over one PCR bank.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Quote {
    /// TPMS_ATTEST blob exactly as signed by the TPM
    #[prost(bytes = "vec", tag = "1")]
    pub quote: ::prost::alloc::vec::Vec<u8>,
    /// TPMT_SIGNATURE blob over `quote`
    #[prost(bytes = "vec", tag = "2")]
    pub raw_sig: ::prost::alloc::vec::Vec<u8>,
    /// PCR values the quote claims to cover
    #[prost(message, optional, tag = "3")]
    pub pcrs: ::core::option::Option<Pcrs>,
}
/// Everything a verifier needs to appraise the boot state of a machine.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Attestation {
    /// TPMT_PUBLIC area of the attestation key that signed the quotes
    #[prost(bytes = "vec", tag = "1")]
    pub ak_pub: ::prost::alloc::vec::Vec<u8>,
    /// One quote per PCR bank, at most one per hash algorithm
    #[prost(message, repeated, tag = "2")]
    pub quotes: ::prost::alloc::vec::Vec<Quote>,
    /// Raw TCG PC Client event log (legacy or crypto-agile encoding)
    #[prost(bytes = "vec", tag = "3")]
    pub event_log: ::prost::alloc::vec::Vec<u8>,
    /// Unverified instance metadata supplied by the guest
    #[prost(message, optional, tag = "4")]
    pub instance_info: ::core::option::Option<GceInstanceInfo>,
}
/// Verified platform (firmware) state derived from the event log.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlatformState {
    #[prost(enumeration = "GceConfidentialTechnology", tag = "3")]
    pub technology: i32,
    /// Copied from the attestation; not covered by any quote
    #[prost(message, optional, tag = "4")]
    pub instance_info: ::core::option::Option<GceInstanceInfo>,
    #[prost(oneof = "platform_state::Firmware", tags = "1, 2")]
    pub firmware: ::core::option::Option<platform_state::Firmware>,
}
/// Nested message and enum types in `PlatformState`.
pub mod platform_state {
    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Firmware {
        /// Raw S-CRTM version identifier measured by non-GCE firmware
        #[prost(bytes, tag = "1")]
        ScrtmVersionId(::prost::alloc::vec::Vec<u8>),
        /// Parsed GCE virtual firmware version number
        #[prost(uint32, tag = "2")]
        GceVersion(u32),
    }
}
/// One replay-verified event from the boot event log.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Event {
    /// PCR this event was extended into
    #[prost(uint32, tag = "1")]
    pub pcr_index: u32,
    /// TCG event type tag; a hint only, never authenticated
    #[prost(uint32, tag = "2")]
    pub untrusted_type: u32,
    /// Raw event data payload
    #[prost(bytes = "vec", tag = "3")]
    pub data: ::prost::alloc::vec::Vec<u8>,
    /// Digest actually extended into the PCR
    #[prost(bytes = "vec", tag = "4")]
    pub digest: ::prost::alloc::vec::Vec<u8>,
    /// Whether `digest` equals the bank hash of `data`; false alone does
    /// not imply tampering, some event types hash other content
    #[prost(bool, tag = "5")]
    pub digest_verified: bool,
}
/// The verified boot state of a machine, tagged with the PCR bank that
/// proved it.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MachineState {
    #[prost(message, optional, tag = "1")]
    pub platform: ::core::option::Option<PlatformState>,
    /// Replay-verified events in log order; tags 2 and 3 are reserved for
    /// bootloader and kernel state
    #[prost(message, repeated, tag = "4")]
    pub raw_events: ::prost::alloc::vec::Vec<Event>,
    /// Bank whose quote proved this state
    #[prost(enumeration = "HashAlgo", tag = "5")]
    pub hash: i32,
}
/// Constraints an administrator places on a verified platform state.
#[serde_with::serde_as]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlatformPolicy {
    /// Acceptable raw S-CRTM version identifiers, byte-for-byte
    #[serde_as(as = "Vec<serde_with::hex::Hex>")]
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub allowed_scrtm_version_ids: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    /// Lowest acceptable GCE virtual firmware version
    #[prost(uint32, tag = "2")]
    pub minimum_gce_firmware_version: u32,
    /// Lowest acceptable confidential computing technology
    #[prost(enumeration = "GceConfidentialTechnology", tag = "3")]
    pub minimum_technology: i32,
}
/// Root policy message.
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Policy {
    #[prost(message, optional, tag = "1")]
    pub platform: ::core::option::Option<PlatformPolicy>,
}
/// PCR bank hash algorithms. Values are TPM 2.0 algorithm identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum HashAlgo {
    HashInvalid = 0,
    Sha1 = 4,
    Sha256 = 11,
}
impl HashAlgo {
    /// String value of the enum field names used in the ProtoBuf definition.
    ///
    /// The values are not transformed in any way and thus are considered stable
    /// (if the ProtoBuf definition does not change) and safe for programmatic use.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            HashAlgo::HashInvalid => "HASH_INVALID",
            HashAlgo::Sha1 => "SHA1",
            HashAlgo::Sha256 => "SHA256",
        }
    }
    /// Creates an enum from field names used in the ProtoBuf definition.
    pub fn from_str_name(value: &str) -> ::core::option::Option<Self> {
        match value {
            "HASH_INVALID" => Some(Self::HashInvalid),
            "SHA1" => Some(Self::Sha1),
            "SHA256" => Some(Self::Sha256),
            _ => None,
        }
    }
}
/// Confidential computing technology of a GCE VM, ordered weakest to
/// strongest. Values are part of the wire contract.
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum GceConfidentialTechnology {
    None = 0,
    AmdSev = 1,
    AmdSevEs = 2,
}
impl GceConfidentialTechnology {
    /// String value of the enum field names used in the ProtoBuf definition.
    ///
    /// The values are not transformed in any way and thus are considered stable
    /// (if the ProtoBuf definition does not change) and safe for programmatic use.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            GceConfidentialTechnology::None => "NONE",
            GceConfidentialTechnology::AmdSev => "AMD_SEV",
            GceConfidentialTechnology::AmdSevEs => "AMD_SEV_ES",
        }
    }
    /// Creates an enum from field names used in the ProtoBuf definition.
    pub fn from_str_name(value: &str) -> ::core::option::Option<Self> {
        match value {
            "NONE" => Some(Self::None),
            "AMD_SEV" => Some(Self::AmdSev),
            "AMD_SEV_ES" => Some(Self::AmdSevEs),
            _ => None,
        }
    }
}
