//! Policy evaluation over a verified machine state.

use attest_proto::platform_state::Firmware;
use attest_proto::{GceConfidentialTechnology, MachineState, PlatformState, Policy};

/// One failed policy check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("S-CRTM version {} is not in the allowed list", hex::encode(.0))]
    ScrtmNotAllowed(Vec<u8>),
    #[error("firmware version {got} is below the required minimum {minimum}")]
    FirmwareTooOld { got: u32, minimum: u32 },
    #[error(
        "confidential technology {} is below the required minimum {}",
        .got.as_str_name(),
        .minimum.as_str_name()
    )]
    TechnologyInsufficient {
        got: GceConfidentialTechnology,
        minimum: GceConfidentialTechnology,
    },
}

/// Every check the machine state failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("policy rejected the machine state: {}", render_violations(.0))]
pub struct PolicyError(pub Vec<Violation>);

fn render_violations(violations: &[Violation]) -> String {
    let rendered: Vec<String> = violations
        .iter()
        .map(|violation| violation.to_string())
        .collect();
    rendered.join("; ")
}

/// Evaluates an administrator policy against a verified machine state.
///
/// The checks are independent: all of them run, and every failure is
/// reported together so an operator sees the full distance to compliance
/// at once. The S-CRTM allow list constrains raw firmware identifiers and
/// the minimum version constrains GCE-versioned firmware; each applies only
/// to its own [`Firmware`] variant.
///
/// # Errors
/// Returns every [`Violation`] the state triggered.
pub fn evaluate_policy(state: &MachineState, policy: &Policy) -> Result<(), PolicyError> {
    let Some(platform_policy) = policy.platform.as_ref() else {
        return Ok(());
    };
    let default_platform = PlatformState::default();
    let platform = state.platform.as_ref().unwrap_or(&default_platform);

    let mut violations = Vec::new();
    match &platform.firmware {
        Some(Firmware::ScrtmVersionId(id)) => {
            if !platform_policy.allowed_scrtm_version_ids.is_empty()
                && !platform_policy
                    .allowed_scrtm_version_ids
                    .iter()
                    .any(|allowed| allowed == id)
            {
                violations.push(Violation::ScrtmNotAllowed(id.clone()));
            }
        }
        Some(Firmware::GceVersion(version)) => {
            if *version < platform_policy.minimum_gce_firmware_version {
                violations.push(Violation::FirmwareTooOld {
                    got: *version,
                    minimum: platform_policy.minimum_gce_firmware_version,
                });
            }
        }
        None => {}
    }

    // Wire values are ordered weakest to strongest, so the enum order is
    // the trust ranking.
    if platform.technology() < platform_policy.minimum_technology() {
        violations.push(Violation::TechnologyInsufficient {
            got: platform.technology(),
            minimum: platform_policy.minimum_technology(),
        });
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(PolicyError(violations))
    }
}
