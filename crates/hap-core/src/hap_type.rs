//! Conversion between full UUIDs and the short HAP type form.

use crate::error::{Error, Result};
use crate::types::BASE_UUID;
use uuid::Uuid;

/// Fold a UUID to its HAP short form.
///
/// Apple-defined types sharing [`BASE_UUID`] shrink to the first group with
/// leading zeros removed (`00000043-0000-1000-8000-0026BB765291` becomes
/// `43`). Anything else is returned as the full uppercase UUID.
pub fn uuid_to_hap_type(uuid: &Uuid) -> String {
    let long = uuid.hyphenated().to_string().to_uppercase();

    match long.strip_suffix(BASE_UUID) {
        Some(prefix) => {
            let short = prefix.trim_start_matches('0');
            if short.is_empty() {
                "0".to_string()
            } else {
                short.to_string()
            }
        }
        None => long,
    }
}

/// Expand a HAP short type (or full UUID string) back to a UUID.
pub fn hap_type_to_uuid(hap_type: &str) -> Result<Uuid> {
    let candidate = if hap_type.len() <= 8 {
        format!("{:0>8}{}", hap_type, BASE_UUID)
    } else {
        hap_type.to_string()
    };

    Uuid::parse_str(&candidate)
        .map_err(|_| Error::invalid_argument(format!("Invalid HAP type: {}", hap_type)))
}
