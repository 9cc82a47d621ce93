//! Structural request validation
//!
//! An address is `local@domain` where the local part is ASCII letters, digits
//! and `+_.-`, and the domain is ASCII letters, digits and `.-`. Both sides
//! must be non-empty and there is exactly one `@`.

use courier_common::DeliveryRequest;

use crate::error::ValidationError;

const fn is_local_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'+' | b'_' | b'.' | b'-')
}

const fn is_domain_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-')
}

/// Returns `true` if `address` is a structurally valid recipient address
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    address.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.is_empty()
            && local.bytes().all(is_local_byte)
            && domain.bytes().all(is_domain_byte)
    })
}

/// Validate a request before any delivery attempt, returning its address
///
/// # Errors
/// [`ValidationError::MissingAddress`] for an absent or empty address,
/// [`ValidationError::InvalidAddress`] when the address is malformed.
pub fn validate(request: &DeliveryRequest) -> Result<&str, ValidationError> {
    let address = request
        .recipient_address
        .as_deref()
        .filter(|address| !address.is_empty())
        .ok_or(ValidationError::MissingAddress)?;

    if is_valid_address(address) {
        Ok(address)
    } else {
        Err(ValidationError::InvalidAddress(address.to_string()))
    }
}
