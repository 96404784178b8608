//! Address format validation.
//!
//! Generated addresses have a fixed shape: exactly [`LOCAL_PART_LENGTH`]
//! characters from [`LOCAL_PART_ALPHABET`], an `@`, and the configured
//! domain verbatim. Anything else can never name a live address, so callers
//! reject it before touching the store.

use crate::{EphemailError, Result};

/// Length of a generated local part.
pub const LOCAL_PART_LENGTH: usize = 10;

/// Symbols a generated local part is drawn from.
pub const LOCAL_PART_ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Maximum length of a domain name.
pub const MAX_DOMAIN_LENGTH: usize = 253;

/// Maximum length of a single domain label.
const MAX_LABEL_LENGTH: usize = 63;

fn is_local_part_char(c: u8) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

/// Check whether `candidate` has the shape of a generated address for `domain`.
pub fn is_well_formed_address(candidate: &str, domain: &str) -> bool {
    let Some((local, candidate_domain)) = candidate.split_once('@') else {
        return false;
    };

    local.len() == LOCAL_PART_LENGTH
        && local.bytes().all(is_local_part_char)
        && !domain.is_empty()
        && candidate_domain == domain
}

/// Validate an address, returning a validation error for malformed input.
pub fn validate_address(candidate: &str, domain: &str) -> Result<()> {
    if is_well_formed_address(candidate, domain) {
        Ok(())
    } else {
        Err(EphemailError::Validation(format!(
            "'{candidate}' is not a valid address for {domain}"
        )))
    }
}

/// Check whether `domain` is a usable lowercase domain name.
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LENGTH {
        return false;
    }

    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LENGTH
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == b'-')
    })
}

/// Normalize an envelope recipient for matching.
///
/// Strips surrounding whitespace and angle brackets and lowercases the
/// result, since generated addresses are always lowercase.
pub fn normalize_recipient(raw: &str) -> String {
    let trimmed = raw.trim();
    let unbracketed = trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed);
    unbracketed.trim().to_ascii_lowercase()
}
