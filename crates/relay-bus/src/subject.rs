//! # Subjects
//!
//! Validation and wildcard matching for dot-separated subjects.

use crate::transport::BusError;
use crate::TOKEN_SEPARATOR;

/// Single-token wildcard.
pub const WILDCARD_TOKEN: &str = "*";

/// Trailing multi-token wildcard.
pub const WILDCARD_TAIL: &str = ">";

/// Validate a subject a message is published to.
///
/// Published subjects are literal: no empty tokens and no wildcards.
pub fn validate_subject(subject: &str) -> Result<(), BusError> {
    for token in subject.split(TOKEN_SEPARATOR) {
        if token.is_empty() || token == WILDCARD_TOKEN || token == WILDCARD_TAIL {
            return Err(BusError::InvalidSubject(subject.to_string()));
        }
    }
    Ok(())
}

/// Validate a subscription subject.
///
/// `*` may replace any whole token; `>` may only be the last token.
pub fn validate_filter(filter: &str) -> Result<(), BusError> {
    let tokens: Vec<&str> = filter.split(TOKEN_SEPARATOR).collect();
    let last = tokens.len() - 1;

    for (i, token) in tokens.iter().enumerate() {
        let misplaced_tail = *token == WILDCARD_TAIL && i != last;
        if token.is_empty() || misplaced_tail {
            return Err(BusError::InvalidSubject(filter.to_string()));
        }
    }
    Ok(())
}

/// Check whether a literal subject is matched by a subscription subject.
#[must_use]
pub fn matches(filter: &str, subject: &str) -> bool {
    let mut filter_tokens = filter.split(TOKEN_SEPARATOR);
    let mut subject_tokens = subject.split(TOKEN_SEPARATOR);

    loop {
        match (filter_tokens.next(), subject_tokens.next()) {
            // '>' needs at least one remaining token, which we just consumed
            (Some(WILDCARD_TAIL), Some(_)) => return true,
            (Some(WILDCARD_TOKEN), Some(_)) => continue,
            (Some(f), Some(s)) if f == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Whether a subscription subject contains wildcards.
#[must_use]
pub fn has_wildcards(filter: &str) -> bool {
    filter
        .split(TOKEN_SEPARATOR)
        .any(|t| t == WILDCARD_TOKEN || t == WILDCARD_TAIL)
}
