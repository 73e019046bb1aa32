//! Range-list parsing for reason-code parameters.
//!
//! Grammar: comma-separated tokens, each a decimal integer or an inclusive
//! range `a-b` with `a <= b`, e.g. `0,1,2,5-12,13,255`. Whitespace around a
//! token is tolerated. Every range counts `b-a+1` entries toward the
//! capacity, duplicates included, so a list is rejected as soon as its
//! expanded length exceeds what a fixed slot array could have held.
//!
//! Parsing is all-or-nothing: callers get a complete set or an error.

use nmi_common::ReasonCode;
use thiserror::Error;

use crate::category::{CategorySet, DOMAIN_SIZE};

/// Errors produced while expanding a range list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeListError {
    #[error("invalid token '{token}', unparsed input: '{remainder}'")]
    Malformed { token: String, remainder: String },

    #[error("value {value} in '{token}' is outside reason-code range 0-255")]
    OutOfDomain { token: String, value: u64 },

    #[error("list exceeds capacity of {capacity} entries at '{token}', unparsed input: '{remainder}'")]
    Overflow {
        token: String,
        capacity: usize,
        remainder: String,
    },
}

impl RangeListError {
    /// The token that stopped the parse.
    pub fn token(&self) -> &str {
        match self {
            RangeListError::Malformed { token, .. }
            | RangeListError::OutOfDomain { token, .. }
            | RangeListError::Overflow { token, .. } => token,
        }
    }
}

/// Expand `input` into a set of at most `capacity` reason codes.
///
/// `capacity` is clamped to 256, the size of the reason-code domain.
pub fn parse_range_list(input: &str, capacity: usize) -> Result<CategorySet, RangeListError> {
    let capacity = capacity.min(DOMAIN_SIZE);
    let mut set = CategorySet::with_capacity(capacity);
    if input.trim().is_empty() {
        return Ok(set);
    }

    let mut offset = 0usize;
    let mut expanded = 0usize;

    for raw in input.split(',') {
        let remainder = input[offset..].trim_start();
        offset += raw.len() + 1;

        let token = raw.trim();
        let (lo, hi) = parse_token(token, remainder)?;

        expanded += usize::from(hi - lo) + 1;
        if expanded > capacity {
            return Err(overflow(token, capacity, remainder));
        }

        for code in lo..=hi {
            set.insert(ReasonCode(code))
                .map_err(|_| overflow(token, capacity, remainder))?;
        }
    }

    Ok(set)
}

fn parse_token(token: &str, remainder: &str) -> Result<(u8, u8), RangeListError> {
    let malformed = || RangeListError::Malformed {
        token: token.to_string(),
        remainder: remainder.to_string(),
    };

    let (lo, hi) = match token.split_once('-') {
        Some((lo, hi)) => (
            parse_value(lo.trim(), token).ok_or_else(malformed)??,
            parse_value(hi.trim(), token).ok_or_else(malformed)??,
        ),
        None => {
            let value = parse_value(token, token).ok_or_else(malformed)??;
            (value, value)
        }
    };

    if lo > hi {
        return Err(malformed());
    }
    Ok((lo, hi))
}

/// `None` when `digits` is not a decimal number at all; `Some(Err)` when it
/// is one but falls outside the reason-code domain.
fn parse_value(digits: &str, token: &str) -> Option<Result<u8, RangeListError>> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value = digits.parse::<u64>().unwrap_or(u64::MAX);
    Some(u8::try_from(value).map_err(|_| RangeListError::OutOfDomain {
        token: token.to_string(),
        value,
    }))
}

fn overflow(token: &str, capacity: usize, remainder: &str) -> RangeListError {
    RangeListError::Overflow {
        token: token.to_string(),
        capacity,
        remainder: remainder.to_string(),
    }
}
