//! delete-after expiry evaluation

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::crd::{ClusterDeployment, DELETE_AFTER_ANNOTATION};
use crate::Error;

/// Added to the remaining lifetime so the next cycle lands after expiry
pub const EXPIRY_REQUEUE_MARGIN: Duration = Duration::from_secs(60);

/// Outcome of evaluating a ClusterDeployment's expiry policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiry {
    /// No policy applies
    None,
    /// The cluster has outlived its delete-after duration
    Expired,
    /// Re-evaluate after the given delay
    ScheduleAfter(Duration),
}

/// Parse a delete-after annotation value such as `48h`, `1h30m` or `1.5h`
///
/// Values follow Go duration syntax: an optionally signed sequence of decimal
/// numbers, each with an optional fraction and a unit out of `ns`, `us`
/// (`µs`), `ms`, `s`, `m` and `h`. A bare `0` needs no unit. A negative
/// lifetime ends before the resource was created.
pub fn parse_delete_after(value: &str) -> Result<chrono::Duration, Error> {
    parse_go_duration(value)
        .map_err(|msg| Error::invalid_annotation(DELETE_AFTER_ANNOTATION, value, msg))
}

fn unit_nanos(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(1),
        "us" | "\u{b5}s" | "\u{3bc}s" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60 * 1_000_000_000),
        "h" => Some(3_600 * 1_000_000_000),
        _ => None,
    }
}

fn split_digits(s: &str) -> (&str, &str) {
    s.split_at(s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len()))
}

fn parse_go_duration(value: &str) -> Result<chrono::Duration, String> {
    let (negative, mut rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    if rest == "0" {
        return Ok(chrono::Duration::zero());
    }
    if rest.is_empty() {
        return Err("expected a duration such as 48h".to_string());
    }

    let out_of_range = || "duration out of range".to_string();
    let mut total: u64 = 0;
    while !rest.is_empty() {
        let (whole, tail) = split_digits(rest);
        let (fraction, tail) = match tail.strip_prefix('.') {
            Some(tail) => split_digits(tail),
            None => ("", tail),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(format!("expected a number at {rest:?}"));
        }

        let unit_len = tail
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        if unit.is_empty() {
            return Err(format!("missing unit after {whole}"));
        }
        let scale = unit_nanos(unit).ok_or_else(|| format!("unknown unit {unit:?}"))?;

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| out_of_range())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(out_of_range)?;

        // digits past the 18th cannot change the nanosecond count
        let fraction = &fraction[..fraction.len().min(18)];
        if !fraction.is_empty() {
            let digits: u128 = fraction.parse().map_err(|_| out_of_range())?;
            let part = digits * u128::from(scale) / 10u128.pow(fraction.len() as u32);
            let part = u64::try_from(part).map_err(|_| out_of_range())?;
            nanos = nanos.checked_add(part).ok_or_else(out_of_range)?;
        }

        total = total.checked_add(nanos).ok_or_else(out_of_range)?;
        rest = tail;
    }

    let signed = if negative {
        -i128::from(total)
    } else {
        i128::from(total)
    };
    let nanos = i64::try_from(signed).map_err(|_| out_of_range())?;
    Ok(chrono::Duration::nanoseconds(nanos))
}

/// Evaluate the delete-after policy of `cd` at time `now`
///
/// A malformed annotation is an error even when the resource has no creation
/// timestamp yet.
pub fn evaluate(cd: &ClusterDeployment, now: DateTime<Utc>) -> Result<Expiry, Error> {
    let Some(raw) = cd.delete_after() else {
        return Ok(Expiry::None);
    };
    let lifetime = parse_delete_after(raw)?;

    let Some(created) = cd.metadata.creation_timestamp.as_ref() else {
        debug!(delete_after = %raw, "no creation timestamp, skipping expiry");
        return Ok(Expiry::None);
    };

    let expiry = created
        .0
        .checked_add_signed(lifetime)
        .ok_or_else(|| {
            Error::invalid_annotation(DELETE_AFTER_ANNOTATION, raw, "duration out of range")
        })?;

    if now > expiry {
        return Ok(Expiry::Expired);
    }

    let remaining = (expiry - now).to_std().unwrap_or_default();
    Ok(Expiry::ScheduleAfter(remaining + EXPIRY_REQUEUE_MARGIN))
}
