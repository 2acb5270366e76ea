// 🚗 Plate Normalizer
// Canonicalizes raw registration-plate input and classifies it into one of
// the recognized format families. Pure functions only - no I/O, no clock.

use crate::error::PlateRejection;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// FORMAT FAMILIES
// ============================================================================

/// The three recognized plate format families.
///
/// Classification precedence is fixed: `Standard` is tried first, then
/// `BharatSeries`, and `DelhiSpecial` only when neither of the others
/// matched. A standard plate that happens to contain `BH` in its series
/// position (e.g. `MH12BH1234`) therefore stays `Standard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateFormat {
    /// 2 letters + 2 digits + 1-2 letters + 4 digits (e.g. `MH12AB1234`)
    Standard,
    /// 2 digits + `BH` + 4 digits + 1-2 letters (e.g. `26BH1234AA`)
    BharatSeries,
    /// `DL` + 1-2 digit RTO + 1 letter category + 1-2 letter series + 4 digits
    /// (e.g. `DL2CAF5031`)
    DelhiSpecial,
}

impl PlateFormat {
    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            PlateFormat::Standard => "Standard",
            PlateFormat::BharatSeries => "Bharat Series",
            PlateFormat::DelhiSpecial => "Delhi Special",
        }
    }

    /// Short code for storage
    pub fn code(&self) -> &'static str {
        match self {
            PlateFormat::Standard => "standard",
            PlateFormat::BharatSeries => "bharat_series",
            PlateFormat::DelhiSpecial => "delhi_special",
        }
    }
}

// ============================================================================
// PLATE
// ============================================================================

/// A normalized registration plate: uppercase alphanumerics, no separators,
/// classified into exactly one [`PlateFormat`].
///
/// A `Plate` can only be obtained through [`Plate::normalize`], so holding
/// one is proof the string passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Plate {
    value: String,
    format: PlateFormat,
}

const MIN_LEN: usize = 8;
const MAX_LEN: usize = 12;

impl Plate {
    /// Normalize raw user input into a canonical plate.
    ///
    /// Strips whitespace and punctuation, uppercases, keeps alphanumerics
    /// only, then length-checks and classifies. Idempotent: normalizing an
    /// already-canonical plate returns the same value.
    pub fn normalize(raw: &str) -> Result<Plate, PlateRejection> {
        let canonical: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if canonical.is_empty() {
            return Err(PlateRejection::Empty);
        }
        if canonical.len() < MIN_LEN || canonical.len() > MAX_LEN {
            return Err(PlateRejection::BadLength(canonical.len()));
        }

        let format = classify(canonical.as_bytes()).ok_or(PlateRejection::UnrecognizedFormat)?;

        Ok(Plate {
            value: canonical,
            format,
        })
    }

    /// Rebuild a plate from a value that is already canonical (e.g. read
    /// back from storage). Fails if the stored value no longer validates.
    pub fn from_canonical(value: &str) -> Result<Plate, PlateRejection> {
        Plate::normalize(value)
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn format(&self) -> PlateFormat {
        self.format
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Classify a canonical (uppercase alphanumeric) plate. Precedence:
/// Standard, then BharatSeries, then DelhiSpecial.
fn classify(s: &[u8]) -> Option<PlateFormat> {
    if matches_standard(s) {
        Some(PlateFormat::Standard)
    } else if matches_bharat(s) {
        Some(PlateFormat::BharatSeries)
    } else if matches_delhi(s) {
        Some(PlateFormat::DelhiSpecial)
    } else {
        None
    }
}

fn letters(s: &[u8]) -> bool {
    !s.is_empty() && s.iter().all(u8::is_ascii_uppercase)
}

fn digits(s: &[u8]) -> bool {
    !s.is_empty() && s.iter().all(u8::is_ascii_digit)
}

/// 2 letters + 2 digits + 1-2 letter series + 4 digits (length 9 or 10).
fn matches_standard(s: &[u8]) -> bool {
    if s.len() < 9 || s.len() > 10 {
        return false;
    }
    let series_len = s.len() - 8;
    letters(&s[0..2])
        && digits(&s[2..4])
        && letters(&s[4..4 + series_len])
        && digits(&s[4 + series_len..])
}

/// 2 digits + literal `BH` + 4 digits + 1-2 letters (length 9 or 10).
fn matches_bharat(s: &[u8]) -> bool {
    if s.len() < 9 || s.len() > 10 {
        return false;
    }
    digits(&s[0..2]) && &s[2..4] == b"BH" && digits(&s[4..8]) && letters(&s[8..])
}

/// `DL` + 1-2 digit RTO + 1 letter category + 1-2 letter series + 4 digits
/// (length 9 to 11). Only reached when the generic patterns did not match.
fn matches_delhi(s: &[u8]) -> bool {
    if &s[0..2] != b"DL" {
        return false;
    }
    for rto_len in 1..=2usize {
        for series_len in 1..=2usize {
            if 2 + rto_len + 1 + series_len + 4 != s.len() {
                continue;
            }
            let cat = 2 + rto_len;
            if digits(&s[2..cat])
                && letters(&s[cat..cat + 1])
                && letters(&s[cat + 1..cat + 1 + series_len])
                && digits(&s[cat + 1 + series_len..])
            {
                return true;
            }
        }
    }
    false
}

// ============================================================================
// TESTS
// ============================================================================
