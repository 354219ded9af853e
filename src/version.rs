//! Semantic version parsing and ranking
//!
//! Registry version keys are free-form strings ("0.4.0", "v0.5", "12"), so parsing
//! is lenient: a leading `v` is stripped, missing components default to zero and
//! anything after the numeric prefix (pre-release tags, build metadata) is ignored.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Weight of each component in [`distance`]
const MAJOR_WEIGHT: f64 = 10_000.0;
const MINOR_WEIGHT: f64 = 100.0;
const PATCH_WEIGHT: f64 = 1.0;

/// Tie-breaking penalties applied when the candidate is older than the target
const MAJOR_PENALTY: f64 = 1.0;
const MINOR_PENALTY: f64 = 0.5;
const PATCH_PENALTY: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version string
    ///
    /// Returns `None` when the string does not start with a numeric major
    /// component (after an optional `v`). Never panics.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let rest = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let (major, mut rest) = take_number(rest)?;
        let mut components = [0u64; 2];

        for slot in components.iter_mut() {
            let Some(after_dot) = rest.strip_prefix('.') else {
                break;
            };
            match take_number(after_dot) {
                Some((value, remaining)) => {
                    *slot = value;
                    rest = remaining;
                }
                None => break,
            }
        }

        Some(Self::new(major, components[0], components[1]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Split a leading run of ASCII digits off `input`
fn take_number(input: &str) -> Option<(u64, &str)> {
    let end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    if end == 0 {
        return None;
    }
    let value = input[..end].parse().ok()?;
    Some((value, &input[end..]))
}

/// Weighted distance between a requested version and a registry candidate
///
/// Lower is closer. When two candidates are the same distance away, the one that
/// is not older than `target` wins thanks to a small penalty on older candidates.
pub fn distance(target: &Version, candidate: &Version) -> f64 {
    let diff = |a: u64, b: u64| a.abs_diff(b) as f64;

    let base = diff(target.major, candidate.major) * MAJOR_WEIGHT
        + diff(target.minor, candidate.minor) * MINOR_WEIGHT
        + diff(target.patch, candidate.patch) * PATCH_WEIGHT;

    let penalty = if candidate.major != target.major {
        if candidate.major < target.major {
            MAJOR_PENALTY
        } else {
            0.0
        }
    } else if candidate.minor != target.minor {
        if candidate.minor < target.minor {
            MINOR_PENALTY
        } else {
            0.0
        }
    } else if candidate.patch < target.patch {
        PATCH_PENALTY
    } else {
        0.0
    };

    base + penalty
}

/// Check a version string against a simple constraint expression
///
/// Supported: `*`, bare versions (equality) and comparators `>=`, `>`, `<=`, `<`,
/// `=`, `^`, `~`. Multiple comparators separated by commas or whitespace must all
/// hold. Returns `None` if the version or any comparator is unparsable.
pub fn satisfies(version: &str, constraint: &str) -> Option<bool> {
    let version = Version::parse(version)?;
    let constraint = constraint.trim();

    if constraint.is_empty() || constraint == "*" || constraint.eq_ignore_ascii_case("x") {
        return Some(true);
    }

    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in constraint.split([',', ' ']).filter(|t| !t.is_empty()) {
        if is_operator(token) {
            pending_op = Some(token);
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(format!("{op}{token}")),
            None => tokens.push(token.to_string()),
        }
    }
    if pending_op.is_some() {
        return None;
    }

    for token in &tokens {
        if !comparator_holds(&version, token)? {
            return Some(false);
        }
    }
    Some(true)
}

fn is_operator(token: &str) -> bool {
    matches!(token, ">=" | ">" | "<=" | "<" | "=" | "^" | "~")
}

fn comparator_holds(version: &Version, comparator: &str) -> Option<bool> {
    let (op, raw) = [">=", "<=", ">", "<", "=", "^", "~"]
        .iter()
        .find_map(|op| comparator.strip_prefix(op).map(|rest| (*op, rest)))
        .unwrap_or(("=", comparator));
    let bound = Version::parse(raw)?;
    let ordering = version.cmp(&bound);

    let holds = match op {
        ">=" => ordering != Ordering::Less,
        "<=" => ordering != Ordering::Greater,
        ">" => ordering == Ordering::Greater,
        "<" => ordering == Ordering::Less,
        "^" => {
            let upper = if bound.major > 0 {
                Version::new(bound.major + 1, 0, 0)
            } else {
                Version::new(0, bound.minor + 1, 0)
            };
            *version >= bound && *version < upper
        }
        "~" => *version >= bound && *version < Version::new(bound.major, bound.minor + 1, 0),
        _ => ordering == Ordering::Equal,
    };
    Some(holds)
}
