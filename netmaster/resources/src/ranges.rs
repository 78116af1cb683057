//! Range strings such as `"11-1000,2001-3000"`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// An inclusive range of tag values.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TagRange {
    pub min: u32,
    pub max: u32,
}

// === impl TagRange ===

impl TagRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, tag: u32) -> bool {
        self.min <= tag && tag <= self.max
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.max - self.min + 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl std::fmt::Display for TagRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

/// Reads a comma-separated list of values or value ranges, each bounded by
/// `limit`.
///
/// The returned ranges are sorted and must not overlap. An empty string yields
/// no ranges.
pub fn parse_tag_ranges(s: &str, limit: u32) -> Result<Vec<TagRange>> {
    let invalid = |reason: String| Error::InvalidRange {
        range: s.to_string(),
        reason,
    };
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .map_err(|e| invalid(format!("parsing {:?}: {e}", v.trim())))
    };

    let mut ranges = Vec::new();
    for spec in s.split(',') {
        if spec.trim().is_empty() {
            continue;
        }
        let range = match spec.split_once('-') {
            None => {
                let v = parse(spec)?;
                TagRange::new(v, v)
            }
            Some((min, max)) => {
                let min = parse(min)?;
                let max = parse(max)?;
                if min > max {
                    return Err(invalid(format!("{min}-{max} must be increasing")));
                }
                TagRange::new(min, max)
            }
        };
        if range.max > limit {
            return Err(invalid(format!("{range} exceeds the maximum of {limit}")));
        }
        ranges.push(range);
    }

    ranges.sort();
    for pair in ranges.windows(2) {
        if pair[1].min <= pair[0].max {
            return Err(invalid(format!("{} overlaps {}", pair[0], pair[1])));
        }
    }

    Ok(ranges)
}

/// Formats a sorted sequence of values as a compact range list, e.g.
/// `"11-13, 20"`.
pub fn format_values(values: impl IntoIterator<Item = u32>) -> String {
    let mut ranges: Vec<TagRange> = Vec::new();
    for v in values {
        match ranges.last_mut() {
            Some(last) if last.max.checked_add(1) == Some(v) => last.max = v,
            _ => ranges.push(TagRange::new(v, v)),
        }
    }
    format_ranges(&ranges)
}

pub fn format_ranges(ranges: &[TagRange]) -> String {
    ranges
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tag_ranges() {
        use super::parse_tag_ranges;

        assert!(parse_tag_ranges("", 4095).unwrap().is_empty(), "empty");
        assert_eq!(
            parse_tag_ranges("11-1000", 4095).unwrap(),
            vec![TagRange::new(11, 1000)],
            "11-1000"
        );
        assert_eq!(
            parse_tag_ranges("2001-3000, 11-1000", 4095).unwrap(),
            vec![TagRange::new(11, 1000), TagRange::new(2001, 3000)],
            "sorted"
        );
        assert_eq!(
            parse_tag_ranges("7", 4095).unwrap(),
            vec![TagRange::new(7, 7)],
            "single"
        );
        assert!(parse_tag_ranges("20-10", 4095).is_err(), "decreasing");
        assert!(parse_tag_ranges("1-", 4095).is_err(), "1-");
        assert!(parse_tag_ranges("1-5000", 4095).is_err(), "limit");
        assert!(parse_tag_ranges("1-10,10-20", 4095).is_err(), "overlap");
        assert!(parse_tag_ranges("abc", 4095).is_err(), "abc");
    }

    #[test]
    fn formats_compact_ranges() {
        assert_eq!(format_values([11, 12, 13, 20]), "11-13, 20");
        assert_eq!(format_values(std::iter::empty()), "");
        assert_eq!(format_values([5]), "5");
    }
}
