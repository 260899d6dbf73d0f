use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator placed between the three groups of a formatted credential.
pub const SEPARATOR: char = '-';

/// An anonymised voter credential ("EIN"), stored in its grouped display form,
/// e.g. `123-456-7890`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ein(String);

impl Ein {
    /// Wrap raw characters (no separators), grouping them for display.
    pub fn from_raw(raw: &str) -> Self {
        Self(group(raw))
    }

    /// The formatted display string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// How many numerals this credential contains, ignoring separators.
    pub fn digits(&self) -> usize {
        self.0.chars().filter(char::is_ascii_digit).count()
    }

    /// The comparison key for this credential; see [`normalize`].
    pub fn normalized(&self) -> String {
        normalize(&self.0)
    }
}

impl Display for Ein {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ein {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("credential is empty")]
    Empty,
    #[error("credential contains an illegal character: '{0}'")]
    InvalidChar(char),
}

impl FromStr for Ein {
    type Err = ParseError;

    /// Accept a credential with or without separators. Numeric input is
    /// regrouped into the canonical display form, so `123-4567890` parses
    /// to `123-456-7890`. Other dashed input is kept as written.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseError::Empty);
        }
        if let Some(c) = s
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != SEPARATOR)
        {
            return Err(ParseError::InvalidChar(c));
        }

        let raw: String = s.chars().filter(|c| *c != SEPARATOR).collect();
        if raw.is_empty() {
            return Err(ParseError::Empty);
        }
        if !s.contains(SEPARATOR) || raw.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self::from_raw(&raw))
        } else {
            Ok(Self(s.to_string()))
        }
    }
}

/// Reduce free-text input to a comparison key: ASCII alphanumerics only, lowercased.
pub fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Widths of the three display groups for a credential of `len` characters.
///
/// The remainder of `len / 3` is pushed to the right: `9 -> 3-3-3`,
/// `10 -> 3-3-4`, `11 -> 3-4-4`.
pub fn group_widths(len: usize) -> [usize; 3] {
    let div = len / 3;
    let rem = len % 3;
    [
        div,
        div + usize::from(rem >= 2),
        div + usize::from(rem >= 1),
    ]
}

/// Split `raw` into three separator-joined groups. Anything shorter than three
/// characters cannot be split evenly and is returned as-is.
fn group(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    if chars.len() < 3 {
        return raw.to_string();
    }

    let [x, y, _] = group_widths(chars.len());
    let mut out = String::with_capacity(chars.len() + 2);
    for (i, c) in chars.iter().enumerate() {
        if i == x || i == x + y {
            out.push(SEPARATOR);
        }
        out.push(*c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widths_of(ein: &Ein) -> Vec<usize> {
        ein.as_str().split(SEPARATOR).map(str::len).collect()
    }

    #[test]
    fn group_widths_push_remainder_right() {
        assert_eq!(group_widths(9), [3, 3, 3]);
        assert_eq!(group_widths(10), [3, 3, 4]);
        assert_eq!(group_widths(11), [3, 4, 4]);
        assert_eq!(group_widths(3), [1, 1, 1]);
    }

    #[test]
    fn formats_into_three_groups() {
        assert_eq!(Ein::from_raw("123456789").as_str(), "123-456-789");
        assert_eq!(Ein::from_raw("1234567890").as_str(), "123-456-7890");
        assert_eq!(Ein::from_raw("12345678901").as_str(), "123-4567-8901");
    }

    #[test]
    fn every_width_matches_its_pattern() {
        let source = "0123456789".repeat(3);
        for len in 3..30 {
            let ein = Ein::from_raw(&source[..len]);
            assert_eq!(widths_of(&ein), group_widths(len).to_vec(), "length {len}");
            assert_eq!(ein.digits(), len);
        }
    }

    #[test]
    fn short_values_are_left_alone() {
        assert_eq!(Ein::from_raw("12").as_str(), "12");
        assert_eq!(Ein::from_raw("").as_str(), "");
    }

    #[test]
    fn parse_regroups_numerals() {
        assert_eq!("123456789".parse::<Ein>().unwrap().as_str(), "123-456-789");
        assert_eq!(" 12-3456-789 ".parse::<Ein>().unwrap().as_str(), "123-456-789");
        assert_eq!("123-4567890".parse::<Ein>().unwrap(), Ein::from_raw("1234567890"));
        assert_eq!("1-2-3-4-5-6-7-8-9-0".parse::<Ein>().unwrap().as_str(), "123-456-7890");
        assert_eq!("ab-cdefg".parse::<Ein>().unwrap().as_str(), "ab-cdefg");
        assert_eq!("--".parse::<Ein>(), Err(ParseError::Empty));
        assert_eq!("".parse::<Ein>(), Err(ParseError::Empty));
        assert_eq!("123 456".parse::<Ein>(), Err(ParseError::InvalidChar(' ')));
    }

    #[test]
    fn normalize_strips_and_lowercases() {
        assert_eq!(normalize(" 123-456_789 "), "123456789");
        assert_eq!(normalize("AbC-12"), "abc12");
        assert_eq!(Ein::from_raw("123456789").normalized(), "123456789");
    }
}
