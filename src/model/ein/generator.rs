use std::collections::HashSet;

use rand::{
    distributions::{Distribution, Uniform},
    Rng,
};
use thiserror::Error;

use super::Ein;
use crate::model::mongodb::Id;

/// Redraws allowed for a single credential before the digit space is
/// considered exhausted.
pub const MAX_DRAWS: usize = 1_000;

/// Widest credential accepted. `10^38` is the largest power of ten in a `u128`.
pub const MAX_DIGITS: usize = 38;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EinError {
    #[error(
        "cannot generate {count} credentials of {digits} digits: \
count must be at least 1 and digits between {min_digits} and {max_digits}",
        max_digits = MAX_DIGITS
    )]
    InvalidParameters {
        count: usize,
        digits: usize,
        min_digits: usize,
    },
    #[error("no unused {digits}-digit credential found after {attempts} draws")]
    CapacityExceeded { digits: usize, attempts: usize },
    #[error("voter {0} holds no credential in this election")]
    UnknownVoter(Id),
}

/// The fewest digits able to hold `count` distinct credentials.
pub fn min_digits(count: usize) -> usize {
    match count {
        0 => 1,
        n => n.ilog10() as usize + 1,
    }
}

/// Generate `count` distinct random credentials of `digits` numerals each.
pub fn generate(count: usize, digits: usize) -> Result<Vec<Ein>, EinError> {
    generate_with(&mut rand::thread_rng(), count, digits)
}

/// [`generate`] with a caller-supplied random source.
pub fn generate_with<R>(rng: &mut R, count: usize, digits: usize) -> Result<Vec<Ein>, EinError>
where
    R: Rng + ?Sized,
{
    if count < 1 || digits < min_digits(count) || digits > MAX_DIGITS {
        return Err(EinError::InvalidParameters {
            count,
            digits,
            min_digits: min_digits(count),
        });
    }

    let mut taken = HashSet::with_capacity(count);
    let mut eins = Vec::with_capacity(count);
    while eins.len() < count {
        let ein = random_ein_with(rng, digits, &taken)?;
        taken.insert(ein.clone());
        eins.push(ein);
    }
    Ok(eins)
}

/// Draw one random credential that is not in `existing`.
pub fn random_ein(digits: usize, existing: &HashSet<Ein>) -> Result<Ein, EinError> {
    random_ein_with(&mut rand::thread_rng(), digits, existing)
}

/// [`random_ein`] with a caller-supplied random source.
///
/// Rejection-samples at most [`MAX_DRAWS`] times. A digit space that is
/// already full fails immediately.
pub fn random_ein_with<R>(
    rng: &mut R,
    digits: usize,
    existing: &HashSet<Ein>,
) -> Result<Ein, EinError>
where
    R: Rng + ?Sized,
{
    let invalid = EinError::InvalidParameters {
        count: 1,
        digits,
        min_digits: 1,
    };
    if digits == 0 || digits > MAX_DIGITS {
        return Err(invalid);
    }
    let space = u32::try_from(digits)
        .ok()
        .and_then(|width| 10u128.checked_pow(width))
        .ok_or(invalid)?;
    if existing.len() as u128 >= space {
        return Err(EinError::CapacityExceeded {
            digits,
            attempts: 0,
        });
    }

    let digit_dist = Uniform::from(0..=9u32);
    for _ in 0..MAX_DRAWS {
        let raw: String = (0..digits)
            .filter_map(|_| char::from_digit(digit_dist.sample(rng), 10))
            .collect();
        let ein = Ein::from_raw(&raw);
        if !existing.contains(&ein) {
            return Ok(ein);
        }
    }
    Err(EinError::CapacityExceeded {
        digits,
        attempts: MAX_DRAWS,
    })
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::model::ein::normalize;

    #[test]
    fn min_digits_is_decimal_width() {
        assert_eq!(min_digits(1), 1);
        assert_eq!(min_digits(9), 1);
        assert_eq!(min_digits(10), 2);
        assert_eq!(min_digits(999), 3);
        assert_eq!(min_digits(1000), 4);
    }

    #[test]
    fn generates_distinct_credentials_of_requested_width() {
        for digits in 3..30 {
            let eins = generate(10, digits).unwrap();
            assert_eq!(eins.len(), 10);
            let unique: HashSet<_> = eins.iter().map(Ein::normalized).collect();
            assert_eq!(unique.len(), 10);
            for ein in &eins {
                assert_eq!(normalize(ein.as_str()).len(), digits);
                assert!(ein.normalized().chars().all(|c| c.is_ascii_digit()));
            }
        }
    }

    #[test]
    fn fills_a_nearly_full_space() {
        // 9 of the 10 one-digit values.
        let mut rng = StdRng::seed_from_u64(7);
        let eins = generate_with(&mut rng, 9, 1).unwrap();
        let unique: HashSet<_> = eins.iter().collect();
        assert_eq!(unique.len(), 9);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert_eq!(
            generate(0, 10),
            Err(EinError::InvalidParameters {
                count: 0,
                digits: 10,
                min_digits: 1
            })
        );
        assert_eq!(
            generate(100, 2),
            Err(EinError::InvalidParameters {
                count: 100,
                digits: 2,
                min_digits: 3
            })
        );
    }

    #[test]
    fn rejects_oversized_widths() {
        assert_eq!(
            generate(5, MAX_DIGITS + 1),
            Err(EinError::InvalidParameters {
                count: 5,
                digits: MAX_DIGITS + 1,
                min_digits: 1
            })
        );
        // Must not wrap around to a one-digit space.
        let existing: HashSet<Ein> = (0..10).map(|d| Ein::from_raw(&d.to_string())).collect();
        assert!(matches!(
            random_ein((1 << 32) + 1, &existing),
            Err(EinError::InvalidParameters { .. })
        ));
        assert!(matches!(
            random_ein(1_000_000_000, &HashSet::new()),
            Err(EinError::InvalidParameters { .. })
        ));

        let widest = generate(3, MAX_DIGITS).unwrap();
        assert!(widest.iter().all(|ein| ein.digits() == MAX_DIGITS));
    }

    #[test]
    fn full_space_reports_capacity() {
        let existing: HashSet<Ein> = (0..10).map(|d| Ein::from_raw(&d.to_string())).collect();
        assert_eq!(
            random_ein(1, &existing),
            Err(EinError::CapacityExceeded {
                digits: 1,
                attempts: 0
            })
        );
    }

    #[test]
    fn random_ein_avoids_existing() {
        let mut existing: HashSet<Ein> = (1..10).map(|d| Ein::from_raw(&d.to_string())).collect();
        let ein = random_ein(1, &existing).unwrap();
        assert_eq!(ein.as_str(), "0");

        existing.insert(ein);
        assert!(matches!(
            random_ein(1, &existing),
            Err(EinError::CapacityExceeded { .. })
        ));
    }
}
