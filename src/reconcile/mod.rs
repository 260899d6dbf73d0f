//! Matching submitted credentials against the ones that were handed out.

use std::collections::HashSet;

use serde::Serialize;

use crate::model::ein::{normalize, Ein};

pub mod sheets;

/// Turnout of an election, as far as the submissions show.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    /// Expected credentials that were submitted, in order of first submission.
    pub responses: Vec<Ein>,
    /// Expected credentials nobody submitted, in expected order.
    pub remaining: Vec<Ein>,
    /// Submissions of an expected credential that was already seen.
    pub duplicates: usize,
    /// Submissions matching no expected credential, blanks included.
    pub unknowns: usize,
}

/// Compare raw submissions with the expected credentials.
///
/// Both sides are normalised first, so `123-456-789`, `123 456 789` and
/// `123456789` all match. Output credentials are regrouped from the
/// normalised value and may be formatted differently from the input.
pub fn compute_status<E, F>(
    expected: impl IntoIterator<Item = E>,
    found: impl IntoIterator<Item = F>,
) -> ReconciliationResult
where
    E: AsRef<str>,
    F: AsRef<str>,
{
    let mut expected_set = HashSet::new();
    let expected: Vec<String> = expected
        .into_iter()
        .map(|value| normalize(value.as_ref()))
        .filter(|value| expected_set.insert(value.clone()))
        .collect();

    let mut result = ReconciliationResult::default();
    let mut seen = HashSet::new();
    for value in found {
        let value = normalize(value.as_ref());
        if !expected_set.contains(&value) {
            result.unknowns += 1;
        } else if seen.contains(&value) {
            result.duplicates += 1;
        } else {
            result.responses.push(Ein::from_raw(&value));
            seen.insert(value);
        }
    }
    result.remaining = expected
        .iter()
        .filter(|value| !seen.contains(*value))
        .map(|value| Ein::from_raw(value))
        .collect();
    result
}
