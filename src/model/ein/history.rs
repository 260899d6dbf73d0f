use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{generate, random_ein, Ein, EinError};
use crate::model::mongodb::{serde_string_map, Id};

/// Every credential one voter has held in one election, most recent first.
///
/// Replaced credentials are never removed, only pushed back, so the history
/// doubles as an audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EinHistory(Vec<Ein>);

impl EinHistory {
    fn new(ein: Ein) -> Self {
        Self(vec![ein])
    }

    /// The credential currently in use.
    pub fn active(&self) -> Option<&Ein> {
        self.0.first()
    }

    /// Credentials that have been replaced, most recently retired first.
    pub fn retired(&self) -> &[Ein] {
        self.0.get(1..).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ein> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn activate(&mut self, ein: Ein) {
        self.0.insert(0, ein);
    }
}

/// The credential map of one election: voter ID to credential history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EinMap {
    #[serde(with = "serde_string_map")]
    histories: HashMap<Id, EinHistory>,
}

impl EinMap {
    /// Issue one fresh credential of `digits` numerals to every member.
    /// Repeated members receive a single credential.
    pub fn issue(members: &[Id], digits: usize) -> Result<Self, EinError> {
        let mut seen = HashSet::with_capacity(members.len());
        let members: Vec<Id> = members.iter().copied().filter(|id| seen.insert(*id)).collect();

        let eins = generate(members.len(), digits)?;
        let histories = members
            .into_iter()
            .zip(eins)
            .map(|(member, ein)| (member, EinHistory::new(ein)))
            .collect();
        Ok(Self { histories })
    }

    /// The active credential of every voter.
    pub fn active_list(&self) -> HashMap<Id, Ein> {
        self.histories
            .iter()
            .filter_map(|(voter, history)| Some((*voter, history.active()?.clone())))
            .collect()
    }

    /// The active credential of a single voter.
    pub fn active(&self, voter: &Id) -> Option<&Ein> {
        self.histories.get(voter)?.active()
    }

    /// Every credential ever issued in this election, active or retired.
    pub fn all_historical_values(&self) -> HashSet<Ein> {
        self.histories
            .values()
            .flat_map(EinHistory::iter)
            .cloned()
            .collect()
    }

    pub fn history(&self, voter: &Id) -> Option<&EinHistory> {
        self.histories.get(voter)
    }

    /// Give `voter` a new credential, retiring (but keeping) the old one.
    ///
    /// The new credential has the same width as the one it replaces and
    /// collides with nothing ever issued in this election.
    pub fn replace(&mut self, voter: &Id) -> Result<Ein, EinError> {
        let digits = self
            .active(voter)
            .map(Ein::digits)
            .ok_or(EinError::UnknownVoter(*voter))?;
        let ein = random_ein(digits, &self.all_historical_values())?;
        self.histories
            .get_mut(voter)
            .ok_or(EinError::UnknownVoter(*voter))?
            .activate(ein.clone());
        Ok(ein)
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }
}
