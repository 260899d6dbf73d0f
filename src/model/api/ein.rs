use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    ein::Ein,
    mongodb::{serde_string_map, Id},
};

/// Request body for issuing an election's credentials.
#[derive(Debug, Default, Deserialize)]
pub struct IssueRequest {
    /// Credential width; the configured default if absent.
    pub digits: Option<usize>,
}

/// The active credential of every voter in an election, keyed by voter ID.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ActiveEins {
    #[serde(with = "serde_string_map")]
    pub eins: HashMap<Id, Ein>,
}

impl From<HashMap<Id, Ein>> for ActiveEins {
    fn from(eins: HashMap<Id, Ein>) -> Self {
        Self { eins }
    }
}
