use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// A named pool of voters that elections draw their roster from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    #[serde(rename = "_id")]
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// IDs of the voters in this pool.
    pub members: Vec<Id>,
}
