use serde::Deserialize;

/// Request body carrying raw submitted credentials for reconciliation.
#[derive(Debug, Deserialize)]
pub struct FoundRequest {
    pub found: Vec<String>,
}
