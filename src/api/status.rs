use rocket::{serde::json::Json, Route, State};

use crate::{
    credentials::CredentialStore,
    error::Result,
    model::{api::status::FoundRequest, mongodb::Id},
    reconcile::{compute_status, sheets::SpreadsheetDataProvider, ReconciliationResult},
};

pub fn routes() -> Vec<Route> {
    routes![status_from_list, status_from_sheet]
}

#[post("/elections/<election_id>/status", data = "<request>", format = "json")]
async fn status_from_list(
    election_id: Id,
    request: Json<FoundRequest>,
    store: CredentialStore,
) -> Result<Json<ReconciliationResult>> {
    let expected = store.active_list(election_id).await?;
    let result = compute_status(expected.values(), &request.found);
    Ok(Json(result))
}

#[get("/elections/<election_id>/status/sheets/<sheet_id>")]
async fn status_from_sheet(
    election_id: Id,
    sheet_id: &str,
    store: CredentialStore,
    sheets: &State<Box<dyn SpreadsheetDataProvider>>,
) -> Result<Json<ReconciliationResult>> {
    let expected = store.active_list(election_id).await?;
    let found = sheets.submissions(sheet_id).await?;
    let result = compute_status(expected.values(), found);
    debug!(
        "Election {election_id}: {} responses, {} remaining",
        result.responses.len(),
        result.remaining.len()
    );
    Ok(Json(result))
}
