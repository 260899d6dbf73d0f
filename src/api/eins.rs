use rocket::{serde::json::Json, Route, State};

use crate::{
    credentials::CredentialStore,
    error::Result,
    model::{
        api::ein::{ActiveEins, IssueRequest},
        ein::Ein,
        mongodb::Id,
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![get_eins, issue_eins, replace_ein]
}

#[get("/elections/<election_id>/eins")]
async fn get_eins(election_id: Id, store: CredentialStore) -> Result<Json<ActiveEins>> {
    let eins = store.active_list(election_id).await?;
    Ok(Json(eins.into()))
}

#[post("/elections/<election_id>/eins", data = "<request>", format = "json")]
async fn issue_eins(
    election_id: Id,
    request: Json<IssueRequest>,
    store: CredentialStore,
    config: &State<Config>,
) -> Result<Json<ActiveEins>> {
    let digits = request.digits.unwrap_or_else(|| config.ein_digits());
    let eins = store.issue(election_id, digits).await?;
    Ok(Json(eins.into()))
}

#[post("/elections/<election_id>/eins/<voter_id>/replace")]
async fn replace_ein(election_id: Id, voter_id: Id, store: CredentialStore) -> Result<Json<Ein>> {
    let ein = store.replace(election_id, voter_id).await?;
    Ok(Json(ein))
}
