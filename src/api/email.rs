use rocket::{serde::json::Json, Route, State};

use crate::{
    credentials::CredentialStore,
    error::{Error, Result},
    model::{
        api::email::{JobDescription, JobStarted, SendRequest},
        ein::Ein,
        mongodb::Id,
    },
    notify::{CampaignRequest, NotificationDispatcher},
};

pub fn routes() -> Vec<Route> {
    routes![send_email, email_status]
}

/// Start a campaign. Responds as soon as the job exists; sending carries on
/// in the background.
#[post("/email/send", data = "<request>", format = "json")]
async fn send_email(
    request: Json<SendRequest>,
    store: CredentialStore,
    dispatcher: &State<NotificationDispatcher>,
) -> Result<Json<JobStarted>> {
    let request = request.0;
    if request.email_from.trim().is_empty() {
        return Err(Error::Validation("Missing sender address".to_string()));
    }
    let election_id = *request.election_id;

    let target_credentials = match request.voter_list {
        Some(list) => list
            .iter()
            .map(|value| {
                value
                    .parse::<Ein>()
                    .map_err(|e| Error::Validation(format!("Bad credential '{value}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?,
        None => store.active_list(election_id).await?.into_values().collect(),
    };

    let id = dispatcher
        .start_job(CampaignRequest {
            election_id,
            from: request.email_from,
            subject: request.email_subject,
            body_template: request.email_text,
            campaign_type: request.email_type,
            target_credentials,
        })
        .await?;
    Ok(Json(JobStarted { id: id.into() }))
}

#[get("/email/status/<job_id>")]
async fn email_status(
    job_id: Id,
    dispatcher: &State<NotificationDispatcher>,
) -> Result<Json<JobDescription>> {
    let job = dispatcher.job(job_id).await?;
    Ok(Json(job.into()))
}
