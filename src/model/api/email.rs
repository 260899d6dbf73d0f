use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    db::job::{CampaignType, JobState, NotificationJob, RecipientStatus},
    mongodb::{serde_string_map, Id},
};

/// Request body for starting an email campaign.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub election_id: ApiId,
    pub email_from: String,
    pub email_subject: String,
    pub email_text: String,
    #[serde(default)]
    pub email_type: CampaignType,
    /// Credentials to email. Every active credential of the election if absent.
    pub voter_list: Option<Vec<String>>,
}

/// Response to a successfully started campaign.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStarted {
    pub id: ApiId,
}

/// An API-friendly snapshot of an email job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescription {
    pub id: ApiId,
    pub election_id: ApiId,
    pub from: String,
    pub subject: String,
    pub campaign_type: CampaignType,
    pub state: JobState,
    pub expected: u32,
    pub success_count: u32,
    pub pending_count: u32,
    pub failed_count: u32,
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "serde_string_map")]
    pub status: HashMap<Id, RecipientStatus>,
}

impl From<NotificationJob> for JobDescription {
    fn from(job: NotificationJob) -> Self {
        let complete = job.is_complete();
        let core = job.job;
        Self {
            id: job.id.into(),
            election_id: core.election_id.into(),
            from: core.from,
            subject: core.subject,
            campaign_type: core.campaign_type,
            state: core.progress.state,
            expected: core.progress.expected,
            success_count: core.progress.success_count,
            pending_count: core.progress.pending_count,
            failed_count: core.progress.failed_count,
            complete,
            error: core.progress.error,
            status: core.progress.status,
        }
    }
}
