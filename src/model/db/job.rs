use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::{
    model::{
        ein::Ein,
        mongodb::{serde_string_map, Id},
    },
    notify::transport::SendInfo,
};

/// What an email campaign is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignType {
    #[default]
    Initial,
    Reminders,
    ThankYous,
}

/// Lifecycle of a job: `Created -> Dispatching -> (Complete | AbortedFatal)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    #[default]
    Created,
    Dispatching,
    Complete,
    AbortedFatal,
}

impl JobState {
    /// Has the send loop stopped for good?
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::AbortedFatal)
    }
}

/// Delivery outcome for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Accepted,
    Rejected,
    Pending,
    Unknown,
    /// The send itself errored.
    Failed,
}

impl Outcome {
    /// Classify a provider result: the first non-empty list of accepted,
    /// rejected, pending wins.
    pub fn classify(info: &SendInfo) -> Self {
        if !info.accepted.is_empty() {
            Self::Accepted
        } else if !info.rejected.is_empty() {
            Self::Rejected
        } else if !info.pending.is_empty() {
            Self::Pending
        } else {
            Self::Unknown
        }
    }

    fn bucket(self) -> Option<Bucket> {
        match self {
            Self::Accepted => Some(Bucket::Success),
            Self::Rejected | Self::Failed => Some(Bucket::Failed),
            Self::Pending => Some(Bucket::Pending),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Bucket {
    Success,
    Pending,
    Failed,
}

/// How repeated failures for the same recipient are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureAccounting {
    /// Every failure adds to `failed_count`, even for a recipient that
    /// already has a recorded outcome.
    #[default]
    Additive,
    /// Failures replace the recipient's previous outcome, like every other
    /// classification does.
    Idempotent,
}

/// Per-recipient delivery record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientStatus {
    pub message_id: Option<String>,
    pub email: String,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The mutable part of a job, written back after every recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub state: JobState,
    pub expected: u32,
    pub success_count: u32,
    pub pending_count: u32,
    pub failed_count: u32,
    #[serde(with = "serde_string_map")]
    pub status: HashMap<Id, RecipientStatus>,
    /// Job-level failure that stopped the whole campaign.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgress {
    /// Record a provider result for one recipient.
    ///
    /// Any previous outcome for the recipient is backed out of the counters
    /// first, so re-classifying a recipient never drifts the totals.
    pub fn record_outcome(&mut self, recipient: Id, email: &str, info: &SendInfo) -> Outcome {
        let outcome = Outcome::classify(info);
        self.forget(&recipient);
        self.count(outcome);
        self.status.insert(
            recipient,
            RecipientStatus {
                message_id: info.message_id.clone(),
                email: email.to_string(),
                outcome,
                error: None,
            },
        );
        outcome
    }

    /// Record a send error for one recipient.
    ///
    /// Under [`FailureAccounting::Additive`] this only ever adds to
    /// `failed_count`, so calling it twice for one recipient counts twice.
    pub fn record_failure(
        &mut self,
        recipient: Id,
        email: &str,
        error: String,
        accounting: FailureAccounting,
    ) {
        if accounting == FailureAccounting::Idempotent {
            self.forget(&recipient);
        }
        self.count(Outcome::Failed);
        self.status.insert(
            recipient,
            RecipientStatus {
                message_id: None,
                email: email.to_string(),
                outcome: Outcome::Failed,
                error: Some(error),
            },
        );
    }

    /// True once every expected recipient has succeeded or failed.
    /// Pending recipients are not waited for.
    pub fn is_complete(&self) -> bool {
        self.expected > 0 && self.success_count + self.failed_count == self.expected
    }

    fn forget(&mut self, recipient: &Id) {
        let previous = self.status.get(recipient).and_then(|s| s.outcome.bucket());
        if let Some(bucket) = previous {
            let counter = self.counter(bucket);
            *counter = counter.saturating_sub(1);
        }
    }

    fn count(&mut self, outcome: Outcome) {
        if let Some(bucket) = outcome.bucket() {
            *self.counter(bucket) += 1;
        }
    }

    fn counter(&mut self, bucket: Bucket) -> &mut u32 {
        match bucket {
            Bucket::Success => &mut self.success_count,
            Bucket::Pending => &mut self.pending_count,
            Bucket::Failed => &mut self.failed_count,
        }
    }
}

/// Core email job data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationJobCore {
    pub election_id: Id,
    pub from: String,
    pub subject: String,
    pub body_template: String,
    pub campaign_type: CampaignType,
    /// Credentials whose holders should be emailed.
    pub target_credentials: Vec<Ein>,
    #[serde(default)]
    pub failure_accounting: FailureAccounting,
    #[serde(flatten)]
    pub progress: JobProgress,
}

impl NotificationJobCore {
    /// Start the send loop with a fixed number of expected recipients.
    /// `expected` is only ever set here.
    pub fn begin_dispatch(&mut self, expected: u32) {
        if self.progress.state != JobState::Created {
            warn!(
                "Ignoring dispatch start for a job already in state {:?}",
                self.progress.state
            );
            return;
        }
        self.progress.state = JobState::Dispatching;
        self.progress.expected = expected;
    }

    pub fn record_outcome(&mut self, recipient: Id, email: &str, info: &SendInfo) -> Outcome {
        self.progress.record_outcome(recipient, email, info)
    }

    pub fn record_failure(&mut self, recipient: Id, email: &str, error: String) {
        let accounting = self.failure_accounting;
        self.progress
            .record_failure(recipient, email, error, accounting)
    }

    pub fn is_complete(&self) -> bool {
        self.progress.is_complete()
    }

    /// The send loop ran to the end.
    pub fn finish(&mut self) {
        self.progress.state = JobState::Complete;
    }

    /// Stop the whole job with a job-level error.
    pub fn abort(&mut self, error: String) {
        self.progress.state = JobState::AbortedFatal;
        self.progress.error = Some(error);
    }
}

/// A job without an ID.
pub type NewNotificationJob = NotificationJobCore;

/// An email job from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationJob {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub job: NotificationJobCore,
}

impl Deref for NotificationJob {
    type Target = NotificationJobCore;

    fn deref(&self) -> &Self::Target {
        &self.job
    }
}

impl DerefMut for NotificationJob {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.job
    }
}
