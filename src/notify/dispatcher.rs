use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rocket::tokio;
use thiserror::Error;

use super::{
    markup::render_html,
    roster::{Roster, VoterRosterProvider},
    store::JobPersistenceStore,
    template::{has_placeholders, BodyTemplate, ElectionContext, TemplateContext, TemplateError},
    transport::{Envelope, MailTransport, TransportError},
};
use crate::{
    error::{Error, Result},
    model::{
        db::{
            job::{CampaignType, FailureAccounting, JobProgress, NewNotificationJob, NotificationJob},
            voter::Voter,
        },
        ein::Ein,
        mongodb::Id,
    },
};

/// Tunables for the send loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Pause between two consecutive recipients.
    pub throttle: Duration,
    pub failure_accounting: FailureAccounting,
    /// Extra attempts for a progress write that failed.
    pub persist_retries: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(500),
            failure_accounting: FailureAccounting::Additive,
            persist_retries: 3,
        }
    }
}

/// A request to email the holders of some credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignRequest {
    pub election_id: Id,
    pub from: String,
    pub subject: String,
    pub body_template: String,
    pub campaign_type: CampaignType,
    pub target_credentials: Vec<Ein>,
}

/// Why a single recipient could not be sent to.
#[derive(Debug, Error)]
enum RecipientError {
    #[error(transparent)]
    Render(#[from] TemplateError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Creates email jobs and runs their send loops in the background.
#[derive(Clone)]
pub struct NotificationDispatcher {
    roster: Arc<dyn VoterRosterProvider>,
    store: Arc<dyn JobPersistenceStore>,
    transport: Arc<dyn MailTransport>,
    settings: DispatchSettings,
}

impl NotificationDispatcher {
    pub fn new(
        roster: Arc<dyn VoterRosterProvider>,
        store: Arc<dyn JobPersistenceStore>,
        transport: Arc<dyn MailTransport>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            roster,
            store,
            transport,
            settings,
        }
    }

    /// Persist a new job and start sending in the background.
    ///
    /// Returns as soon as the job exists; progress is read back with
    /// [`NotificationDispatcher::job`].
    pub async fn start_job(&self, request: CampaignRequest) -> Result<Id> {
        if request.target_credentials.is_empty() {
            return Err(Error::Validation(
                "A campaign needs at least one target credential".to_string(),
            ));
        }

        let new_job = NewNotificationJob {
            election_id: request.election_id,
            from: request.from,
            subject: request.subject,
            body_template: request.body_template,
            campaign_type: request.campaign_type,
            target_credentials: request.target_credentials,
            failure_accounting: self.settings.failure_accounting,
            progress: JobProgress::default(),
        };
        let id = self.store.create(&new_job).await?;
        info!(
            "Created {:?} email job {id} for election {} with {} targets",
            new_job.campaign_type,
            new_job.election_id,
            new_job.target_credentials.len()
        );

        let dispatcher = self.clone();
        let job = NotificationJob { id, job: new_job };
        tokio::spawn(async move { dispatcher.run(job).await });
        Ok(id)
    }

    pub async fn job(&self, id: Id) -> Result<NotificationJob> {
        self.store.get(id).await
    }

    /// The send loop. Never returns an error: everything that goes wrong is
    /// recorded on the job itself.
    pub(crate) async fn run(&self, mut job: NotificationJob) {
        let roster = match self.roster.resolve(job.election_id).await {
            Ok(roster) => roster,
            Err(err) => return self.abort(&mut job, err.to_string()).await,
        };
        let Some(eins) = roster.election.eins.as_ref() else {
            let msg = format!("Election {} has no credentials issued", roster.election.id);
            return self.abort(&mut job, msg).await;
        };

        let recipients = select_recipients(&roster, &job.target_credentials);
        let expected = u32::try_from(recipients.len()).unwrap_or(u32::MAX);
        job.begin_dispatch(expected);
        debug!(
            "Job {} matched {expected} of {} voters",
            job.id,
            roster.voters.len()
        );

        let template = if has_placeholders(&job.body_template) {
            match BodyTemplate::compile(&job.body_template) {
                Ok(template) => Some(template),
                Err(err) => return self.abort(&mut job, err.to_string()).await,
            }
        } else {
            None
        };
        self.persist(&job).await;

        let election = ElectionContext::from(&roster.election);
        let last = recipients.len().saturating_sub(1);
        for (i, voter) in recipients.into_iter().enumerate() {
            // Selected recipients always hold an active credential.
            let Some(ein) = eins.active(&voter.id) else {
                continue;
            };
            let envelope = match build_envelope(&job, template.as_ref(), ein, voter, &election) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!("Job {}: could not render mail for {}: {err}", job.id, voter.id);
                    job.record_failure(voter.id, &voter.email, err.to_string());
                    self.persist(&job).await;
                    self.pause(i, last).await;
                    continue;
                }
            };

            match self.transport.send(&envelope).await.map_err(RecipientError::from) {
                Ok(info) => {
                    let outcome = job.record_outcome(voter.id, &voter.email, &info);
                    debug!("Job {}: {} -> {outcome:?}", job.id, voter.id);
                }
                Err(err) => {
                    warn!("Job {}: send to {} failed: {err}", job.id, voter.id);
                    job.record_failure(voter.id, &voter.email, err.to_string());
                }
            }
            self.persist(&job).await;
            self.pause(i, last).await;
        }

        job.finish();
        self.persist(&job).await;
        info!(
            "Job {} finished: {} sent, {} pending, {} failed of {}",
            job.id,
            job.progress.success_count,
            job.progress.pending_count,
            job.progress.failed_count,
            job.progress.expected
        );
    }

    async fn abort(&self, job: &mut NotificationJob, error: String) {
        error!("Job {} aborted: {error}", job.id);
        job.abort(error);
        self.persist(job).await;
    }

    /// Write progress, retrying a few times. A write that keeps failing is
    /// logged and the loop carries on.
    async fn persist(&self, job: &NotificationJob) {
        let attempts = self.settings.persist_retries + 1;
        for attempt in 1..=attempts {
            match self.store.update(job.id, &job.progress).await {
                Ok(()) => return,
                Err(err) if attempt < attempts => {
                    warn!("Job {}: progress write {attempt} failed: {err}", job.id)
                }
                Err(err) => error!(
                    "Job {}: giving up on progress write after {attempts} attempts: {err}",
                    job.id
                ),
            }
        }
    }

    async fn pause(&self, index: usize, last: usize) {
        if index < last && !self.settings.throttle.is_zero() {
            tokio::time::sleep(self.settings.throttle).await;
        }
    }
}

/// Voters whose active credential is one of `targets`, in roster order.
fn select_recipients<'a>(roster: &'a Roster, targets: &[Ein]) -> Vec<&'a Voter> {
    let Some(eins) = roster.election.eins.as_ref() else {
        return Vec::new();
    };
    let targets: HashSet<&Ein> = targets.iter().collect();
    roster
        .voters
        .iter()
        .filter(|voter| eins.active(&voter.id).map_or(false, |ein| targets.contains(ein)))
        .collect()
}

fn build_envelope(
    job: &NotificationJob,
    template: Option<&BodyTemplate>,
    ein: &Ein,
    voter: &Voter,
    election: &ElectionContext,
) -> std::result::Result<Envelope, RecipientError> {
    let text = match template {
        Some(template) => template.render(&TemplateContext::new(ein, voter, election))?,
        None => job.body_template.clone(),
    };
    Ok(Envelope {
        from: job.from.clone(),
        to: voter.email.clone(),
        subject: job.subject.clone(),
        html: render_html(&text),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::db::job::{JobState, Outcome},
        notify::testing::{init_logging, FakeRoster, FakeStore, FakeTransport},
    };

    fn settings() -> DispatchSettings {
        DispatchSettings {
            throttle: Duration::ZERO,
            ..Default::default()
        }
    }

    fn request(roster: &Roster, targets: Vec<Ein>, body: &str) -> CampaignRequest {
        CampaignRequest {
            election_id: roster.election.id,
            from: "board@example.com".to_string(),
            subject: "Your voting code".to_string(),
            body_template: body.to_string(),
            campaign_type: CampaignType::Initial,
            target_credentials: targets,
        }
    }

    fn targets(roster: &Roster, voters: &[usize]) -> Vec<Ein> {
        let eins = roster.election.eins.as_ref().unwrap();
        voters
            .iter()
            .map(|&i| eins.active(&roster.voters[i].id).unwrap().clone())
            .collect()
    }

    async fn run_to_end(
        roster: Option<Roster>,
        store: Arc<FakeStore>,
        transport: Arc<FakeTransport>,
        request: CampaignRequest,
    ) -> NotificationJob {
        init_logging();
        let dispatcher = NotificationDispatcher::new(
            Arc::new(FakeRoster(roster)),
            store.clone(),
            transport,
            settings(),
        );
        let new_job = NewNotificationJob {
            election_id: request.election_id,
            from: request.from,
            subject: request.subject,
            body_template: request.body_template,
            campaign_type: request.campaign_type,
            target_credentials: request.target_credentials,
            failure_accounting: FailureAccounting::Additive,
            progress: JobProgress::default(),
        };
        let id = store.create(&new_job).await.unwrap();
        dispatcher
            .run(NotificationJob { id, job: new_job })
            .await;
        store.get(id).await.unwrap()
    }

    #[rocket::async_test]
    async fn sends_only_to_targeted_voters() {
        let roster = Roster::example(5);
        let targets = targets(&roster, &[0, 2, 4]);
        let store = Arc::new(FakeStore::default());
        let transport = Arc::new(FakeTransport::default());

        let job = run_to_end(
            Some(roster.clone()),
            store,
            transport.clone(),
            request(&roster, targets.clone(), "Hi {{voter.firstName}}, your code is **{{EIN}}**."),
        )
        .await;

        assert_eq!(job.progress.state, JobState::Complete);
        assert_eq!(job.progress.expected, 3);
        assert_eq!(job.progress.success_count, 3);
        assert_eq!(job.progress.failed_count, 0);
        assert_eq!(job.progress.pending_count, 0);
        assert!(job.is_complete());

        let sent = transport.sent.lock().unwrap();
        let recipients: Vec<&str> = sent.iter().map(|e| e.to.as_str()).collect();
        let expected: Vec<&str> = [0, 2, 4]
            .iter()
            .map(|&i| roster.voters[i].email.as_str())
            .collect();
        assert_eq!(recipients, expected);
        assert_eq!(
            sent[0].text,
            format!("Hi Ada, your code is **{}**.", targets[0])
        );
        assert_eq!(
            sent[0].html,
            format!("<p>Hi Ada, your code is <strong>{}</strong>.</p>\n", targets[0])
        );
    }

    #[rocket::async_test]
    async fn plain_body_is_sent_as_is() {
        let roster = Roster::example(2);
        let targets = targets(&roster, &[0, 1]);
        let transport = Arc::new(FakeTransport::default());
        run_to_end(
            Some(roster.clone()),
            Arc::new(FakeStore::default()),
            transport.clone(),
            request(&roster, targets, "Polls are open."),
        )
        .await;
        let sent = transport.sent.lock().unwrap();
        assert!(sent.iter().all(|e| e.text == "Polls are open."));
    }

    #[rocket::async_test]
    async fn transport_failure_is_isolated() {
        let roster = Roster::example(3);
        let targets = targets(&roster, &[0, 1, 2]);
        let transport = Arc::new(FakeTransport {
            failing: HashSet::from([roster.voters[1].email.clone()]),
            ..Default::default()
        });

        let job = run_to_end(
            Some(roster.clone()),
            Arc::new(FakeStore::default()),
            transport.clone(),
            request(&roster, targets, "Code: {{ein}}"),
        )
        .await;

        assert_eq!(job.progress.state, JobState::Complete);
        assert_eq!((job.progress.success_count, job.progress.failed_count), (2, 1));
        assert!(job.is_complete());
        let failed = &job.progress.status[&roster.voters[1].id];
        assert_eq!(failed.outcome, Outcome::Failed);
        assert!(failed.error.as_deref().unwrap().contains("connection reset"));
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
    }

    #[rocket::async_test]
    async fn bad_template_aborts_before_sending() {
        let roster = Roster::example(2);
        let targets = targets(&roster, &[0, 1]);
        let transport = Arc::new(FakeTransport::default());

        let job = run_to_end(
            Some(roster.clone()),
            Arc::new(FakeStore::default()),
            transport.clone(),
            request(&roster, targets, "Hello {{#if voter}} there {{/each}}"),
        )
        .await;

        assert_eq!(job.progress.state, JobState::AbortedFatal);
        assert!(job.progress.error.is_some());
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn missing_election_aborts() {
        let roster = Roster::example(1);
        let targets = targets(&roster, &[0]);
        let job = run_to_end(
            None,
            Arc::new(FakeStore::default()),
            Arc::new(FakeTransport::default()),
            request(&roster, targets, "Hello"),
        )
        .await;
        assert_eq!(job.progress.state, JobState::AbortedFatal);
        assert!(job
            .progress
            .error
            .as_deref()
            .unwrap()
            .starts_with("Not found"));
    }

    #[rocket::async_test]
    async fn missing_credentials_abort() {
        let mut roster = Roster::example(1);
        let targets = targets(&roster, &[0]);
        roster.election.eins = None;
        let job = run_to_end(
            Some(roster.clone()),
            Arc::new(FakeStore::default()),
            Arc::new(FakeTransport::default()),
            request(&roster, targets, "Hello"),
        )
        .await;
        assert_eq!(job.progress.state, JobState::AbortedFatal);
    }

    #[rocket::async_test]
    async fn unmatched_targets_finish_empty() {
        let roster = Roster::example(2);
        let transport = Arc::new(FakeTransport::default());
        let job = run_to_end(
            Some(roster.clone()),
            Arc::new(FakeStore::default()),
            transport.clone(),
            request(&roster, vec![Ein::from_raw("000000000")], "Hello"),
        )
        .await;
        assert_eq!(job.progress.state, JobState::Complete);
        assert_eq!(job.progress.expected, 0);
        assert!(!job.is_complete());
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn persistence_failures_do_not_stop_sending() {
        init_logging();
        let roster = Roster::example(2);
        let targets = targets(&roster, &[0, 1]);
        let store = Arc::new(FakeStore {
            broken: true,
            ..Default::default()
        });
        let transport = Arc::new(FakeTransport::default());
        let dispatcher = NotificationDispatcher::new(
            Arc::new(FakeRoster(Some(roster.clone()))),
            store.clone(),
            transport.clone(),
            settings(),
        );
        let request = request(&roster, targets, "Hello");
        let job = NotificationJob {
            id: Id::new(),
            job: NewNotificationJob {
                election_id: request.election_id,
                from: request.from,
                subject: request.subject,
                body_template: request.body_template,
                campaign_type: request.campaign_type,
                target_credentials: request.target_credentials,
                failure_accounting: FailureAccounting::Additive,
                progress: JobProgress::default(),
            },
        };

        dispatcher.run(job).await;

        assert_eq!(transport.sent.lock().unwrap().len(), 2);
        // One write after matching, one per recipient, one at the end; each
        // tried 1 + 3 times.
        assert_eq!(*store.updates.lock().unwrap(), 4 * 4);
    }

    #[rocket::async_test]
    async fn empty_target_list_is_rejected() {
        init_logging();
        let roster = Roster::example(1);
        let store = Arc::new(FakeStore::default());
        let dispatcher = NotificationDispatcher::new(
            Arc::new(FakeRoster(Some(roster.clone()))),
            store.clone(),
            Arc::new(FakeTransport::default()),
            settings(),
        );
        let err = dispatcher
            .start_job(request(&roster, vec![], "Hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.jobs.lock().unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn started_job_completes_in_background() {
        init_logging();
        let roster = Roster::example(3);
        let targets = targets(&roster, &[0, 1, 2]);
        let dispatcher = NotificationDispatcher::new(
            Arc::new(FakeRoster(Some(roster.clone()))),
            Arc::new(FakeStore::default()),
            Arc::new(FakeTransport::default()),
            settings(),
        );

        let id = dispatcher
            .start_job(request(&roster, targets, "Code {{EIN}}"))
            .await
            .unwrap();

        let mut job = dispatcher.job(id).await.unwrap();
        for _ in 0..100 {
            if job.progress.state.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            job = dispatcher.job(id).await.unwrap();
        }
        assert_eq!(job.progress.state, JobState::Complete);
        assert_eq!(job.progress.success_count, 3);
    }
}
