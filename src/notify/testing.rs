//! In-memory stand-ins for the dispatcher's collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{
    roster::{Roster, VoterRosterProvider},
    store::JobPersistenceStore,
    transport::{Envelope, MailTransport, SendInfo, TransportError},
};
use crate::{
    error::{Error, Result},
    model::{
        db::{
            election::Election,
            job::{JobProgress, NewNotificationJob, NotificationJob},
            voter::Voter,
        },
        ein::EinMap,
        mongodb::Id,
    },
};

/// Enable logging for tests that walk through the dispatcher.
pub fn init_logging() {
    log4rs_test_utils::test_logging::init_logging_once_for(["ein_backend"], None, None);
}

/// A roster held in memory.
pub struct FakeRoster(pub Option<Roster>);

#[rocket::async_trait]
impl VoterRosterProvider for FakeRoster {
    async fn resolve(&self, election_id: Id) -> Result<Roster> {
        self.0
            .clone()
            .ok_or_else(|| Error::not_found(format!("Election {election_id}")))
    }
}

/// A job store held in memory, optionally refusing every update.
#[derive(Default)]
pub struct FakeStore {
    pub jobs: Mutex<HashMap<Id, NotificationJob>>,
    pub updates: Mutex<u32>,
    pub broken: bool,
}

#[rocket::async_trait]
impl JobPersistenceStore for FakeStore {
    async fn create(&self, job: &NewNotificationJob) -> Result<Id> {
        let id = Id::new();
        let job = NotificationJob {
            id,
            job: job.clone(),
        };
        self.jobs.lock().unwrap().insert(id, job);
        Ok(id)
    }

    async fn update(&self, id: Id, progress: &JobProgress) -> Result<()> {
        *self.updates.lock().unwrap() += 1;
        if self.broken {
            return Err(Error::Conflict("store offline".to_string()));
        }
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("Email job {id}")))?;
        job.progress = progress.clone();
        Ok(())
    }

    async fn get(&self, id: Id) -> Result<NotificationJob> {
        self.jobs
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Email job {id}")))
    }
}

/// Records every envelope; fails sends to addresses in `failing`.
#[derive(Default)]
pub struct FakeTransport {
    pub sent: Mutex<Vec<Envelope>>,
    pub failing: HashSet<String>,
}

#[rocket::async_trait]
impl MailTransport for FakeTransport {
    async fn send(&self, envelope: &Envelope) -> std::result::Result<SendInfo, TransportError> {
        if self.failing.contains(&envelope.to) {
            return Err(TransportError("connection reset".to_string()));
        }
        self.sent.lock().unwrap().push(envelope.clone());
        Ok(SendInfo::accepted(&envelope.to, Some(format!("<{}>", envelope.to))))
    }
}

impl Roster {
    /// `n` voters with freshly issued 10-digit credentials.
    pub fn example(n: usize) -> Self {
        let names = ["Ada", "Grace", "Alan", "Edsger", "Barbara", "Donald"];
        let voters: Vec<Voter> = names
            .iter()
            .cycle()
            .take(n)
            .enumerate()
            .map(|(i, name)| Voter::example(name, &format!("Voter{i}")))
            .collect();
        let members: Vec<Id> = voters.iter().map(|v| v.id).collect();
        let mut election = Election::example(Id::new());
        election.eins = Some(EinMap::issue(&members, 10).unwrap());
        Self { election, voters }
    }
}
