use mongodb::{
    bson::{doc, to_document},
    Database,
};

use crate::{
    error::{Error, Result},
    model::{
        db::job::{JobProgress, NewNotificationJob, NotificationJob},
        mongodb::{Coll, Id},
    },
};

/// Durable storage for email jobs.
#[rocket::async_trait]
pub trait JobPersistenceStore: Send + Sync {
    /// Store a new job, returning its ID.
    async fn create(&self, job: &NewNotificationJob) -> Result<Id>;

    /// Overwrite the progress fields of an existing job.
    async fn update(&self, id: Id, progress: &JobProgress) -> Result<()>;

    async fn get(&self, id: Id) -> Result<NotificationJob>;
}

/// Keeps jobs in the `email_jobs` collection.
pub struct MongoJobStore {
    new_jobs: Coll<NewNotificationJob>,
    jobs: Coll<NotificationJob>,
}

impl MongoJobStore {
    pub fn from_db(db: &Database) -> Self {
        Self {
            new_jobs: Coll::from_db(db),
            jobs: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl JobPersistenceStore for MongoJobStore {
    async fn create(&self, job: &NewNotificationJob) -> Result<Id> {
        let id: Id = self
            .new_jobs
            .insert_one(job, None)
            .await?
            .inserted_id
            .as_object_id()
            .ok_or_else(|| Error::Conflict("Database returned a non-ObjectId job ID".to_string()))?
            .into();
        Ok(id)
    }

    async fn update(&self, id: Id, progress: &JobProgress) -> Result<()> {
        let update = doc! { "$set": to_document(progress)? };
        let result = self.jobs.update_one(id.as_doc(), update, None).await?;
        if result.matched_count == 0 {
            return Err(Error::not_found(format!("Email job {id}")));
        }
        Ok(())
    }

    async fn get(&self, id: Id) -> Result<NotificationJob> {
        self.jobs
            .find_one(id.as_doc(), None)
            .await?
            .ok_or_else(|| Error::not_found(format!("Email job {id}")))
    }
}
