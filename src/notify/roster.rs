use mongodb::{bson::doc, Database};
use rocket::futures::TryStreamExt;

use crate::{
    error::{Error, Result},
    model::{
        db::{election::Election, pool::Pool, voter::Voter},
        mongodb::{Coll, Id},
    },
};

/// An election together with every voter in its pool.
#[derive(Debug, Clone)]
pub struct Roster {
    pub election: Election,
    pub voters: Vec<Voter>,
}

/// Looks up who may be emailed for an election.
#[rocket::async_trait]
pub trait VoterRosterProvider: Send + Sync {
    /// Fails with [`Error::NotFound`] if the election or its pool is missing.
    async fn resolve(&self, election_id: Id) -> Result<Roster>;
}

/// Resolves rosters from the election, pool and voter collections.
pub struct MongoRoster {
    elections: Coll<Election>,
    pools: Coll<Pool>,
    voters: Coll<Voter>,
}

impl MongoRoster {
    pub fn from_db(db: &Database) -> Self {
        Self {
            elections: Coll::from_db(db),
            pools: Coll::from_db(db),
            voters: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl VoterRosterProvider for MongoRoster {
    async fn resolve(&self, election_id: Id) -> Result<Roster> {
        let election = self
            .elections
            .find_one(election_id.as_doc(), None)
            .await?
            .ok_or_else(|| Error::not_found(format!("Election {election_id}")))?;
        let pool = self
            .pools
            .find_one(election.pool_id.as_doc(), None)
            .await?
            .ok_or_else(|| Error::not_found(format!("Voter pool {}", election.pool_id)))?;

        let filter = doc! { "_id": { "$in": pool.members.iter().map(|id| **id).collect::<Vec<_>>() } };
        let voters: Vec<Voter> = self.voters.find(filter, None).await?.try_collect().await?;
        if voters.len() != pool.members.len() {
            warn!(
                "Pool {} lists {} members but only {} voters exist",
                pool.id,
                pool.members.len(),
                voters.len()
            );
        }

        Ok(Roster { election, voters })
    }
}
