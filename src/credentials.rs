use std::collections::{HashMap, HashSet};

use mongodb::{
    bson::{doc, to_bson, Document},
    Database,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::{
    error::{Error, Result},
    model::{
        db::{election::Election, pool::Pool},
        ein::{Ein, EinError, EinMap},
        mongodb::{Coll, Id},
    },
};

/// Per-election credential maps, stored on the election document.
///
/// Writes are conditional on the state that was read, so two concurrent
/// callers for the same election cannot both succeed: the loser gets
/// [`Error::AlreadyIssued`] or [`Error::Conflict`].
#[derive(Clone)]
pub struct CredentialStore {
    elections: Coll<Election>,
    pools: Coll<Pool>,
}

impl CredentialStore {
    pub fn from_db(db: &Database) -> Self {
        Self {
            elections: Coll::from_db(db),
            pools: Coll::from_db(db),
        }
    }

    /// Give every member of the election's pool a fresh credential of
    /// `digits` numerals.
    pub async fn issue(&self, election_id: Id, digits: usize) -> Result<HashMap<Id, Ein>> {
        let election = self.election(election_id).await?;
        if election.eins.is_some() {
            return Err(Error::AlreadyIssued(election_id));
        }
        let pool = self
            .pools
            .find_one(election.pool_id.as_doc(), None)
            .await?
            .ok_or_else(|| Error::not_found(format!("Voter pool {}", election.pool_id)))?;

        let eins = EinMap::issue(&pool.members, digits)?;
        let update = doc! { "$set": { "eins": to_bson(&eins)? } };
        let result = self
            .elections
            .update_one(unissued_filter(election_id), update, None)
            .await?;
        if result.matched_count == 0 {
            // Someone else issued between our read and write.
            return Err(Error::AlreadyIssued(election_id));
        }

        info!(
            "Issued {} credentials of {digits} digits for election {election_id}",
            eins.len()
        );
        Ok(eins.active_list())
    }

    /// The active credential of every voter in the election.
    pub async fn active_list(&self, election_id: Id) -> Result<HashMap<Id, Ein>> {
        Ok(self.eins(election_id).await?.active_list())
    }

    /// Every credential ever issued in the election.
    pub async fn all_historical_values(&self, election_id: Id) -> Result<HashSet<Ein>> {
        Ok(self.eins(election_id).await?.all_historical_values())
    }

    /// Retire a voter's active credential and give them a new one.
    pub async fn replace(&self, election_id: Id, voter_id: Id) -> Result<Ein> {
        let mut eins = self.eins(election_id).await?;
        let previous = eins
            .active(&voter_id)
            .cloned()
            .ok_or(EinError::UnknownVoter(voter_id))?;
        let ein = eins.replace(&voter_id)?;

        let (filter, update) = replace_update(election_id, voter_id, &previous, &ein);
        let result = self.elections.update_one(filter, update, None).await?;
        if result.matched_count == 0 {
            return Err(Error::Conflict(format!(
                "Credential of voter {voter_id} changed while being replaced"
            )));
        }

        info!("Replaced a credential of voter {voter_id} in election {election_id}");
        Ok(ein)
    }

    async fn election(&self, election_id: Id) -> Result<Election> {
        self.elections
            .find_one(election_id.as_doc(), None)
            .await?
            .ok_or_else(|| Error::not_found(format!("Election {election_id}")))
    }

    async fn eins(&self, election_id: Id) -> Result<EinMap> {
        self.election(election_id)
            .await?
            .election
            .eins
            .ok_or_else(|| Error::not_found(format!("Credentials for election {election_id}")))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CredentialStore {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        req.guard::<&State<Database>>()
            .await
            .map(|db| CredentialStore::from_db(db))
    }
}

/// Matches the election only while it has no credential map.
fn unissued_filter(election_id: Id) -> Document {
    doc! { "_id": election_id, "eins": null }
}

/// Push `new` onto the front of the voter's history, but only if `previous`
/// is still the active credential.
fn replace_update(election_id: Id, voter_id: Id, previous: &Ein, new: &Ein) -> (Document, Document) {
    let history = format!("eins.{voter_id}");
    let filter = doc! {
        "_id": election_id,
        format!("{history}.0"): previous.as_str(),
    };
    let update = doc! {
        "$push": {
            history: { "$each": [new.as_str()], "$position": 0 },
        },
    };
    (filter, update)
}
