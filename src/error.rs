use mongodb::{bson::ser::Error as BsonSerError, error::Error as DbError};
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::{json, Json},
    Request,
};
use thiserror::Error;

use crate::model::{ein::EinError, mongodb::Id};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    BsonSer(#[from] BsonSerError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Ein(#[from] EinError),
    #[error("Bad request: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Credentials have already been issued for election {0}")]
    AlreadyIssued(Id),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),
}

impl Error {
    pub fn not_found(what: String) -> Self {
        Self::NotFound(what)
    }

    fn status(&self) -> Status {
        match self {
            Self::Db(_) | Self::BsonSer(_) => Status::InternalServerError,
            Self::Http(_) | Self::Spreadsheet(_) => Status::BadGateway,
            Self::Ein(EinError::InvalidParameters { .. }) | Self::Validation(_) => {
                Status::BadRequest
            }
            Self::Ein(EinError::CapacityExceeded { .. }) => Status::InsufficientStorage,
            Self::Ein(EinError::UnknownVoter(_)) | Self::NotFound(_) => Status::NotFound,
            Self::AlreadyIssued(_) | Self::Conflict(_) => Status::Conflict,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        let body = json!({
            "error": true,
            "message": self.to_string(),
        });
        (status, Json(body)).respond_to(req)
    }
}
