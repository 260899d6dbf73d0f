use std::sync::Arc;
use std::time::Duration;

use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_sesv2::{
    config::{Credentials, Region},
    Client as SesClient,
};
use mongodb::{Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::{
    model::{db::job::FailureAccounting, mongodb::ensure_indexes_exist},
    notify::{
        roster::MongoRoster, store::MongoJobStore, transport::SesMailer, DispatchSettings,
        NotificationDispatcher,
    },
    reconcile::sheets::{GoogleSheets, SpreadsheetDataProvider},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_ein_digits")]
    ein_digits: usize,
    #[serde(default = "default_throttle_ms")]
    throttle_ms: u64,
    #[serde(default)]
    idempotent_failures: bool,
    #[serde(default = "default_persist_retries")]
    persist_retries: u32,
}

fn default_ein_digits() -> usize {
    10
}

fn default_throttle_ms() -> u64 {
    500
}

fn default_persist_retries() -> u32 {
    3
}

impl Config {
    /// Credential width used when an issue request does not name one.
    pub fn ein_digits(&self) -> usize {
        self.ein_digits
    }

    /// Delay between two sends of the same job.
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    /// How repeated send failures for one recipient are counted.
    pub fn failure_accounting(&self) -> FailureAccounting {
        if self.idempotent_failures {
            FailureAccounting::Idempotent
        } else {
            FailureAccounting::Additive
        }
    }

    /// Extra attempts for a progress write that failed.
    pub fn persist_retries(&self) -> u32 {
        self.persist_retries
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            throttle: self.throttle(),
            failure_accounting: self.failure_accounting(),
            persist_retries: self.persist_retries(),
        }
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to connect to database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "eins".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// Configuration for the AWS connection.
#[derive(Deserialize)]
struct AwsConfig {
    // non-secrets
    aws_region: String,
    aws_access_key_id: String,
    // secrets
    aws_secret_access_key: String,
}

/// A fairing that loads the AWS config and places an SES `Client` into
/// managed state.
pub struct AwsFairing;

#[rocket::async_trait]
impl Fairing for AwsFairing {
    fn info(&self) -> Info {
        Info {
            name: "AWS SES",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<AwsConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load AWS config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        // Construct the connection.
        let aws_config = SdkConfig::builder()
            .region(Region::new(config.aws_region))
            .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                config.aws_access_key_id,
                config.aws_secret_access_key,
                None,
                None,
                "rocket config",
            )))
            .behavior_version(BehaviorVersion::latest())
            .build();
        let client = SesClient::new(&aws_config);
        info!("Loaded Amazon SES config");

        // Manage the state.
        rocket = rocket.manage(client);
        Ok(rocket)
    }
}

/// Configuration for the Google Sheets connection.
#[derive(Deserialize)]
struct SheetsConfig {
    // non-secrets
    #[serde(default)]
    sheets_base_url: Option<String>,
    // secrets
    sheets_api_key: String,
}

/// A fairing that loads the Google Sheets config and places a
/// `Box<dyn SpreadsheetDataProvider>` into managed state.
pub struct SheetsFairing;

#[rocket::async_trait]
impl Fairing for SheetsFairing {
    fn info(&self) -> Info {
        Info {
            name: "Google Sheets",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<SheetsConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load Google Sheets config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let mut sheets = GoogleSheets::new(config.sheets_api_key);
        if let Some(base_url) = config.sheets_base_url {
            sheets = sheets.with_base_url(base_url);
        }
        info!("Loaded Google Sheets config");

        let provider: Box<dyn SpreadsheetDataProvider> = Box::new(sheets);
        rocket = rocket.manage(provider);
        Ok(rocket)
    }
}

/// A fairing that builds the email dispatcher and places it into managed state.
/// This fairing depends on the config, database and AWS client being in managed
/// state, and so must be attached after the fairings responsible for those.
pub struct DispatcherFairing;

#[rocket::async_trait]
impl Fairing for DispatcherFairing {
    fn info(&self) -> Info {
        Info {
            name: "Email Dispatcher",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let (config, db, ses) = match (
            rocket.state::<Config>(),
            rocket.state::<Database>(),
            rocket.state::<SesClient>(),
        ) {
            (Some(config), Some(db), Some(ses)) => (config, db, ses),
            _ => {
                error!("Config, database and mail client must be available to build the dispatcher");
                return Err(rocket);
            }
        };

        let dispatcher = NotificationDispatcher::new(
            Arc::new(MongoRoster::from_db(db)),
            Arc::new(MongoJobStore::from_db(db)),
            Arc::new(SesMailer::new(ses.clone())),
            config.dispatch_settings(),
        );
        info!("Email dispatcher ready");

        rocket = rocket.manage(dispatcher);
        Ok(rocket)
    }
}

#[cfg(test)]
mod tests {
    use rocket::figment::Figment;

    use super::*;

    #[test]
    fn defaults_apply() {
        let config: Config = Figment::new().extract().unwrap();
        assert_eq!(config.ein_digits(), 10);
        assert_eq!(config.throttle(), Duration::from_millis(500));
        assert_eq!(config.failure_accounting(), FailureAccounting::Additive);
        assert_eq!(config.persist_retries(), 3);
    }

    #[test]
    fn overrides_apply() {
        let figment = Figment::new()
            .merge(("ein_digits", 12))
            .merge(("throttle_ms", 0))
            .merge(("idempotent_failures", true));
        let config: Config = figment.extract().unwrap();
        assert_eq!(config.ein_digits(), 12);
        assert_eq!(config.throttle(), Duration::ZERO);
        assert_eq!(config.failure_accounting(), FailureAccounting::Idempotent);
    }
}
