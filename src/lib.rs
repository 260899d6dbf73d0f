#[macro_use]
extern crate rocket;
#[macro_use]
extern crate log;

use rocket::{Build, Rocket};

use config::{AwsFairing, ConfigFairing, DatabaseFairing, DispatcherFairing, SheetsFairing};
use logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod model;
pub mod notify;
pub mod reconcile;

pub use config::Config;

/// Assemble the server. Fairings run in attachment order, and the dispatcher
/// needs everything attached before it.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(AwsFairing)
        .attach(SheetsFairing)
        .attach(DispatcherFairing)
}
