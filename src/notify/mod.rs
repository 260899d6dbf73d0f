//! Emailing credentials to voters.

mod dispatcher;
pub mod markup;
pub mod roster;
pub mod store;
pub mod template;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{CampaignRequest, DispatchSettings, NotificationDispatcher};
