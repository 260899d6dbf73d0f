pub mod api;
pub mod db;
pub mod ein;
pub mod mongodb;
