pub mod archive;
pub mod conflict;
pub mod db;
pub mod models;
pub mod restore;
pub mod service;
pub mod snapshot;
pub mod store;
