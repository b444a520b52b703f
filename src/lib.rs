pub mod catalogue;
pub mod config;
pub mod constants;
mod conversion;
pub mod crossid;
pub mod datastore;
pub mod env_state;
pub mod epoch;
pub mod identifier;
pub mod position;
pub mod registry;
pub mod resolver;
pub mod sdb;
pub mod sdb_errors;
pub mod services;
