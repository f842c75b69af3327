pub mod config;
pub mod db;
pub mod fetch;
pub mod health;
pub mod model;
pub mod notify;
pub mod orchestrate;
pub mod pool;
pub mod reconcile;
pub mod registry;
pub mod validate;
