// Library for tests to access modules

pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod models;
pub mod monitoring;
pub mod routes;
pub mod runtime;
