pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod index;
pub mod naming;
pub mod output;
pub mod processing;
pub mod rename;
pub mod scan;
pub mod session;
pub mod store;
pub mod transfer;
pub mod validate;
