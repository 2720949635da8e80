//! IFSports auth service library.
//!
//! Bridges SUAP OAuth2 login with the local user directory: provider profile
//! merging, identity reconciliation, session tokens and audit events.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
pub mod state;
