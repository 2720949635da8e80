//! Auth E2E test suite.
//!
//! Drives the HTTP API end-to-end against an in-process mock SUAP server.
//! Users live in the in-memory store and audit events are captured by a
//! recording broker transport, so no database or broker is needed.
//!
//! Run with: cargo test --test auth_e2e

mod mock_suap_provider;
mod test_helpers;

mod test_directory;
mod test_suap_callback;
mod test_token_lifecycle;
