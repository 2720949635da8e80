//! SeaORM entity definitions for PostgreSQL database.

pub mod role;
pub mod token_blacklist;
pub mod user;
pub mod user_role;
