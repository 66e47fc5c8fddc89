//! Postgres-backed implementations of every repository trait the core
//! crates define. Each `impl` block lives next to the trait it serves so
//! the wiring in `state.rs` stays a thin composition root.

mod auth;
mod deployment;
mod grading;
mod messages;
mod permissions;
mod submissions;
mod testing;

pub use submissions::JoinOutcome;

use sqlx::PgPool;

#[derive(Clone)]
pub struct PgRepositories {
    pub pool: PgPool,
}

impl PgRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
