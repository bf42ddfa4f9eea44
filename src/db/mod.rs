mod from_row;
mod schema;
pub mod queries;

pub use from_row::{FromRow, query_all, query_one};
pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::jwt::SessionKey;
use crate::payments::PaymentProcessor;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Public URL of the storefront (checkout redirects land here).
    pub base_url: String,
    /// Verifies user access tokens.
    pub sessions: SessionKey,
    /// `None` when payments are not configured; payment routes are not mounted then.
    pub payments: Option<PaymentProcessor>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;"));
    Pool::builder().max_size(10).build(manager)
}
