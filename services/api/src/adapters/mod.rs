pub mod db;
pub mod stats;
pub mod tokens;

pub use db::DbAdapter;
pub use stats::PgStatsAdapter;
pub use tokens::PgTokenVerifier;
