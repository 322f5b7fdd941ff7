use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};

use crate::SqliteDatabase;

/// Drops any leftover database at `url`, recreates it and brings the schema up to date. Each
/// test calls this once, then opens its own pool against the same URL.
pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    recreate_database(url).await;
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Could not open the test database");
    migrate!("./src/sqlite/migrations").run(db.pool()).await.expect("Test database migration failed");
    debug!("🪛️ Test database at {url} is ready");
}

/// A unique on-disk database path, so concurrently running test binaries never share state.
pub fn random_db_path() -> String {
    format!("sqlite://../data/test_store_{:016x}.db", rand::random::<u64>())
}

async fn recreate_database(url: &str) {
    if let Err(e) = Sqlite::drop_database(url).await {
        trace!("🪛️ Nothing to drop at {url}. {e}");
    }
    Sqlite::create_database(url).await.expect("Could not create the test database");
    debug!("🪛️ Created test database {url}");
}
