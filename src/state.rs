use std::path::Path;
use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::token::TokenSigner;
use crate::blobs::{BlobStore, LocalBlobStore};
use crate::config::Config;
use crate::db;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Everything a request handler needs, passed explicitly through axum state.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub tokens: Arc<TokenSigner>,
    pub blobs: Arc<dyn BlobStore>,
}

impl AppState {
    /// Open the database, apply migrations, and set up the token signer
    /// and upload store described by `config`.
    pub fn open(config: Config, data_dir: &Path) -> anyhow::Result<Self> {
        let pool = db::create_pool(&config.db_path())?;
        db::run_migrations(&pool)?;

        let signer = match config.auth.secret.as_deref() {
            Some(secret) => TokenSigner::new(secret.as_bytes(), config.auth.token_hours)?,
            None => TokenSigner::load_or_create(data_dir, config.auth.token_hours)?,
        };

        let blobs = LocalBlobStore::open(config.uploads_path(), config.storage.max_upload_bytes)?;

        Ok(Self {
            db: pool,
            config,
            tokens: Arc::new(signer),
            blobs: Arc::new(blobs),
        })
    }
}
