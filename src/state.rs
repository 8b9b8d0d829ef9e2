use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::token::TokenService;
use crate::config::Config;
use crate::email::Mailer;
use crate::media::MediaStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub tokens: Arc<TokenService>,
    pub media: Arc<dyn MediaStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(
        db: DbPool,
        config: Config,
        media: Arc<dyn MediaStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let tokens = Arc::new(TokenService::from_config(&config.auth));
        Self {
            db,
            config,
            tokens,
            media,
            mailer,
        }
    }
}
