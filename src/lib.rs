pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod events;
pub mod uploads;

pub use db::DbPool;

use config::Config;
use crypto::{TokenError, TokenService};
use events::EventBroadcaster;
use uploads::ImageStore;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub tokens: TokenService,
    pub events: EventBroadcaster,
    pub images: ImageStore,
}

impl AppState {
    /// Missing token secrets are generated here, so `config.auth` always
    /// carries the secrets in use.
    pub fn new(mut config: Config, db: DbPool) -> Result<Self, TokenError> {
        config.auth.ensure_secrets();
        let tokens = TokenService::from_config(&config.auth)?;
        let events = EventBroadcaster::new(config.events.channel_capacity);
        let images = ImageStore::new(config.uploads.dir.clone(), config.uploads.max_file_size);

        Ok(Self {
            config,
            db,
            tokens,
            events,
            images,
        })
    }
}
