use std::sync::Arc;

use anyhow::Context;
use sqlx::{migrate::Migrator, postgres::PgPoolOptions};

use crate::{
    cache::{RedisUserCache, UserCache},
    config::AppConfig,
    mailer::{Mailer, SmtpMailer},
    store::Storage,
};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Storage,
    /// `None` when caching is switched off.
    pub cache: Option<Arc<dyn UserCache>>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(config.database.max_open_conns)
            .idle_timeout(config.database.max_idle_time)
            .acquire_timeout(config.database.query_timeout)
            .connect(&config.database.url)
            .await
            .context("connect to database")?;
        tracing::info!(
            max_conns = config.database.max_open_conns,
            "database connection pool established"
        );

        MIGRATOR.run(&db).await.context("run migrations")?;

        let cache = if config.cache.enabled {
            let cache = RedisUserCache::connect(
                &config.cache.redis_url(),
                config.database.query_timeout,
            )
            .await
            .context("connect to redis")?;
            Some(Arc::new(cache) as Arc<dyn UserCache>)
        } else {
            tracing::info!("user cache disabled");
            None
        };

        let mailer = Arc::new(SmtpMailer::new(&config.mail).context("build smtp mailer")?)
            as Arc<dyn Mailer>;

        Ok(Self {
            store: Storage::postgres(db, config.database.query_timeout),
            config,
            cache,
            mailer,
        })
    }

    /// Whether lookups should go through the cache.
    pub fn cache(&self) -> Option<&Arc<dyn UserCache>> {
        if self.config.cache.enabled {
            self.cache.as_ref()
        } else {
            None
        }
    }
}
