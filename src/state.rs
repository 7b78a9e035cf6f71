use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::auth::{PgUserRepo, UserRepo};
use crate::config::{AppConfig, StorageConfig};
use crate::goods::{GoodStore, PgGoodRepo, RandomPhotoNames};
use crate::storage::{BlobStore, FsBlobStore, S3BlobStore};

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepo>,
    pub goods: GoodStore,
}

async fn blob_store(cfg: &StorageConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match cfg {
        StorageConfig::Fs { dir } => {
            info!(%dir, "photos on local disk");
            Arc::new(FsBlobStore::new(dir).await?)
        }
        StorageConfig::S3 {
            endpoint,
            bucket,
            access_key,
            secret_key,
            region,
        } => {
            info!(%endpoint, %bucket, "photos in s3");
            Arc::new(S3BlobStore::new(endpoint, bucket, access_key, secret_key, region).await?)
        }
    };
    Ok(store)
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;

        let users: Arc<dyn UserRepo> = Arc::new(PgUserRepo::new(db.clone()));
        let goods = GoodStore::new(
            Arc::new(PgGoodRepo::new(db)),
            users.clone(),
            blob_store(&config.storage).await?,
            Arc::new(RandomPhotoNames::new(config.photo_name_len)),
        );

        Ok(Self::from_parts(config, users, goods))
    }

    pub fn from_parts(config: Arc<AppConfig>, users: Arc<dyn UserRepo>, goods: GoodStore) -> Self {
        Self {
            config,
            users,
            goods,
        }
    }
}
