use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use super::{
    photos::{mime_from_name, PhotoNames},
    repo::{Good, GoodRepo, GoodWithOwner, NewGoodRecord},
};
use crate::{
    auth::UserRepo,
    error::{AppError, AppResult},
    storage::{BlobStore, PutOutcome},
};

/// Give up on finding a free photo name after this many draws.
const MAX_NAME_ATTEMPTS: usize = 32;

/// Upload for a new good, already parsed out of the request.
#[derive(Debug, Clone)]
pub struct NewGood {
    pub name: String,
    pub price: f64,
    pub photo: Bytes,
    pub extension: String,
    pub content_type: String,
}

/// Lifecycle of goods and their photos, with ownership checks.
#[derive(Clone)]
pub struct GoodStore {
    goods: Arc<dyn GoodRepo>,
    users: Arc<dyn UserRepo>,
    blobs: Arc<dyn BlobStore>,
    names: Arc<dyn PhotoNames>,
}

fn validate(name: &str, price: f64) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::validation("name is required"));
    }
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::validation("price must be a non-negative number"));
    }
    Ok(())
}

fn ensure_owner(good: &Good, caller_id: i64) -> AppResult<()> {
    if good.user_id != caller_id {
        warn!(good_id = good.id, owner = good.user_id, caller_id, "not the owner");
        return Err(AppError::Forbidden);
    }
    Ok(())
}

impl GoodStore {
    pub fn new(
        goods: Arc<dyn GoodRepo>,
        users: Arc<dyn UserRepo>,
        blobs: Arc<dyn BlobStore>,
        names: Arc<dyn PhotoNames>,
    ) -> Self {
        Self {
            goods,
            users,
            blobs,
            names,
        }
    }

    pub async fn list_all(&self) -> AppResult<Vec<Good>> {
        self.goods.list_all().await
    }

    pub async fn list_by_owner(&self, user_id: i64) -> AppResult<Vec<Good>> {
        self.goods.list_by_owner(user_id).await
    }

    pub async fn get(&self, good_id: i64) -> AppResult<Good> {
        self.goods
            .get(good_id)
            .await?
            .ok_or(AppError::NotFound("good"))
    }

    pub async fn get_details(&self, good_id: i64) -> AppResult<GoodWithOwner> {
        self.goods
            .get_with_owner(good_id)
            .await?
            .ok_or(AppError::NotFound("good"))
    }

    /// Stores the photo under a fresh name, then records the good.
    /// If the record cannot be written the photo is removed again.
    #[instrument(skip(self, new), fields(name = %new.name, size = new.photo.len()))]
    pub async fn create(&self, owner_id: i64, new: NewGood) -> AppResult<Good> {
        let name = new.name.trim();
        validate(name, new.price)?;
        if new.photo.is_empty() {
            return Err(AppError::validation("photo is required"));
        }

        if self.users.find_by_id(owner_id).await?.is_none() {
            return Err(AppError::NotFound("user"));
        }

        let photo = self
            .store_photo(new.photo, &new.extension, &new.content_type)
            .await?;

        let inserted = self
            .goods
            .insert(NewGoodRecord {
                name,
                price: new.price,
                user_id: owner_id,
                photo: &photo,
            })
            .await;

        match inserted {
            Ok(good) => {
                info!(good_id = good.id, owner_id, %photo, "good created");
                Ok(good)
            }
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&photo).await {
                    warn!(error = %cleanup, %photo, "orphaned photo after failed insert");
                }
                Err(e)
            }
        }
    }

    async fn store_photo(&self, body: Bytes, ext: &str, content_type: &str) -> AppResult<String> {
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let candidate = self.names.candidate(ext);
            if self.blobs.exists(&candidate).await? {
                debug!(%candidate, attempt, "photo name taken");
                continue;
            }
            match self
                .blobs
                .put_new(&candidate, body.clone(), content_type)
                .await?
            {
                PutOutcome::Created => return Ok(candidate),
                PutOutcome::AlreadyExists => {
                    debug!(%candidate, attempt, "photo name claimed concurrently");
                }
            }
        }
        Err(AppError::Storage(anyhow::anyhow!(
            "no free photo name after {MAX_NAME_ATTEMPTS} attempts"
        )))
    }

    /// Changes name and price. The photo is left alone.
    #[instrument(skip(self, name))]
    pub async fn update(
        &self,
        good_id: i64,
        caller_id: i64,
        name: &str,
        price: f64,
    ) -> AppResult<Good> {
        let good = self.get(good_id).await?;
        ensure_owner(&good, caller_id)?;

        let name = name.trim();
        validate(name, price)?;

        let updated = self
            .goods
            .update(good_id, caller_id, name, price)
            .await?
            .ok_or(AppError::NotFound("good"))?;
        info!(good_id, "good updated");
        Ok(updated)
    }

    /// Removes the photo first, then the record. A photo that is already
    /// gone counts as removed.
    #[instrument(skip(self))]
    pub async fn delete(&self, good_id: i64, caller_id: i64) -> AppResult<()> {
        let good = self.get(good_id).await?;
        ensure_owner(&good, caller_id)?;

        self.blobs.delete(&good.photo).await?;
        if !self.goods.delete(good_id, caller_id).await? {
            return Err(AppError::NotFound("good"));
        }
        info!(good_id, photo = %good.photo, "good deleted");
        Ok(())
    }

    /// Photo bytes and their content type.
    pub async fn photo(&self, good_id: i64) -> AppResult<(Bytes, &'static str)> {
        let good = self.get(good_id).await?;
        let body = self
            .blobs
            .read(&good.photo)
            .await?
            .ok_or(AppError::NotFound("photo"))?;
        Ok((body, mime_from_name(&good.photo)))
    }
}
