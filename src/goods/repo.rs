use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use crate::error::{AppError, AppResult};

/// A catalog entry. `photo` is the blob name of its picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Good {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub user_id: i64,
    pub photo: String,
    pub created_at: OffsetDateTime,
}

/// `Good` joined with the owner's display name.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GoodWithOwner {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub good: Good,
    pub owner_username: String,
}

#[derive(Debug, Clone)]
pub struct NewGoodRecord<'a> {
    pub name: &'a str,
    pub price: f64,
    pub user_id: i64,
    pub photo: &'a str,
}

#[async_trait]
pub trait GoodRepo: Send + Sync {
    async fn list_all(&self) -> AppResult<Vec<Good>>;
    async fn list_by_owner(&self, user_id: i64) -> AppResult<Vec<Good>>;
    async fn get(&self, id: i64) -> AppResult<Option<Good>>;
    async fn get_with_owner(&self, id: i64) -> AppResult<Option<GoodWithOwner>>;
    async fn insert(&self, good: NewGoodRecord<'_>) -> AppResult<Good>;
    /// Only touches a row owned by `owner_id`; `None` when there is none.
    async fn update(&self, id: i64, owner_id: i64, name: &str, price: f64)
        -> AppResult<Option<Good>>;
    /// Only removes a row owned by `owner_id`; `false` when nothing was removed.
    async fn delete(&self, id: i64, owner_id: i64) -> AppResult<bool>;
}

#[derive(Clone)]
pub struct PgGoodRepo {
    db: PgPool,
}

impl PgGoodRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const FOREIGN_KEY_VIOLATION: &str = "23503";

#[async_trait]
impl GoodRepo for PgGoodRepo {
    async fn list_all(&self) -> AppResult<Vec<Good>> {
        let rows = sqlx::query_as::<_, Good>(
            r#"
            SELECT id, name, price, user_id, photo, created_at
            FROM goods
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("list goods")?;
        Ok(rows)
    }

    async fn list_by_owner(&self, user_id: i64) -> AppResult<Vec<Good>> {
        let rows = sqlx::query_as::<_, Good>(
            r#"
            SELECT id, name, price, user_id, photo, created_at
            FROM goods
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list goods by owner")?;
        Ok(rows)
    }

    async fn get(&self, id: i64) -> AppResult<Option<Good>> {
        let row = sqlx::query_as::<_, Good>(
            r#"
            SELECT id, name, price, user_id, photo, created_at
            FROM goods
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get good")?;
        Ok(row)
    }

    async fn get_with_owner(&self, id: i64) -> AppResult<Option<GoodWithOwner>> {
        let row = sqlx::query_as::<_, GoodWithOwner>(
            r#"
            SELECT g.id, g.name, g.price, g.user_id, g.photo, g.created_at,
                   u.username AS owner_username
            FROM goods g
            JOIN users u ON u.id = g.user_id
            WHERE g.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get good with owner")?;
        Ok(row)
    }

    async fn insert(&self, good: NewGoodRecord<'_>) -> AppResult<Good> {
        let res = sqlx::query_as::<_, Good>(
            r#"
            INSERT INTO goods (name, price, user_id, photo)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, price, user_id, photo, created_at
            "#,
        )
        .bind(good.name)
        .bind(good.price)
        .bind(good.user_id)
        .bind(good.photo)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(g) => Ok(g),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) =>
            {
                Err(AppError::NotFound("user"))
            }
            Err(e) => Err(AppError::Storage(
                anyhow::Error::new(e).context("insert good"),
            )),
        }
    }

    async fn update(
        &self,
        id: i64,
        owner_id: i64,
        name: &str,
        price: f64,
    ) -> AppResult<Option<Good>> {
        let row = sqlx::query_as::<_, Good>(
            r#"
            UPDATE goods
               SET name = $3, price = $4
             WHERE id = $1 AND user_id = $2
            RETURNING id, name, price, user_id, photo, created_at
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(name)
        .bind(price)
        .fetch_optional(&self.db)
        .await
        .context("update good")?;
        Ok(row)
    }

    async fn delete(&self, id: i64, owner_id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM goods WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.db)
            .await
            .context("delete good")?;
        Ok(res.rows_affected() > 0)
    }
}
