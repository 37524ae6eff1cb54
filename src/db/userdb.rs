// db/userdb.rs
use async_trait::async_trait;
use sqlx::PgConnection;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::{
    dealmodels::RatingSummary,
    usermodel::{User, UserSummary},
};

#[async_trait]
pub trait UserExt {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;

    async fn get_user_summaries(&self, user_ids: &[Uuid]) -> Result<Vec<UserSummary>, sqlx::Error>;
}

#[async_trait]
impl UserExt for DBClient {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, name, email, user_type, is_verified,
                   average_farmer_rating, farmer_rating_count, created_at, updated_at
            FROM users
            WHERE id = $1
            "#
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_user_summaries(&self, user_ids: &[Uuid]) -> Result<Vec<UserSummary>, sqlx::Error> {
        sqlx::query_as::<_, UserSummary>(
            r#"
            SELECT id, username, name
            FROM users
            WHERE id = ANY($1)
            "#
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await
    }
}

/// Locks the farmer's row so concurrent reviews recompute their rating one at a time.
pub async fn lock_user(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(conn)
        .await
}

pub async fn update_farmer_rating(
    conn: &mut PgConnection,
    farmer_id: Uuid,
    summary: &RatingSummary,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE users
        SET average_farmer_rating = $2, farmer_rating_count = $3, updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(farmer_id)
    .bind(&summary.average)
    .bind(summary.count)
    .execute(conn)
    .await?;

    Ok(())
}
