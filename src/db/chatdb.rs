// db/chatdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Error, PgConnection};
use uuid::Uuid;

use super::db::DBClient;
use crate::models::chatmodels::*;

const CONVERSATION_COLUMNS: &str =
    "id, participant_one_id, participant_two_id, product_id, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, content, message_type, is_read, delivery_status, created_at";

#[async_trait]
pub trait ConversationExt {
    /// Returns the conversation for this participant pair and product, creating it
    /// (with an opening message) when missing. The flag is true when it was created.
    async fn start_or_get_conversation(
        &self,
        user_id: Uuid,
        counterpart_id: Uuid,
        product_id: Option<Uuid>,
        opening_message: String,
    ) -> Result<(Conversation, bool), Error>;

    async fn get_conversation_by_id(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, Error>;

    async fn get_user_conversations(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, Error>;

    async fn delete_conversation_for_user(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), Error>;

    async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        message_type: MessageType,
        content: String,
    ) -> Result<Message, Error>;

    async fn get_conversation_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, Error>;

    async fn get_last_message(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Message>, Error>;

    async fn get_messages_after(
        &self,
        conversation_id: Uuid,
        after: DateTime<Utc>,
    ) -> Result<Vec<Message>, Error>;

    async fn mark_messages_as_delivered(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, Error>;

    /// Marks the other participant's unread messages as read, only those newer
    /// than `after` when given.
    async fn mark_messages_as_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        after: Option<DateTime<Utc>>,
    ) -> Result<u64, Error>;

    async fn get_conversation_unread_count(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<i64, Error>;

    async fn get_unread_count(
        &self,
        user_id: Uuid,
    ) -> Result<i64, Error>;
}

#[async_trait]
impl ConversationExt for DBClient {
    async fn start_or_get_conversation(
        &self,
        user_id: Uuid,
        counterpart_id: Uuid,
        product_id: Option<Uuid>,
        opening_message: String,
    ) -> Result<(Conversation, bool), Error> {
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = find_conversation(&mut tx, user_id, counterpart_id, product_id).await? {
            restore_for_all(&mut tx, existing.id).await?;
            tx.commit().await?;
            return Ok((existing, false));
        }

        // A concurrent start for the same pair may win the unique index; fall back to it.
        let created = sqlx::query_as::<_, Conversation>(&format!(
            r#"
            INSERT INTO conversations (participant_one_id, participant_two_id, product_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            CONVERSATION_COLUMNS
        ))
        .bind(user_id)
        .bind(counterpart_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (conversation, is_new) = match created {
            Some(conversation) => {
                insert_message(&mut tx, conversation.id, user_id, MessageType::Text, &opening_message).await?;
                (conversation, true)
            }
            None => {
                let existing = find_conversation(&mut tx, user_id, counterpart_id, product_id)
                    .await?
                    .ok_or(Error::RowNotFound)?;
                restore_for_all(&mut tx, existing.id).await?;
                (existing, false)
            }
        };

        tx.commit().await?;
        Ok((conversation, is_new))
    }

    async fn get_conversation_by_id(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, Error> {
        get_conversation(&mut *self.pool.acquire().await?, conversation_id).await
    }

    async fn get_user_conversations(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, Error> {
        sqlx::query_as::<_, Conversation>(&format!(
            r#"
            SELECT {}
            FROM conversations c
            WHERE (c.participant_one_id = $1 OR c.participant_two_id = $1)
              AND NOT EXISTS (
                  SELECT 1 FROM conversation_deletions d
                  WHERE d.conversation_id = c.id AND d.user_id = $1
              )
            ORDER BY c.updated_at DESC, c.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            CONVERSATION_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    async fn delete_conversation_for_user(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO conversation_deletions (conversation_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (conversation_id, user_id) DO NOTHING
            "#
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        message_type: MessageType,
        content: String,
    ) -> Result<Message, Error> {
        let mut tx = self.pool.begin().await?;

        let message = insert_message(&mut tx, conversation_id, sender_id, message_type, &content).await?;
        restore_for_all(&mut tx, conversation_id).await?;

        tx.commit().await?;
        Ok(message)
    }

    async fn get_conversation_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, Error> {
        sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {}
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_last_message(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Message>, Error> {
        sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {}
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_messages_after(
        &self,
        conversation_id: Uuid,
        after: DateTime<Utc>,
    ) -> Result<Vec<Message>, Error> {
        sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {}
            FROM messages
            WHERE conversation_id = $1 AND created_at > $2
            ORDER BY created_at ASC, id ASC
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(conversation_id)
        .bind(after)
        .fetch_all(&self.pool)
        .await
    }

    async fn mark_messages_as_delivered(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET delivery_status = 'delivered'
            WHERE conversation_id = $1
              AND sender_id != $2
              AND delivery_status = 'sent'
            "#
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_messages_as_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        after: Option<DateTime<Utc>>,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = true, delivery_status = 'read'
            WHERE conversation_id = $1
              AND sender_id != $2
              AND is_read = false
              AND ($3::timestamptz IS NULL OR created_at > $3)
            "#
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(after)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get_conversation_unread_count(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<i64, Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages
            WHERE conversation_id = $1
              AND sender_id != $2
              AND is_read = false
            "#
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_unread_count(
        &self,
        user_id: Uuid,
    ) -> Result<i64, Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages m
            INNER JOIN conversations c ON m.conversation_id = c.id
            WHERE (c.participant_one_id = $1 OR c.participant_two_id = $1)
              AND m.sender_id != $1
              AND m.is_read = false
              AND NOT EXISTS (
                  SELECT 1 FROM conversation_deletions d
                  WHERE d.conversation_id = c.id AND d.user_id = $1
              )
            "#
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }
}

pub async fn get_conversation(
    conn: &mut PgConnection,
    conversation_id: Uuid,
) -> Result<Option<Conversation>, Error> {
    sqlx::query_as::<_, Conversation>(&format!(
        "SELECT {} FROM conversations WHERE id = $1",
        CONVERSATION_COLUMNS
    ))
    .bind(conversation_id)
    .fetch_optional(conn)
    .await
}

async fn find_conversation(
    conn: &mut PgConnection,
    user_id: Uuid,
    counterpart_id: Uuid,
    product_id: Option<Uuid>,
) -> Result<Option<Conversation>, Error> {
    sqlx::query_as::<_, Conversation>(&format!(
        r#"
        SELECT {}
        FROM conversations
        WHERE ((participant_one_id = $1 AND participant_two_id = $2)
            OR (participant_one_id = $2 AND participant_two_id = $1))
          AND product_id IS NOT DISTINCT FROM $3
        LIMIT 1
        "#,
        CONVERSATION_COLUMNS
    ))
    .bind(user_id)
    .bind(counterpart_id)
    .bind(product_id)
    .fetch_optional(conn)
    .await
}

pub async fn insert_message(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    sender_id: Uuid,
    message_type: MessageType,
    content: &str,
) -> Result<Message, Error> {
    sqlx::query_as::<_, Message>(&format!(
        r#"
        INSERT INTO messages (conversation_id, sender_id, message_type, content)
        VALUES ($1, $2, $3, $4)
        RETURNING {}
        "#,
        MESSAGE_COLUMNS
    ))
    .bind(conversation_id)
    .bind(sender_id)
    .bind(message_type)
    .bind(content)
    .fetch_one(conn)
    .await
}

/// Clears every participant's soft delete and bumps last activity.
pub async fn restore_for_all(conn: &mut PgConnection, conversation_id: Uuid) -> Result<(), Error> {
    sqlx::query("DELETE FROM conversation_deletions WHERE conversation_id = $1")
        .bind(conversation_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
        .bind(conversation_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    async fn insert_user(pool: &PgPool, username: &str) -> Uuid {
        sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO users (username, name, email) VALUES ($1, $1, $1 || '@example.com') RETURNING id",
        )
        .bind(username)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL"]
    async fn test_start_or_get_is_idempotent_per_pair(pool: PgPool) {
        let db = DBClient::new(pool.clone());
        let a = insert_user(&pool, "amina").await;
        let b = insert_user(&pool, "bola").await;

        let (first, created) = db.start_or_get_conversation(a, b, None, "hi".to_string()).await.unwrap();
        assert!(created);

        let (second, created) = db.start_or_get_conversation(b, a, None, "hi".to_string()).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        let messages = db.get_conversation_messages(first.id, 30, 0).await.unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL"]
    async fn test_hidden_conversation_returns_on_new_message(pool: PgPool) {
        let db = DBClient::new(pool.clone());
        let a = insert_user(&pool, "amina").await;
        let b = insert_user(&pool, "bola").await;
        let (conversation, _) = db.start_or_get_conversation(a, b, None, "hi".to_string()).await.unwrap();

        db.delete_conversation_for_user(conversation.id, a).await.unwrap();
        db.delete_conversation_for_user(conversation.id, a).await.unwrap();
        assert!(db.get_user_conversations(a, 20, 0).await.unwrap().is_empty());
        assert_eq!(db.get_user_conversations(b, 20, 0).await.unwrap().len(), 1);

        db.send_message(conversation.id, b, MessageType::Text, "still there?".to_string()).await.unwrap();
        assert_eq!(db.get_user_conversations(a, 20, 0).await.unwrap().len(), 1);
        assert_eq!(db.get_unread_count(a).await.unwrap(), 1);

        assert_eq!(db.mark_messages_as_read(conversation.id, a, None).await.unwrap(), 1);
        assert_eq!(db.get_unread_count(a).await.unwrap(), 0);
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL"]
    async fn test_polling_marks_only_newer_messages_read(pool: PgPool) {
        let db = DBClient::new(pool.clone());
        let a = insert_user(&pool, "amina").await;
        let b = insert_user(&pool, "bola").await;
        let (conversation, _) = db.start_or_get_conversation(a, b, None, "hi".to_string()).await.unwrap();

        let seen = db.send_message(conversation.id, a, MessageType::Text, "50kg ready".to_string()).await.unwrap();
        db.send_message(conversation.id, a, MessageType::Text, "price is 40".to_string()).await.unwrap();
        assert_eq!(db.get_conversation_unread_count(conversation.id, b).await.unwrap(), 3);

        let newer = db.get_messages_after(conversation.id, seen.created_at).await.unwrap();
        assert_eq!(newer.len(), 1);

        let marked = db.mark_messages_as_read(conversation.id, b, Some(seen.created_at)).await.unwrap();
        assert_eq!(marked, 1);
        assert_eq!(db.get_conversation_unread_count(conversation.id, b).await.unwrap(), 2);
    }
}
