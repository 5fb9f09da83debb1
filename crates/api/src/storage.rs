//! Durable storage for conversations and messages
//!
//! The relay core only talks to storage through the [`ChatStore`] trait so
//! session logic can be exercised against an in-memory double in tests.

use async_trait::async_trait;
use sqlx::PgPool;

use livechat_shared::{ChatError, Conversation, Message, SenderType};

/// Storage contract consumed by the connection/relay core.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Find the active conversation for a visitor key, if any.
    async fn find_active_conversation(
        &self,
        visitor_id: &str,
    ) -> Result<Option<Conversation>, ChatError>;

    /// Create a new active conversation for a visitor key.
    async fn create_conversation(&self, visitor_id: &str) -> Result<Conversation, ChatError>;

    /// Append a message to a conversation.
    async fn append_message(
        &self,
        conversation_id: i64,
        sender: SenderType,
        content: &str,
        image_url: Option<&str>,
    ) -> Result<Message, ChatError>;

    /// Find an existing bot message in a conversation, if any.
    async fn find_bot_message(&self, conversation_id: i64) -> Result<Option<Message>, ChatError>;

    /// Mark messages from the given senders as read, returning the number of
    /// rows updated. With `unread_only` set, already-read rows are skipped.
    async fn mark_read(
        &self,
        conversation_id: i64,
        senders: &[SenderType],
        unread_only: bool,
    ) -> Result<u64, ChatError>;
}

/// Postgres-backed [`ChatStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent conversation for a visitor key regardless of active flag.
    /// Used by the history endpoint.
    pub async fn find_latest_conversation(
        &self,
        visitor_id: &str,
    ) -> Result<Option<Conversation>, ChatError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, visitor_id, is_active, created_at
            FROM conversations
            WHERE visitor_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(visitor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    /// All conversations, newest first.
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        let conversations = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, visitor_id, is_active, created_at
            FROM conversations
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(conversations)
    }

    /// Messages for a batch of conversations in one query (no per-conversation
    /// round trips), oldest first.
    pub async fn messages_for_conversations(
        &self,
        conversation_ids: &[i64],
    ) -> Result<Vec<Message>, ChatError> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, conversation_id, content, sender_type, image_url, is_read, created_at
            FROM messages
            WHERE conversation_id = ANY($1)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn find_active_conversation(
        &self,
        visitor_id: &str,
    ) -> Result<Option<Conversation>, ChatError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, visitor_id, is_active, created_at
            FROM conversations
            WHERE visitor_id = $1 AND is_active = TRUE
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(visitor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    async fn create_conversation(&self, visitor_id: &str) -> Result<Conversation, ChatError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (visitor_id)
            VALUES ($1)
            RETURNING id, visitor_id, is_active, created_at
            "#,
        )
        .bind(visitor_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            conversation_id = conversation.id,
            visitor_id = %visitor_id,
            "Created conversation"
        );

        Ok(conversation)
    }

    async fn append_message(
        &self,
        conversation_id: i64,
        sender: SenderType,
        content: &str,
        image_url: Option<&str>,
    ) -> Result<Message, ChatError> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (conversation_id, content, sender_type, image_url)
            VALUES ($1, $2, $3, $4)
            RETURNING id, conversation_id, content, sender_type, image_url, is_read, created_at
            "#,
        )
        .bind(conversation_id)
        .bind(content)
        .bind(sender)
        .bind(image_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    async fn find_bot_message(&self, conversation_id: i64) -> Result<Option<Message>, ChatError> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, conversation_id, content, sender_type, image_url, is_read, created_at
            FROM messages
            WHERE conversation_id = $1 AND sender_type = $2
            LIMIT 1
            "#,
        )
        .bind(conversation_id)
        .bind(SenderType::Bot)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    async fn mark_read(
        &self,
        conversation_id: i64,
        senders: &[SenderType],
        unread_only: bool,
    ) -> Result<u64, ChatError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE
            WHERE conversation_id = $1
              AND sender_type = ANY($2)
              AND ($3 = FALSE OR is_read = FALSE)
            "#,
        )
        .bind(conversation_id)
        .bind(senders.to_vec())
        .bind(unread_only)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
