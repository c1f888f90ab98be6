use chrono::{DateTime, Utc};
use kiwi_core::domain::MessageRole;
use kiwi_core::error::sanitize_text;
use kiwi_core::ids::new_public_id;
use sqlx::{PgPool, Row};

use crate::error::{ChatError, Result};
use crate::types::{Conversation, Message};

/// Owns the `conversations`/`messages` tables (§4.7). Grounded on
/// `skynet-sessions::SessionManager`'s get-or-create-then-read-back shape,
/// keyed here by `(project_id, conversation public_id)` instead of a
/// `SessionKey`.
pub struct ConversationManager {
    pool: PgPool,
}

/// A message to persist, built by the engine from a completed turn.
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub tool_call_id: Option<String>,
    pub tool_name: Option<String>,
    pub tool_arguments: Option<serde_json::Value>,
    pub tool_execution: Option<kiwi_core::domain::ToolExecution>,
    pub reasoning: Option<String>,
}

impl NewMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: MessageRole::User,
            content: content.to_string(),
            tool_call_id: None,
            tool_name: None,
            tool_arguments: None,
            tool_execution: None,
            reasoning: None,
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.to_string(),
            tool_call_id: None,
            tool_name: None,
            tool_arguments: None,
            tool_execution: None,
            reasoning: None,
        }
    }

    pub fn tool_result(tool_call_id: String, tool_name: Option<String>, content: &str) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.to_string(),
            tool_call_id: Some(tool_call_id),
            tool_name,
            tool_arguments: None,
            tool_execution: None,
            reasoning: None,
        }
    }
}

impl ConversationManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the conversation named by `public_id`, or creates a fresh one
    /// titled from the first `title_chars` characters of `seed_prompt` (§4.7).
    #[tracing::instrument(skip(self, seed_prompt), fields(project_id, public_id))]
    pub async fn get_or_create_conversation(
        &self,
        project_id: i64,
        public_id: Option<&str>,
        seed_prompt: &str,
        title_chars: usize,
    ) -> Result<Conversation> {
        if let Some(public_id) = public_id {
            if let Some(existing) = self.get_conversation(project_id, public_id).await? {
                return Ok(existing);
            }
        }

        let public_id = public_id.map(str::to_string).unwrap_or_else(new_public_id);
        let title = derive_title(seed_prompt, title_chars);

        let row = sqlx::query(
            r#"
            INSERT INTO conversations (public_id, project_id, title)
            VALUES ($1, $2, $3)
            ON CONFLICT (public_id) DO NOTHING
            RETURNING id, public_id, project_id, title, created_at, updated_at
            "#,
        )
        .bind(&public_id)
        .bind(project_id)
        .bind(&title)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row_to_conversation(&row)),
            // Lost the insert race, or the caller passed an id that didn't
            // resolve above for another project: read back authoritatively.
            None => self
                .get_conversation(project_id, &public_id)
                .await?
                .ok_or_else(|| ChatError::Conflict(format!("conversation {public_id} vanished"))),
        }
    }

    #[tracing::instrument(skip(self), fields(project_id, public_id))]
    pub async fn get_conversation(&self, project_id: i64, public_id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT id, public_id, project_id, title, created_at, updated_at
             FROM conversations WHERE project_id = $1 AND public_id = $2",
        )
        .bind(project_id)
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_conversation(&r)))
    }

    #[tracing::instrument(skip(self, message), fields(conversation_id, role = message.role.as_str()))]
    pub async fn append_message(&self, conversation_id: i64, message: NewMessage) -> Result<Message> {
        let content = sanitize_text(&message.content);
        let tool_execution = message.tool_execution.map(|e| e.as_str()).unwrap_or("");
        let row = sqlx::query(
            r#"
            INSERT INTO messages
                (conversation_id, role, content, tool_call_id, tool_name, tool_arguments, tool_execution, reasoning)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, conversation_id, role, content, tool_call_id, tool_name, tool_arguments,
                      tool_execution, reasoning, created_at
            "#,
        )
        .bind(conversation_id)
        .bind(message.role.as_str())
        .bind(&content)
        .bind(&message.tool_call_id)
        .bind(&message.tool_name)
        .bind(&message.tool_arguments)
        .bind(tool_execution)
        .bind(&message.reasoning)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = now() WHERE id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        Ok(row_to_message(&row))
    }

    #[tracing::instrument(skip(self), fields(conversation_id))]
    pub async fn list_messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, tool_call_id, tool_name, tool_arguments,
                    tool_execution, reasoning, created_at
             FROM messages WHERE conversation_id = $1 ORDER BY id ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_message).collect())
    }

    #[tracing::instrument(skip(self), fields(conversation_id))]
    pub async fn last_message(&self, conversation_id: i64) -> Result<Option<Message>> {
        let row = sqlx::query(
            "SELECT id, conversation_id, role, content, tool_call_id, tool_name, tool_arguments,
                    tool_execution, reasoning, created_at
             FROM messages WHERE conversation_id = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_message(&r)))
    }
}

/// First `title_chars` characters of the prompt, on char boundaries so
/// multi-byte UTF-8 never gets truncated mid-codepoint (§4.7).
fn derive_title(prompt: &str, title_chars: usize) -> String {
    let title: String = prompt.chars().take(title_chars).collect();
    sanitize_text(title.trim())
}

pub fn message_role_from_str(s: &str) -> MessageRole {
    match s {
        "user" => MessageRole::User,
        "assistant" => MessageRole::Assistant,
        "assistant_tool_call" => MessageRole::AssistantToolCall,
        "tool" => MessageRole::Tool,
        "system" => MessageRole::System,
        _ => MessageRole::User,
    }
}

fn row_to_conversation(row: &sqlx::postgres::PgRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        public_id: row.get("public_id"),
        project_id: row.get("project_id"),
        title: row.get("title"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    }
}

fn row_to_message(row: &sqlx::postgres::PgRow) -> Message {
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        role: row.get("role"),
        content: row.get("content"),
        tool_call_id: row.get("tool_call_id"),
        tool_name: row.get("tool_name"),
        tool_arguments: row.get("tool_arguments"),
        tool_execution: row.get("tool_execution"),
        reasoning: row.get("reasoning"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_truncates_on_char_boundaries() {
        let prompt = "é".repeat(200);
        let title = derive_title(&prompt, 120);
        assert_eq!(title.chars().count(), 120);
    }

    #[test]
    fn title_trims_whitespace() {
        assert_eq!(derive_title("  hello world  ", 120), "hello world");
    }

    #[test]
    fn message_role_round_trips() {
        for role in [
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::AssistantToolCall,
            MessageRole::Tool,
            MessageRole::System,
        ] {
            assert_eq!(message_role_from_str(role.as_str()), role);
        }
    }
}
