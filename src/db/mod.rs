// Database access layer (SQLite via sqlx): players, conversation turns,
// SMS texts, and player events. Turns and events are append-only.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Player {
    pub id: String,
    pub unity_id: String,
    pub phone_number: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub unity_id: String,
    pub message: String,
    pub sender: String,
    pub sent_to: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TextMessage {
    pub unity_id: String,
    pub message: String,
    pub sender_number: String,
    pub receiver_number: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlayerEvent {
    pub unity_id: String,
    pub event_type: String,
    pub event_details: String,
    pub created_at: String,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id TEXT PRIMARY KEY,
                unity_id TEXT NOT NULL UNIQUE,
                phone_number TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                unity_id TEXT NOT NULL,
                message TEXT NOT NULL,
                sender TEXT NOT NULL,
                sent_to TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS texts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                unity_id TEXT NOT NULL,
                message TEXT NOT NULL,
                sender_number TEXT NOT NULL,
                receiver_number TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                unity_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                event_details TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Players ───────────────────────────────────────────────────────

    pub async fn create_player(
        &self,
        unity_id: &str,
        phone_number: &str,
    ) -> Result<Player, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let row = sqlx::query_as::<_, Player>(
            "INSERT INTO players (id, unity_id, phone_number) VALUES (?, ?, ?) RETURNING id, unity_id, phone_number, created_at",
        )
        .bind(&id)
        .bind(unity_id)
        .bind(phone_number)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_player_by_unity_id(
        &self,
        unity_id: &str,
    ) -> Result<Option<Player>, sqlx::Error> {
        let row = sqlx::query_as::<_, Player>(
            "SELECT id, unity_id, phone_number, created_at FROM players WHERE unity_id = ?",
        )
        .bind(unity_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_player_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<Player>, sqlx::Error> {
        let row = sqlx::query_as::<_, Player>(
            "SELECT id, unity_id, phone_number, created_at FROM players WHERE phone_number = ?",
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // ── Conversation turns ────────────────────────────────────────────

    pub async fn append_message(
        &self,
        unity_id: &str,
        message: &str,
        sender: &str,
        sent_to: &str,
    ) -> Result<ChatMessage, sqlx::Error> {
        let row = sqlx::query_as::<_, ChatMessage>(
            "INSERT INTO messages (unity_id, message, sender, sent_to) VALUES (?, ?, ?, ?) RETURNING unity_id, message, sender, sent_to, created_at",
        )
        .bind(unity_id)
        .bind(message)
        .bind(sender)
        .bind(sent_to)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Last `n` conversation turns for a player, newest first.
    pub async fn last_messages(
        &self,
        unity_id: &str,
        n: i64,
    ) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ChatMessage>(
            "SELECT unity_id, message, sender, sent_to, created_at FROM messages WHERE unity_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(unity_id)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ── SMS texts ─────────────────────────────────────────────────────

    pub async fn append_text(
        &self,
        unity_id: &str,
        message: &str,
        sender_number: &str,
        receiver_number: &str,
    ) -> Result<TextMessage, sqlx::Error> {
        let row = sqlx::query_as::<_, TextMessage>(
            "INSERT INTO texts (unity_id, message, sender_number, receiver_number) VALUES (?, ?, ?, ?) RETURNING unity_id, message, sender_number, receiver_number, created_at",
        )
        .bind(unity_id)
        .bind(message)
        .bind(sender_number)
        .bind(receiver_number)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Last `n` texts between a player and one NPC number, newest first.
    pub async fn last_texts(
        &self,
        unity_id: &str,
        npc_number: &str,
        n: i64,
    ) -> Result<Vec<TextMessage>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TextMessage>(
            "SELECT unity_id, message, sender_number, receiver_number, created_at FROM texts WHERE unity_id = ? AND (sender_number = ? OR receiver_number = ?) ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(unity_id)
        .bind(npc_number)
        .bind(npc_number)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ── Player events ─────────────────────────────────────────────────

    pub async fn append_event(
        &self,
        unity_id: &str,
        event_type: &str,
        event_details: &str,
    ) -> Result<PlayerEvent, sqlx::Error> {
        let row = sqlx::query_as::<_, PlayerEvent>(
            "INSERT INTO events (unity_id, event_type, event_details) VALUES (?, ?, ?) RETURNING unity_id, event_type, event_details, created_at",
        )
        .bind(unity_id)
        .bind(event_type)
        .bind(event_details)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Last `n` events for a player, newest first.
    pub async fn last_events(
        &self,
        unity_id: &str,
        n: i64,
    ) -> Result<Vec<PlayerEvent>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PlayerEvent>(
            "SELECT unity_id, event_type, event_details, created_at FROM events WHERE unity_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(unity_id)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_lookup_player() {
        let db = test_db().await;

        let player = db.create_player("p1", "+15551112222").await.unwrap();
        assert_eq!(player.unity_id, "p1");
        assert!(!player.id.is_empty());

        let by_unity = db.get_player_by_unity_id("p1").await.unwrap();
        assert!(by_unity.is_some());
        assert_eq!(by_unity.unwrap().phone_number, "+15551112222");

        let by_phone = db.get_player_by_phone("+15551112222").await.unwrap();
        assert!(by_phone.is_some());
        assert_eq!(by_phone.unwrap().unity_id, "p1");

        assert!(db.get_player_by_unity_id("p2").await.unwrap().is_none());
        assert!(db.get_player_by_phone("+15550000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_unity_id_rejected() {
        let db = test_db().await;

        db.create_player("p1", "+15551112222").await.unwrap();
        let dup = db.create_player("p1", "+15553334444").await;
        assert!(dup.is_err());
        assert!(dup.unwrap_err().to_string().contains("UNIQUE"));
    }

    #[tokio::test]
    async fn test_messages_append_and_window() {
        let db = test_db().await;

        db.append_message("p1", "hi", "player", "npc_bob")
            .await
            .unwrap();
        db.append_message("p1", "what do you want", "npc_bob", "player")
            .await
            .unwrap();
        db.append_message("p1", "fish", "player", "npc_bob")
            .await
            .unwrap();
        db.append_message("p2", "other player", "player", "npc_bob")
            .await
            .unwrap();

        // newest first, scoped to p1, limited to 2
        let last = db.last_messages("p1", 2).await.unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].message, "fish");
        assert_eq!(last[1].message, "what do you want");

        let all = db.last_messages("p1", 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].message, "hi");
        assert_eq!(all[2].sender, "player");
        assert_eq!(all[2].sent_to, "npc_bob");
    }

    #[tokio::test]
    async fn test_events_append_and_window() {
        let db = test_db().await;

        db.append_event("p1", "quest", "accepted the harbor job")
            .await
            .unwrap();
        db.append_event("p1", "combat", "drove off a thief")
            .await
            .unwrap();

        let events = db.last_events("p1", 10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "combat");
        assert_eq!(events[1].event_details, "accepted the harbor job");

        assert!(db.last_events("p2", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_texts_scoped_to_npc_number() {
        let db = test_db().await;

        db.append_text("p1", "hey bob", "+15551112222", "+15550000001")
            .await
            .unwrap();
        db.append_text("p1", "aye", "+15550000001", "+15551112222")
            .await
            .unwrap();
        // a text with a different NPC must not show up
        db.append_text("p1", "hello mira", "+15551112222", "+15550000002")
            .await
            .unwrap();

        let texts = db.last_texts("p1", "+15550000001", 10).await.unwrap();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0].message, "aye");
        assert_eq!(texts[1].message, "hey bob");
    }
}
