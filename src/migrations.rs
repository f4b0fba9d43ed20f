use sqlx::{Pool, Postgres};

// Embed SQL migrations at compile time for deterministic startup.
// Each file is idempotent (IF NOT EXISTS throughout) so re-runs are safe.
const MIG_0001: &str = include_str!("../migrations/0001_create_users.sql");
const MIG_0002: &str = include_str!("../migrations/0002_create_conversations.sql");
const MIG_0003: &str = include_str!("../migrations/0003_create_conversation_participants.sql");
const MIG_0004: &str = include_str!("../migrations/0004_create_messages.sql");
const MIG_0005: &str = include_str!("../migrations/0005_create_offers.sql");
const MIG_0006: &str = include_str!("../migrations/0006_create_files.sql");
const MIG_0007: &str = include_str!("../migrations/0007_create_notifications.sql");

pub async fn run_all(db: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    let migrations = [
        MIG_0001, MIG_0002, MIG_0003, MIG_0004, MIG_0005, MIG_0006, MIG_0007,
    ];
    for (i, sql) in migrations.into_iter().enumerate() {
        let label = i + 1;
        sqlx::raw_sql(sql).execute(db).await?;
        tracing::info!(migration = %label, "chat-service migration applied");
    }
    Ok(())
}
