use anyhow::Result;

use super::schema::Database;

impl Database {
    // ========================================================================
    // Key-Value Slot Operations
    // ========================================================================

    /// Read the raw value stored under `key`, or `None` if the slot is empty.
    pub async fn get_slot(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM slots WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Replace the value stored under `key` (UPSERT).
    ///
    /// The write is a single statement, so a concurrent reader sees either
    /// the old value or the new one.
    pub async fn set_slot(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO slots (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove `key` entirely. Returns whether a row existed.
    pub async fn delete_slot(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM slots WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
