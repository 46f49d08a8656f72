use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema if it does not exist. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Reference-source corpus. The embedding column stays NULL until the
    // indexing maintainer computes a vector.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            authors TEXT,
            publication_year INTEGER,
            abstract TEXT NOT NULL DEFAULT '',
            full_text TEXT NOT NULL DEFAULT '',
            source_type TEXT NOT NULL DEFAULT 'paper',
            embedding BLOB,
            embedded_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Inverted-file ANN index: trained centroids plus the source → list
    // assignments used to bound query scans.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_lists (
            list_id INTEGER PRIMARY KEY,
            centroid BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_lists (
            source_id INTEGER PRIMARY KEY,
            list_id INTEGER NOT NULL,
            FOREIGN KEY (source_id) REFERENCES sources(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_source_lists_list ON source_lists(list_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sources_title ON sources(title)")
        .execute(pool)
        .await?;

    Ok(())
}
