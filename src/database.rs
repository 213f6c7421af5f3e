use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

const DATABASE_NAME: &str = "runbox.sqlite3";
const TITLE_MAX_CHARS: usize = 50;

/// A saved submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CodeHistoryEntry {
    pub id: i64,
    pub language: String,
    pub code: String,
    pub title: String,
    pub timestamp: String,
}

pub fn get_db_path() -> PathBuf {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "runbox").expect("Unable to find user directory");
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).expect("Failed to create local data dir");

    data_dir.join(DATABASE_NAME)
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(0)
        .connect(&db_url)
        .await?;

    // PRAGMA statements cannot run inside a transaction
    for pragma_sql in &[
        "PRAGMA busy_timeout = 2000;",
        "PRAGMA journal_mode = WAL;",
        "PRAGMA synchronous = NORMAL;",
    ] {
        sqlx::query(pragma_sql).execute(&db_pool).await?;
    }

    let mut tx = db_pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS code_history (
            id            INTEGER  PRIMARY KEY AUTOINCREMENT,
            language      TEXT     NOT NULL,
            code          TEXT     NOT NULL,
            title         TEXT     NOT NULL DEFAULT 'Untitled',
            timestamp     TEXT     NOT NULL
        );",
        "CREATE INDEX IF NOT EXISTS idx_code_history_timestamp ON code_history(timestamp);",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // Remove WAL and SHM files (ignore errors as they might not exist)
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = std::fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

/// Derives a title from the first line of the code
///
/// Long lines are cut to 50 characters and marked with `...`.
pub fn derive_title(code: &str) -> String {
    let first_line = code.split('\n').next().unwrap_or_default().trim();
    if first_line.is_empty() {
        return "Untitled Snippet".to_string();
    }

    let mut title: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
    if first_line.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

/// Stores a submission, deriving its title when none (or a blank one) is given
pub async fn add_code_history(
    pool: &SqlitePool,
    language: &str,
    code: &str,
    title: Option<&str>,
) -> sqlx::Result<CodeHistoryEntry> {
    let title = match title.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => derive_title(code),
    };
    let now = crate::create_timestamp();

    let result = sqlx::query(
        r#"
        INSERT INTO code_history (language, code, title, timestamp)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(language)
    .bind(code)
    .bind(&title)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(CodeHistoryEntry {
        id: result.last_insert_rowid(),
        language: language.to_string(),
        code: code.to_string(),
        title,
        timestamp: now,
    })
}

/// All entries, most recent first
pub async fn get_all_code_history(pool: &SqlitePool) -> sqlx::Result<Vec<CodeHistoryEntry>> {
    sqlx::query_as::<_, CodeHistoryEntry>(
        r#"
        SELECT id, language, code, title, timestamp
        FROM code_history
        ORDER BY timestamp DESC, id DESC
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn get_code_history_by_id(
    pool: &SqlitePool,
    id: i64,
) -> sqlx::Result<Option<CodeHistoryEntry>> {
    sqlx::query_as::<_, CodeHistoryEntry>(
        r#"
        SELECT id, language, code, title, timestamp
        FROM code_history
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Returns whether an entry was removed
pub async fn delete_code_history_by_id(pool: &SqlitePool, id: i64) -> sqlx::Result<bool> {
    let affected = sqlx::query("DELETE FROM code_history WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_title_from_first_line() {
        assert_eq!(derive_title("  print('hi')  \nprint('bye')"), "print('hi')");
        assert_eq!(derive_title("\nfn main() {}"), "Untitled Snippet");
        assert_eq!(derive_title("   "), "Untitled Snippet");
    }

    #[test]
    fn test_long_title_is_truncated() {
        let line = "x".repeat(60);
        let title = derive_title(&line);
        assert_eq!(title, format!("{}...", "x".repeat(50)));

        let exact = "y".repeat(50);
        assert_eq!(derive_title(&exact), exact);
    }

    #[tokio::test]
    async fn test_history_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_db(dir.path().join("history.sqlite3")).await.unwrap();

        let first = add_code_history(&pool, "python", "print('a')", None).await.unwrap();
        let second = add_code_history(&pool, "c", "int main(){}", Some("My C")).await.unwrap();
        assert_eq!(first.title, "print('a')");
        assert_eq!(second.title, "My C");

        let all = get_all_code_history(&pool).await.unwrap();
        assert_eq!(all.iter().map(|e| e.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        assert_eq!(get_code_history_by_id(&pool, first.id).await.unwrap(), Some(first.clone()));
        assert!(delete_code_history_by_id(&pool, first.id).await.unwrap());
        assert!(!delete_code_history_by_id(&pool, first.id).await.unwrap());
        assert_eq!(get_code_history_by_id(&pool, first.id).await.unwrap(), None);
    }
}
