use once_cell::sync::OnceCell;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement};

static DB_CONN: OnceCell<DatabaseConnection> = OnceCell::new();

pub async fn initialize_database(db_path: Option<&str>) -> anyhow::Result<()> {
    let db_file = db_path.unwrap_or("target/db/app.db");
    if let Some(parent) = std::path::Path::new(db_file).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let absolute_path = if std::path::Path::new(db_file).is_absolute() {
        std::path::PathBuf::from(db_file)
    } else {
        std::env::current_dir()?.join(db_file)
    };
    // Normalize path separators and ensure proper URL form on Windows
    let normalized = absolute_path.to_string_lossy().replace('\\', "/");
    let needs_leading_slash = !normalized.starts_with('/') && normalized.contains(':');
    let prefix = if needs_leading_slash { "/" } else { "" };
    let db_url = format!("sqlite://{}{}?mode=rwc", prefix, normalized);
    let conn = Database::connect(&db_url).await?;

    // Ensure required tables exist (minimal schema bootstrap)

    // a001_student
    let check_student_table = r#"
        SELECT name FROM sqlite_master WHERE type='table' AND name='a001_student';
    "#;
    let student_table_exists = conn
        .query_all(Statement::from_string(
            DatabaseBackend::Sqlite,
            check_student_table.to_string(),
        ))
        .await?;

    if student_table_exists.is_empty() {
        tracing::info!("Creating a001_student table");
        let create_student_table_sql = r#"
            CREATE TABLE a001_student (
                id TEXT PRIMARY KEY NOT NULL,
                code TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL,
                comment TEXT,
                email TEXT NOT NULL DEFAULT '',
                phone TEXT NOT NULL DEFAULT '',
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT,
                updated_at TEXT,
                version INTEGER NOT NULL DEFAULT 0
            );
        "#;
        conn.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            create_student_table_sql.to_string(),
        ))
        .await?;
    } else {
        // Ensure email and phone columns exist; add if missing
        let pragma = format!("PRAGMA table_info('{}');", "a001_student");
        let cols = conn
            .query_all(Statement::from_string(DatabaseBackend::Sqlite, pragma))
            .await?;
        let mut has_email = false;
        let mut has_phone = false;
        for row in cols {
            let name: String = row.try_get("", "name").unwrap_or_default();
            if name == "email" {
                has_email = true;
            }
            if name == "phone" {
                has_phone = true;
            }
        }
        if !has_email {
            conn.execute(Statement::from_string(
                DatabaseBackend::Sqlite,
                "ALTER TABLE a001_student ADD COLUMN email TEXT NOT NULL DEFAULT '';".to_string(),
            ))
            .await?;
        }
        if !has_phone {
            conn.execute(Statement::from_string(
                DatabaseBackend::Sqlite,
                "ALTER TABLE a001_student ADD COLUMN phone TEXT NOT NULL DEFAULT '';".to_string(),
            ))
            .await?;
        }
    }

    // a002_call_list
    let check_call_list_table = r#"
        SELECT name FROM sqlite_master WHERE type='table' AND name='a002_call_list';
    "#;
    let call_list_table_exists = conn
        .query_all(Statement::from_string(
            DatabaseBackend::Sqlite,
            check_call_list_table.to_string(),
        ))
        .await?;

    if call_list_table_exists.is_empty() {
        tracing::info!("Creating a002_call_list table");
        let create_call_list_table_sql = r#"
            CREATE TABLE a002_call_list (
                id TEXT PRIMARY KEY NOT NULL,
                code TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL,
                comment TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT,
                updated_at TEXT,
                version INTEGER NOT NULL DEFAULT 0
            );
        "#;
        conn.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            create_call_list_table_sql.to_string(),
        ))
        .await?;
    }

    // a002_call_list_entry: членство студента в списке, пара уникальна
    // (на этом держится идемпотентность attach)
    let check_entry_table = r#"
        SELECT name FROM sqlite_master WHERE type='table' AND name='a002_call_list_entry';
    "#;
    let entry_table_exists = conn
        .query_all(Statement::from_string(
            DatabaseBackend::Sqlite,
            check_entry_table.to_string(),
        ))
        .await?;

    if entry_table_exists.is_empty() {
        tracing::info!("Creating a002_call_list_entry table");
        let create_entry_table_sql = r#"
            CREATE TABLE a002_call_list_entry (
                call_list_id TEXT NOT NULL,
                student_id TEXT NOT NULL,
                added_at TEXT,
                PRIMARY KEY (call_list_id, student_id)
            );
        "#;
        conn.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            create_entry_table_sql.to_string(),
        ))
        .await?;
    }

    DB_CONN
        .set(conn)
        .map_err(|_| anyhow::anyhow!("Failed to set DB_CONN"))?;
    Ok(())
}

pub fn get_connection() -> &'static DatabaseConnection {
    DB_CONN
        .get()
        .expect("Database connection has not been initialized")
}
