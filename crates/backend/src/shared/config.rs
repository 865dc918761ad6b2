use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Настройки движка импорта контактов
#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    /// Потолок количества строк данных в одном файле
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Размер батча коммита; границы батчей — единственные точки
    /// приостановки и отмены
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Сколько строк отдавать в предпросмотр при загрузке
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,

    /// Сколько последних цифр телефона значимо при сопоставлении.
    /// Параметр, а не константа: правило нормализации зависит от
    /// региона и до продуктового решения остается настраиваемым.
    #[serde(default = "default_phone_significant_digits")]
    pub phone_significant_digits: usize,

    /// Максимум построчных ошибок в итоговом отчете (хвост — "+N more")
    #[serde(default = "default_max_reported_errors")]
    pub max_reported_errors: usize,

    /// Ретеншн завершенных и брошенных сессий, часов
    #[serde(default = "default_session_max_age_hours")]
    pub session_max_age_hours: i64,
}

fn default_max_rows() -> usize {
    10_000
}

fn default_batch_size() -> usize {
    200
}

fn default_preview_rows() -> usize {
    20
}

fn default_phone_significant_digits() -> usize {
    8
}

fn default_max_reported_errors() -> usize {
    20
}

fn default_session_max_age_hours() -> i64 {
    24
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            batch_size: default_batch_size(),
            preview_rows: default_preview_rows(),
            phone_significant_digits: default_phone_significant_digits(),
            max_reported_errors: default_max_reported_errors(),
            session_max_age_hours: default_session_max_age_hours(),
        }
    }
}

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[database]
path = "target/db/app.db"

[import]
max_rows = 10000
batch_size = 200
preview_rows = 20
phone_significant_digits = 8
max_reported_errors = 20
session_max_age_hours = 24
"#;

/// Load configuration from config.toml file
///
/// Search order:
/// 1. Next to the executable (for production)
/// 2. Falls back to embedded default config
pub fn load_config() -> anyhow::Result<Config> {
    // Try to find config.toml next to the executable
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let config_path = exe_dir.join("config.toml");

            if config_path.exists() {
                tracing::info!("Loading config from: {}", config_path.display());
                let contents = std::fs::read_to_string(&config_path)?;
                let config: Config = toml::from_str(&contents)?;
                return Ok(config);
            } else {
                tracing::warn!("config.toml not found at: {}", config_path.display());
            }
        }
    }

    // Fall back to default config
    tracing::info!("Using default embedded configuration");
    let config: Config = toml::from_str(DEFAULT_CONFIG)?;
    Ok(config)
}

/// Get the database file path from configuration
/// Resolves relative paths relative to the executable directory
pub fn get_database_path(config: &Config) -> anyhow::Result<PathBuf> {
    let db_path_str = &config.database.path;
    let db_path = Path::new(db_path_str);

    // If absolute path, use as is
    if db_path.is_absolute() {
        return Ok(db_path.to_path_buf());
    }

    // If relative path, resolve it relative to the executable directory
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let resolved_path = exe_dir.join(db_path);
            return Ok(resolved_path);
        }
    }

    // Fallback: use relative to current directory
    Ok(PathBuf::from(db_path_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_loads() {
        let config: Result<Config, _> = toml::from_str(DEFAULT_CONFIG);
        assert!(config.is_ok());
        let config = config.unwrap();
        assert_eq!(config.database.path, "target/db/app.db");
        assert_eq!(config.import.batch_size, 200);
        assert_eq!(config.import.phone_significant_digits, 8);
    }

    #[test]
    fn test_import_section_is_optional() {
        let config: Config = toml::from_str("[database]\npath = \"x.db\"\n").unwrap();
        assert_eq!(config.import.max_rows, 10_000);
        assert_eq!(config.import.session_max_age_hours, 24);
    }
}
