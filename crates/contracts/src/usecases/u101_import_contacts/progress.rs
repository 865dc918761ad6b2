use serde::{Deserialize, Serialize};

/// Шаг жизненного цикла сессии импорта
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImportStep {
    /// Файл загружается / парсинг не удался
    Upload,
    /// Маппинг и опции редактируются, доступен предпросмотр
    Map,
    /// Коммит в процессе
    Importing,
    /// Терминальное состояние, результат зафиксирован
    Done,
}

/// Грубый индикатор фазы коммита. Только для отображения,
/// контрактного смысла не несет.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Validating,
    Matching,
    Creating,
    Attaching,
    Finalizing,
}

/// Снимок прогресса коммита. Счетчики кумулятивны и монотонны;
/// `processed_rows <= total_rows`; `updated_at` строго растет.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportProgress {
    #[serde(rename = "sessionId")]
    pub session_id: String,

    pub phase: ImportPhase,

    #[serde(rename = "totalRows")]
    pub total_rows: i32,

    #[serde(rename = "processedRows")]
    pub processed_rows: i32,

    pub matched: i32,
    pub created: i32,
    pub added: i32,
    pub duplicates: i32,
    pub errors: i32,

    #[serde(rename = "updatedAt")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ImportProgress {
    pub fn new(session_id: String, total_rows: i32) -> Self {
        Self {
            session_id,
            phase: ImportPhase::Validating,
            total_rows,
            processed_rows: 0,
            matched: 0,
            created: 0,
            added: 0,
            duplicates: 0,
            errors: 0,
            updated_at: chrono::Utc::now(),
        }
    }
}
