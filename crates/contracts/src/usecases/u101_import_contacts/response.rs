use super::request::ColumnMapping;
use super::table::UploadedTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Агрегированный результат предварительного прогона (dry run)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MatchingStats {
    /// Строк, для которых найден существующий студент
    #[serde(rename = "willMatch")]
    pub will_match: i32,

    /// Строк, из которых будет создан новый студент
    #[serde(rename = "willCreate")]
    pub will_create: i32,

    /// Строк, которые будут пропущены
    #[serde(rename = "willSkip")]
    pub will_skip: i32,
}

/// Ответ на загрузку файла
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,

    pub headers: Vec<String>,

    /// Ограниченная выборка строк для предпросмотра на клиенте
    #[serde(rename = "previewRows")]
    pub preview_rows: Vec<HashMap<String, String>>,

    #[serde(rename = "totalRows")]
    pub total_rows: i32,

    /// Количество строк, обрезанных до ширины заголовка (предупреждение)
    #[serde(rename = "truncatedRows", default)]
    pub truncated_rows: i32,

    /// Автоматически предложенный маппинг колонок
    #[serde(rename = "suggestedMapping")]
    pub suggested_mapping: ColumnMapping,

    #[serde(rename = "matchingStats")]
    pub matching_stats: MatchingStats,
}

impl UploadResponse {
    /// Собрать ответ из таблицы, ограничив предпросмотр `preview_limit` строками
    pub fn from_table(
        session_id: String,
        table: &UploadedTable,
        truncated_rows: i32,
        suggested_mapping: ColumnMapping,
        matching_stats: MatchingStats,
        preview_limit: usize,
    ) -> Self {
        Self {
            session_id,
            headers: table.headers.clone(),
            preview_rows: table.rows.iter().take(preview_limit).cloned().collect(),
            total_rows: table.rows.len() as i32,
            truncated_rows,
            suggested_mapping,
            matching_stats,
        }
    }
}

/// Итоговые счетчики коммита
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub matched: i32,
    pub created: i32,
    pub added: i32,
    pub duplicates: i32,
    pub errors: i32,
}

/// Терминальный результат коммита. Формируется ровно один раз.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResult {
    pub message: String,

    pub stats: ImportStats,

    /// Сообщения о построчных ошибках (обрезанный список, хвост "+N more")
    #[serde(default)]
    pub errors: Vec<String>,

    /// Признак кооперативной отмены
    #[serde(default)]
    pub cancelled: bool,
}

/// Ответ на запуск коммита
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitAccepted {
    #[serde(rename = "sessionId")]
    pub session_id: String,

    /// `started` при первом запуске, `already_importing` для повторного
    /// запроса — второй прогон не стартует
    pub status: String,
}
