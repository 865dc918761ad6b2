use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Распарсенная загруженная таблица. Создается один раз при загрузке файла
/// и больше не меняется; порядок строк сохраняется — на нем основано
/// правило "первое вхождение выигрывает" при поиске дублей.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedTable {
    /// Заголовки в порядке следования колонок в файле
    pub headers: Vec<String>,

    /// Строки данных: имя колонки -> сырое значение
    pub rows: Vec<HashMap<String, String>>,
}

impl UploadedTable {
    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    /// Значение ячейки по имени колонки (пустая строка, если колонки нет)
    pub fn cell<'a>(row: &'a HashMap<String, String>, column: &str) -> &'a str {
        row.get(column).map(|s| s.as_str()).unwrap_or("")
    }
}
