use serde::{Deserialize, Serialize};

/// Сопоставление колонок файла каноническим полям контакта.
/// До подтверждения маппинга обязательно только поле `name`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    /// Колонка с именем (обязательна для коммита)
    pub name: Option<String>,

    /// Колонка с e-mail
    pub email: Option<String>,

    /// Колонка с телефоном
    pub phone: Option<String>,
}

/// Стратегия сопоставления: по какому полю искать существующий контакт
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchStrategy {
    /// По e-mail (нормализация: trim + нижний регистр)
    ByEmail,
    /// По телефону (нормализация: только цифры, сравнение по хвосту)
    ByPhone,
    /// По имени (точное после trim + casefold; самая слабая стратегия,
    /// повышенный риск ложных совпадений)
    ByName,
    /// По e-mail или телефону; e-mail проверяется первым
    ByEmailOrPhone,
}

/// Опции импорта. После старта коммита становятся неизменяемыми.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImportOptions {
    #[serde(rename = "matchStrategy")]
    pub match_strategy: MatchStrategy,

    /// Создавать новых студентов для несопоставленных строк
    #[serde(rename = "createNewEntities", default = "default_true")]
    pub create_new_entities: bool,

    /// Пропускать строки, чей ключ уже встретился выше в этом же файле
    #[serde(rename = "skipDuplicates", default = "default_true")]
    pub skip_duplicates: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            match_strategy: MatchStrategy::ByEmail,
            create_new_entities: true,
            skip_duplicates: true,
        }
    }
}

/// PATCH-запрос шага Map: заменить маппинг и/или опции
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateMappingRequest {
    pub mapping: Option<ColumnMapping>,
    pub options: Option<ImportOptions>,
}
