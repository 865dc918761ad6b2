use contracts::usecases::u101_import_contacts::ImportStep;
use thiserror::Error;

/// Ошибки разбора загруженного файла
#[derive(Debug, Error)]
pub enum ParseError {
    /// В файле не нашлось ни одной непустой строки под заголовок
    #[error("file contains no header row")]
    Empty,

    /// Превышен потолок количества строк (защита памяти при предпросмотре)
    #[error("file exceeds the row limit of {limit}")]
    TooLarge { limit: usize },

    #[error("failed to parse file: {0}")]
    Malformed(String),
}

/// Ошибки маппинга колонок
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("column '{0}' is not present in the uploaded table")]
    UnknownColumn(String),

    #[error("required field 'name' is not mapped to any column")]
    MissingRequiredField,
}

/// Ошибки жизненного цикла сессии
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("operation '{action}' is not allowed in step {from:?}")]
    InvalidTransition {
        from: ImportStep,
        action: &'static str,
    },

    #[error("commit is already in flight for this session")]
    AlreadyImporting,

    #[error("import session not found")]
    NotFound,
}

/// Построчная ошибка коммита: строка считается, прогон продолжается
#[derive(Debug, Error)]
pub enum RowFault {
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("store conflict: {0}")]
    StoreConflict(String),
}

/// Фатальная ошибка исполнителя: прогон останавливается на границе батча
#[derive(Debug, Error)]
pub enum ExecutorFault {
    #[error("entity store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("import cancelled")]
    Cancelled,
}
