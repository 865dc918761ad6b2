use super::error::SessionError;
use chrono::{DateTime, Duration, Utc};
use contracts::usecases::u101_import_contacts::{
    ColumnMapping, CommitResult, ImportOptions, ImportPhase, ImportProgress, ImportStats,
    ImportStep, UploadedTable,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Сессия импорта — агрегат жизненного цикла
/// `Upload -> Map -> Importing -> Done`.
///
/// Инварианты: `progress` есть только в Importing, `result` — только в
/// Done, `table` — на всех шагах после успешного парсинга.
#[derive(Clone)]
pub struct ImportSession {
    pub id: Uuid,
    /// Целевой список обзвона; задается при создании, далее неизменен
    pub call_list_id: Uuid,
    pub step: ImportStep,
    pub table: Option<UploadedTable>,
    pub truncated_rows: i32,
    pub mapping: ColumnMapping,
    pub options: ImportOptions,
    pub progress: Option<ImportProgress>,
    pub result: Option<CommitResult>,
    pub last_error: Option<String>,
    /// Флаг кооперативной отмены; исполнитель проверяет его на границе батча
    pub cancel: Arc<AtomicBool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportSession {
    fn new(id: Uuid, call_list_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            call_list_id,
            step: ImportStep::Upload,
            table: None,
            truncated_rows: 0,
            mapping: ColumnMapping::default(),
            options: ImportOptions::default(),
            progress: None,
            result: None,
            last_error: None,
            cancel: Arc::new(AtomicBool::new(false)),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// Неизменяемый снимок сессии для запущенного коммита
#[derive(Clone)]
pub struct CommitPlan {
    pub session_id: Uuid,
    pub call_list_id: Uuid,
    pub table: UploadedTable,
    pub mapping: ColumnMapping,
    pub options: ImportOptions,
    pub cancel: Arc<AtomicBool>,
}

/// Результат запроса на удаление/отмену
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Сессия удалена (Upload/Map/Done)
    Discarded,
    /// Коммит в полете: выставлен флаг, исполнитель завершится сам
    CancelRequested,
}

/// Хранилище сессий (in-memory). Последний снимок прогресса всегда
/// доступен читателям: поздний подписчик ничего не пропускает.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, ImportSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Создать сессию в шаге Upload
    pub fn create(&self, call_list_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(id, ImportSession::new(id, call_list_id));
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<ImportSession> {
        let sessions = self.sessions.read().unwrap();
        sessions.get(id).cloned()
    }

    /// Upload -> Map: парсинг удался, таблица и предложенный маппинг
    /// фиксируются в сессии
    pub fn attach_table(
        &self,
        id: &Uuid,
        table: UploadedTable,
        truncated_rows: i32,
        suggested_mapping: ColumnMapping,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        if session.step != ImportStep::Upload {
            return Err(SessionError::InvalidTransition {
                from: session.step,
                action: "attach_table",
            });
        }
        session.table = Some(table);
        session.truncated_rows = truncated_rows;
        session.mapping = suggested_mapping;
        session.step = ImportStep::Map;
        session.last_error = None;
        session.updated_at = Utc::now();
        Ok(())
    }

    /// Парсинг не удался: сессия остается в Upload с текстом ошибки
    pub fn record_upload_error(&self, id: &Uuid, message: String) {
        let mut sessions = self.sessions.write().unwrap();
        if let Some(session) = sessions.get_mut(id) {
            session.last_error = Some(message);
            session.updated_at = Utc::now();
        }
    }

    /// Map -> Map: заменить маппинг и/или опции. Возвращает актуальную пару.
    pub fn update_mapping(
        &self,
        id: &Uuid,
        mapping: Option<ColumnMapping>,
        options: Option<ImportOptions>,
    ) -> Result<(ColumnMapping, ImportOptions), SessionError> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        if session.step != ImportStep::Map {
            return Err(SessionError::InvalidTransition {
                from: session.step,
                action: "update_mapping",
            });
        }
        if let Some(mapping) = mapping {
            session.mapping = mapping;
        }
        if let Some(options) = options {
            session.options = options;
        }
        session.updated_at = Utc::now();
        Ok((session.mapping.clone(), session.options))
    }

    /// Map -> Importing: снять неизменяемый снимок для исполнителя.
    /// Для уже идущего коммита — AlreadyImporting (второй прогон не
    /// стартует), для остальных шагов — InvalidTransition.
    pub fn begin_commit(&self, id: &Uuid) -> Result<CommitPlan, SessionError> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        match session.step {
            ImportStep::Map => {}
            ImportStep::Importing => return Err(SessionError::AlreadyImporting),
            from => {
                return Err(SessionError::InvalidTransition {
                    from,
                    action: "commit",
                })
            }
        }
        let table = session.table.clone().ok_or(SessionError::InvalidTransition {
            from: session.step,
            action: "commit",
        })?;

        session.step = ImportStep::Importing;
        session.progress = Some(ImportProgress::new(
            session.id.to_string(),
            table.rows.len() as i32,
        ));
        session.last_error = None;
        session.updated_at = Utc::now();

        Ok(CommitPlan {
            session_id: session.id,
            call_list_id: session.call_list_id,
            table,
            mapping: session.mapping.clone(),
            options: session.options,
            cancel: Arc::clone(&session.cancel),
        })
    }

    /// Обновить снимок прогресса (только в Importing). Счетчики монотонны,
    /// `updated_at` строго растет от снимка к снимку.
    pub fn update_progress(
        &self,
        id: &Uuid,
        phase: ImportPhase,
        processed_rows: i32,
        stats: ImportStats,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        let progress = match (&session.step, session.progress.as_mut()) {
            (ImportStep::Importing, Some(progress)) => progress,
            _ => {
                return Err(SessionError::InvalidTransition {
                    from: session.step,
                    action: "update_progress",
                })
            }
        };

        progress.phase = phase;
        progress.processed_rows = progress
            .processed_rows
            .max(processed_rows.min(progress.total_rows));
        progress.matched = progress.matched.max(stats.matched);
        progress.created = progress.created.max(stats.created);
        progress.added = progress.added.max(stats.added);
        progress.duplicates = progress.duplicates.max(stats.duplicates);
        progress.errors = progress.errors.max(stats.errors);

        let now = Utc::now();
        progress.updated_at = if now > progress.updated_at {
            now
        } else {
            progress.updated_at + Duration::milliseconds(1)
        };
        session.updated_at = progress.updated_at;
        Ok(())
    }

    /// Importing -> Done: результат фиксируется ровно один раз,
    /// снимок прогресса очищается
    pub fn complete(&self, id: &Uuid, result: CommitResult) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        if session.step != ImportStep::Importing {
            return Err(SessionError::InvalidTransition {
                from: session.step,
                action: "complete",
            });
        }
        session.step = ImportStep::Done;
        session.result = Some(result);
        session.progress = None;
        session.updated_at = Utc::now();
        Ok(())
    }

    /// Внешняя отмена: до коммита и после завершения сессия просто
    /// удаляется, в полете — выставляется кооперативный флаг
    pub fn request_cancel(&self, id: &Uuid) -> Result<CancelOutcome, SessionError> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        match session.step {
            ImportStep::Importing => {
                session.cancel.store(true, Ordering::Relaxed);
                session.updated_at = Utc::now();
                Ok(CancelOutcome::CancelRequested)
            }
            _ => {
                sessions.remove(id);
                Ok(CancelOutcome::Discarded)
            }
        }
    }

    /// Ретеншн: убрать старые завершенные и брошенные сессии.
    /// Идущий коммит не трогаем.
    pub fn cleanup_old_sessions(&self, max_age_hours: i64) {
        let now = Utc::now();
        let mut sessions = self.sessions.write().unwrap();
        sessions.retain(|_, session| {
            if session.step == ImportStep::Importing {
                return true;
            }
            (now - session.updated_at).num_hours() < max_age_hours
        });
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> UploadedTable {
        let mut row = HashMap::new();
        row.insert("name".to_string(), "Иванов".to_string());
        UploadedTable {
            headers: vec!["name".into()],
            rows: vec![row],
        }
    }

    fn mapped() -> ColumnMapping {
        ColumnMapping {
            name: Some("name".into()),
            email: None,
            phone: None,
        }
    }

    fn stats(matched: i32, errors: i32) -> ImportStats {
        ImportStats {
            matched,
            created: 0,
            added: 0,
            duplicates: 0,
            errors,
        }
    }

    #[test]
    fn test_full_lifecycle() {
        let store = SessionStore::new();
        let id = store.create(Uuid::new_v4());
        assert_eq!(store.get(&id).unwrap().step, ImportStep::Upload);

        store.attach_table(&id, sample_table(), 0, mapped()).unwrap();
        assert_eq!(store.get(&id).unwrap().step, ImportStep::Map);

        let plan = store.begin_commit(&id).unwrap();
        assert_eq!(plan.table.rows.len(), 1);
        let session = store.get(&id).unwrap();
        assert_eq!(session.step, ImportStep::Importing);
        assert!(session.progress.is_some());
        assert!(session.result.is_none());

        store
            .complete(
                &id,
                CommitResult {
                    message: "done".into(),
                    stats: ImportStats::default(),
                    errors: vec![],
                    cancelled: false,
                },
            )
            .unwrap();
        let session = store.get(&id).unwrap();
        assert_eq!(session.step, ImportStep::Done);
        assert!(session.progress.is_none());
        assert!(session.result.is_some());
    }

    #[test]
    fn test_commit_without_mapping_step_fails() {
        let store = SessionStore::new();
        let id = store.create(Uuid::new_v4());
        // Еще Upload — коммит невозможен
        assert!(matches!(
            store.begin_commit(&id),
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_second_commit_rejected() {
        let store = SessionStore::new();
        let id = store.create(Uuid::new_v4());
        store.attach_table(&id, sample_table(), 0, mapped()).unwrap();

        store.begin_commit(&id).unwrap();
        assert!(matches!(
            store.begin_commit(&id),
            Err(SessionError::AlreadyImporting)
        ));
    }

    #[test]
    fn test_mapping_frozen_after_commit_starts() {
        let store = SessionStore::new();
        let id = store.create(Uuid::new_v4());
        store.attach_table(&id, sample_table(), 0, mapped()).unwrap();
        store.begin_commit(&id).unwrap();

        assert!(matches!(
            store.update_mapping(&id, Some(ColumnMapping::default()), None),
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_progress_is_monotonic_and_clock_strictly_increases() {
        let store = SessionStore::new();
        let id = store.create(Uuid::new_v4());
        store.attach_table(&id, sample_table(), 0, mapped()).unwrap();
        store.begin_commit(&id).unwrap();

        store
            .update_progress(&id, ImportPhase::Matching, 1, stats(1, 0))
            .unwrap();
        let first = store.get(&id).unwrap().progress.unwrap();

        // Попытка отката счетчиков игнорируется
        store
            .update_progress(&id, ImportPhase::Matching, 0, stats(0, 0))
            .unwrap();
        let second = store.get(&id).unwrap().progress.unwrap();

        assert_eq!(second.processed_rows, first.processed_rows);
        assert_eq!(second.matched, first.matched);
        assert!(second.updated_at > first.updated_at);
        assert!(second.processed_rows <= second.total_rows);
    }

    #[test]
    fn test_cancel_before_commit_discards() {
        let store = SessionStore::new();
        let id = store.create(Uuid::new_v4());
        assert_eq!(store.request_cancel(&id).unwrap(), CancelOutcome::Discarded);
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_cancel_in_flight_sets_flag() {
        let store = SessionStore::new();
        let id = store.create(Uuid::new_v4());
        store.attach_table(&id, sample_table(), 0, mapped()).unwrap();
        let plan = store.begin_commit(&id).unwrap();

        assert_eq!(
            store.request_cancel(&id).unwrap(),
            CancelOutcome::CancelRequested
        );
        assert!(plan.cancel.load(Ordering::Relaxed));
        // Сессия не удалена — исполнитель доведет ее до Done
        assert_eq!(store.get(&id).unwrap().step, ImportStep::Importing);
    }

    #[test]
    fn test_result_set_exactly_once() {
        let store = SessionStore::new();
        let id = store.create(Uuid::new_v4());
        store.attach_table(&id, sample_table(), 0, mapped()).unwrap();
        store.begin_commit(&id).unwrap();

        let result = CommitResult {
            message: "done".into(),
            stats: ImportStats::default(),
            errors: vec![],
            cancelled: false,
        };
        store.complete(&id, result.clone()).unwrap();
        assert!(matches!(
            store.complete(&id, result),
            Err(SessionError::InvalidTransition { .. })
        ));
    }
}
