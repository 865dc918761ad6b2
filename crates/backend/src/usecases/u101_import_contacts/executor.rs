use super::error::{ExecutorFault, MappingError, ParseError, SessionError};
use super::mapper;
use super::matcher::{MatchIndex, RowClassification, RowClassifier, SkipReason};
use super::parser::{self, FormatHint};
use super::session::{CommitPlan, SessionStore};
use super::store::{EntityStore, StoreError};
use crate::shared::config::ImportConfig;
use contracts::usecases::u101_import_contacts::{
    ColumnMapping, CommitAccepted, CommitResult, ImportOptions, ImportPhase, ImportStats,
    ImportStep, MatchingStats, UpdateMappingRequest, UploadResponse, UploadedTable,
};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Ошибки загрузки файла
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("call list not found")]
    UnknownCallList,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Синхронные ошибки операций над сессией
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Итог обработки одной строки
enum RowOutcome {
    Matched { added: bool },
    Created { added: bool },
    /// Коллизия ключей: строка пропущена или attach дал no-op
    Duplicate,
    /// Чистый пропуск: не ошибка и не дубль
    Skipped,
    Fault(String),
}

/// Исполнитель импорта контактов. Владеет сессиями; коммит выполняется
/// фоновой задачей, ровно одной на сессию.
pub struct ImportExecutor {
    sessions: SessionStore,
    store: Arc<dyn EntityStore>,
    config: ImportConfig,
}

impl ImportExecutor {
    pub fn new(store: Arc<dyn EntityStore>, config: ImportConfig) -> Self {
        Self {
            sessions: SessionStore::new(),
            store,
            config,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Принять загруженный файл: создать сессию, распарсить, предложить
    /// маппинг и посчитать предварительную статистику
    pub async fn start_upload(
        &self,
        call_list_id: Uuid,
        file_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<UploadResponse, UploadError> {
        // Заодно подчищаем отлежавшиеся сессии
        self.sessions
            .cleanup_old_sessions(self.config.session_max_age_hours);

        if !self.store.call_list_exists(call_list_id).await? {
            return Err(UploadError::UnknownCallList);
        }

        let session_id = self.sessions.create(call_list_id);
        tracing::info!(
            "import session {} created for call list {}",
            session_id,
            call_list_id
        );

        let hint = file_name.and_then(hint_from_name);
        let parsed = match parser::parse_upload(bytes, hint, self.config.max_rows) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Сессия остается в Upload, ошибка фиксируется
                self.sessions.record_upload_error(&session_id, e.to_string());
                return Err(e.into());
            }
        };

        let suggested = mapper::infer_mapping(&parsed.table.headers);
        let options = ImportOptions::default();
        let stats = self
            .preview_stats(&parsed.table, &suggested, &options)
            .await?;

        self.sessions.attach_table(
            &session_id,
            parsed.table.clone(),
            parsed.truncated_rows,
            suggested.clone(),
        )?;

        Ok(UploadResponse::from_table(
            session_id.to_string(),
            &parsed.table,
            parsed.truncated_rows,
            suggested,
            stats,
            self.config.preview_rows,
        ))
    }

    /// Map -> Map: заменить маппинг/опции и вернуть пересчитанную статистику
    pub async fn update_mapping(
        &self,
        session_id: Uuid,
        request: UpdateMappingRequest,
    ) -> Result<MatchingStats, ImportError> {
        let session = self.sessions.get(&session_id).ok_or(SessionError::NotFound)?;
        let table = session.table.clone().ok_or(SessionError::InvalidTransition {
            from: session.step,
            action: "update_mapping",
        })?;

        if let Some(mapping) = &request.mapping {
            mapper::check_known_columns(&table.headers, mapping)?;
        }

        let (mapping, options) =
            self.sessions
                .update_mapping(&session_id, request.mapping, request.options)?;

        let stats = self.preview_stats(&table, &mapping, &options).await?;
        Ok(stats)
    }

    /// Актуальная статистика предпросмотра без мутаций
    async fn preview_stats(
        &self,
        table: &UploadedTable,
        mapping: &ColumnMapping,
        options: &ImportOptions,
    ) -> Result<MatchingStats, StoreError> {
        let students = self.store.list_students().await?;
        Ok(super::matcher::preview(
            table,
            mapping,
            options,
            &students,
            self.config.phone_significant_digits,
        ))
    }

    /// Запустить коммит. Повторный запрос для уже идущего коммита не
    /// стартует второй прогон, а возвращает ссылку на текущий.
    pub async fn start_commit(
        self: &Arc<Self>,
        session_id: Uuid,
    ) -> Result<CommitAccepted, ImportError> {
        let session = self.sessions.get(&session_id).ok_or(SessionError::NotFound)?;

        if session.step == ImportStep::Importing {
            return Ok(CommitAccepted {
                session_id: session_id.to_string(),
                status: "already_importing".to_string(),
            });
        }

        if let Some(table) = &session.table {
            mapper::validate_mapping(&table.headers, &session.mapping)?;
        }

        let plan = match self.sessions.begin_commit(&session_id) {
            Ok(plan) => plan,
            // Проиграли гонку другому запросу: присоединяемся к его прогону
            Err(SessionError::AlreadyImporting) => {
                return Ok(CommitAccepted {
                    session_id: session_id.to_string(),
                    status: "already_importing".to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            "starting commit for session {}: {} rows",
            session_id,
            plan.table.rows.len()
        );

        let executor = Arc::clone(self);
        tokio::spawn(async move {
            executor.run_commit(plan).await;
        });

        Ok(CommitAccepted {
            session_id: session_id.to_string(),
            status: "started".to_string(),
        })
    }

    /// Фоновый прогон коммита. Всегда завершает сессию результатом.
    async fn run_commit(&self, plan: CommitPlan) {
        let session_id = plan.session_id;
        let result = self.process_rows(&plan).await;

        tracing::info!(
            "commit finished for session {}: {} (matched {}, created {}, added {}, duplicates {}, errors {})",
            session_id,
            result.message,
            result.stats.matched,
            result.stats.created,
            result.stats.added,
            result.stats.duplicates,
            result.stats.errors
        );

        if let Err(e) = self.sessions.complete(&session_id, result) {
            tracing::warn!("failed to finalize import session {}: {}", session_id, e);
        }
    }

    /// Пройти строки в порядке файла, батчами. Классификация выполняется
    /// заново по живому индексу, предпросмотру исполнитель не доверяет:
    /// с момента preview набор студентов мог измениться, а на повторном
    /// прогоне ранее созданные студенты должны сопоставиться, а не
    /// создаться второй раз.
    async fn process_rows(&self, plan: &CommitPlan) -> CommitResult {
        let total_rows = plan.table.rows.len() as i32;
        let mut stats = ImportStats::default();
        let mut row_errors: Vec<String> = Vec::new();
        let mut suppressed_errors = 0usize;
        let mut processed = 0i32;
        let mut fatal: Option<ExecutorFault> = None;

        let students = match self.store.list_students().await {
            Ok(students) => students,
            Err(e) => {
                return CommitResult {
                    message: format!("Импорт прерван: {}", e),
                    stats,
                    errors: row_errors,
                    cancelled: false,
                }
            }
        };
        let mut index = MatchIndex::build(&students, self.config.phone_significant_digits);
        let mut classifier = RowClassifier::new(
            plan.mapping.clone(),
            plan.options,
            self.config.phone_significant_digits,
        );

        let batch_size = self.config.batch_size.max(1);

        'batches: for batch in plan.table.rows.chunks(batch_size) {
            // Отмена проверяется только на границе батча
            if plan.cancel.load(Ordering::Relaxed) {
                fatal = Some(ExecutorFault::Cancelled);
                break 'batches;
            }

            let mut batch_created = 0;
            let mut batch_attached = 0;

            for row in batch {
                let outcome = match self
                    .apply_row(plan, row, &mut classifier, &mut index)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(fault) => {
                        fatal = Some(fault);
                        break;
                    }
                };

                match outcome {
                    RowOutcome::Matched { added } => {
                        stats.matched += 1;
                        if added {
                            stats.added += 1;
                            batch_attached += 1;
                        } else {
                            stats.duplicates += 1;
                        }
                    }
                    RowOutcome::Created { added } => {
                        stats.created += 1;
                        batch_created += 1;
                        if added {
                            stats.added += 1;
                            batch_attached += 1;
                        } else {
                            stats.duplicates += 1;
                        }
                    }
                    RowOutcome::Duplicate => stats.duplicates += 1,
                    RowOutcome::Skipped => {}
                    RowOutcome::Fault(message) => {
                        stats.errors += 1;
                        let message = format!("row {}: {}", processed + 1, message);
                        tracing::warn!("import session {}: {}", plan.session_id, message);
                        if row_errors.len() < self.config.max_reported_errors {
                            row_errors.push(truncate_message(&message, 200));
                        } else {
                            suppressed_errors += 1;
                        }
                    }
                }
                processed += 1;
            }

            let phase = if batch_created > 0 {
                ImportPhase::Creating
            } else if batch_attached > 0 {
                ImportPhase::Attaching
            } else {
                ImportPhase::Matching
            };
            if let Err(e) = self
                .sessions
                .update_progress(&plan.session_id, phase, processed, stats)
            {
                tracing::warn!("progress update failed for {}: {}", plan.session_id, e);
            }

            if fatal.is_some() {
                break 'batches;
            }
        }

        let _ = self
            .sessions
            .update_progress(&plan.session_id, ImportPhase::Finalizing, processed, stats);

        if suppressed_errors > 0 {
            row_errors.push(format!("+{} more", suppressed_errors));
        }

        let (message, cancelled) = match fatal {
            Some(ExecutorFault::Cancelled) => (
                format!("Импорт отменен: обработано {} из {} строк", processed, total_rows),
                true,
            ),
            Some(fault) => (
                format!(
                    "Импорт прерван после {} из {} строк: {}",
                    processed, total_rows, fault
                ),
                false,
            ),
            None => (
                format!(
                    "Импорт завершен: сопоставлено {}, создано {}, добавлено {}, дубликатов {}, ошибок {}",
                    stats.matched, stats.created, stats.added, stats.duplicates, stats.errors
                ),
                false,
            ),
        };

        CommitResult {
            message,
            stats,
            errors: row_errors,
            cancelled,
        }
    }

    /// Обработать одну строку. Построчные сбои возвращаются как
    /// `RowOutcome::Fault`; `Err` — только фатальные.
    async fn apply_row(
        &self,
        plan: &CommitPlan,
        row: &HashMap<String, String>,
        classifier: &mut RowClassifier,
        index: &mut MatchIndex,
    ) -> Result<RowOutcome, ExecutorFault> {
        match classifier.classify(row, index) {
            RowClassification::WillMatch { student: Some(id) } => {
                match self.store.attach(id.value(), plan.call_list_id).await {
                    Ok(added) => Ok(RowOutcome::Matched { added }),
                    Err(StoreError::Unavailable(msg)) => {
                        Err(ExecutorFault::StoreUnavailable(msg))
                    }
                    Err(e) => Ok(RowOutcome::Fault(e.to_string())),
                }
            }
            // Коллизия со строкой, не породившей сущность
            RowClassification::WillMatch { student: None } => Ok(RowOutcome::Duplicate),
            RowClassification::WillCreate => {
                let cell = |column: &Option<String>| -> &str {
                    column
                        .as_ref()
                        .map(|c| UploadedTable::cell(row, c))
                        .unwrap_or("")
                };
                let name = cell(&plan.mapping.name);
                let email = cell(&plan.mapping.email);
                let phone = cell(&plan.mapping.phone);

                let student = match self.store.create_student(name, email, phone).await {
                    Ok(student) => student,
                    Err(StoreError::Unavailable(msg)) => {
                        return Err(ExecutorFault::StoreUnavailable(msg))
                    }
                    Err(e) => return Ok(RowOutcome::Fault(e.to_string())),
                };
                // Последующие строки файла должны видеть нового студента
                index.insert_student(&student);

                match self
                    .store
                    .attach(student.base.id.value(), plan.call_list_id)
                    .await
                {
                    Ok(added) => Ok(RowOutcome::Created { added }),
                    Err(StoreError::Unavailable(msg)) => {
                        Err(ExecutorFault::StoreUnavailable(msg))
                    }
                    Err(e) => Ok(RowOutcome::Fault(e.to_string())),
                }
            }
            RowClassification::WillSkip(SkipReason::DuplicateInUpload) => {
                Ok(RowOutcome::Duplicate)
            }
            RowClassification::WillSkip(_) => Ok(RowOutcome::Skipped),
        }
    }
}

fn hint_from_name(file_name: &str) -> Option<FormatHint> {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".xlsx") {
        Some(FormatHint::Spreadsheet)
    } else if lower.ends_with(".csv") || lower.ends_with(".tsv") || lower.ends_with(".txt") {
        Some(FormatHint::Delimited)
    } else {
        None
    }
}

fn truncate_message(message: &str, max_len: usize) -> String {
    if message.len() <= max_len {
        message.to_string()
    } else {
        message.chars().take(max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use contracts::domain::a001_student::aggregate::Student;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory хранилище для тестов исполнителя
    struct MemoryStore {
        students: Mutex<Vec<Student>>,
        attachments: Mutex<HashSet<(Uuid, Uuid)>>,
        call_lists: Vec<Uuid>,
    }

    impl MemoryStore {
        fn new(call_list_id: Uuid) -> Self {
            Self {
                students: Mutex::new(Vec::new()),
                attachments: Mutex::new(HashSet::new()),
                call_lists: vec![call_list_id],
            }
        }

        fn student_count(&self) -> usize {
            self.students.lock().unwrap().len()
        }

        fn attachment_count(&self) -> usize {
            self.attachments.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl EntityStore for MemoryStore {
        async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
            Ok(self.students.lock().unwrap().clone())
        }

        async fn create_student(
            &self,
            name: &str,
            email: &str,
            phone: &str,
        ) -> Result<Student, StoreError> {
            let mut student = Student::new_for_insert(
                format!("STU-{}", Uuid::new_v4()),
                name.trim().to_string(),
                email.trim().to_string(),
                phone.trim().to_string(),
                None,
            );
            student.validate().map_err(StoreError::Validation)?;
            student.before_write();
            self.students.lock().unwrap().push(student.clone());
            Ok(student)
        }

        async fn attach(
            &self,
            student_id: Uuid,
            call_list_id: Uuid,
        ) -> Result<bool, StoreError> {
            Ok(self
                .attachments
                .lock()
                .unwrap()
                .insert((call_list_id, student_id)))
        }

        async fn call_list_exists(&self, id: Uuid) -> Result<bool, StoreError> {
            Ok(self.call_lists.contains(&id))
        }
    }

    fn test_config() -> ImportConfig {
        ImportConfig {
            batch_size: 2,
            ..ImportConfig::default()
        }
    }

    fn executor_with(store: Arc<MemoryStore>) -> Arc<ImportExecutor> {
        Arc::new(ImportExecutor::new(store, test_config()))
    }

    fn csv_bytes(rows: &[&str]) -> Vec<u8> {
        let mut data = String::from("name,email,phone\n");
        for row in rows {
            data.push_str(row);
            data.push('\n');
        }
        data.into_bytes()
    }

    async fn wait_done(executor: &Arc<ImportExecutor>, session_id: Uuid) -> CommitResult {
        for _ in 0..10_000 {
            if let Some(session) = executor.sessions().get(&session_id) {
                if session.step == ImportStep::Done {
                    return session.result.unwrap();
                }
            }
            tokio::task::yield_now().await;
        }
        panic!("commit did not finish");
    }

    async fn upload_and_commit(
        executor: &Arc<ImportExecutor>,
        call_list_id: Uuid,
        rows: &[&str],
    ) -> CommitResult {
        let response = executor
            .start_upload(call_list_id, Some("students.csv"), &csv_bytes(rows))
            .await
            .unwrap();
        let session_id = Uuid::parse_str(&response.session_id).unwrap();
        let accepted = executor.start_commit(session_id).await.unwrap();
        assert_eq!(accepted.status, "started");
        wait_done(executor, session_id).await
    }

    #[tokio::test]
    async fn test_upload_rejects_unknown_call_list() {
        let store = Arc::new(MemoryStore::new(Uuid::new_v4()));
        let executor = executor_with(Arc::clone(&store));

        let err = executor
            .start_upload(Uuid::new_v4(), Some("x.csv"), &csv_bytes(&["A,a@m.ru,"]))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::UnknownCallList));
    }

    #[tokio::test]
    async fn test_upload_suggests_mapping_and_stats() {
        let call_list = Uuid::new_v4();
        let store = Arc::new(MemoryStore::new(call_list));
        let executor = executor_with(Arc::clone(&store));

        let response = executor
            .start_upload(
                call_list,
                Some("students.csv"),
                &csv_bytes(&["Ivanov,ivanov@mail.ru,+79001234567"]),
            )
            .await
            .unwrap();

        assert_eq!(response.total_rows, 1);
        assert_eq!(response.suggested_mapping.name.as_deref(), Some("name"));
        assert_eq!(response.suggested_mapping.email.as_deref(), Some("email"));
        assert_eq!(response.suggested_mapping.phone.as_deref(), Some("phone"));
        assert_eq!(response.matching_stats.will_create, 1);
    }

    #[tokio::test]
    async fn test_parse_failure_keeps_session_in_upload() {
        let call_list = Uuid::new_v4();
        let store = Arc::new(MemoryStore::new(call_list));
        let executor = executor_with(Arc::clone(&store));

        let err = executor
            .start_upload(call_list, Some("empty.csv"), b"")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Parse(ParseError::Empty)));
    }

    #[tokio::test]
    async fn test_scenario_three_distinct_emails_create_and_attach() {
        let call_list = Uuid::new_v4();
        let store = Arc::new(MemoryStore::new(call_list));
        let executor = executor_with(Arc::clone(&store));

        let result = upload_and_commit(
            &executor,
            call_list,
            &["A,a@m.ru,", "B,b@m.ru,", "C,c@m.ru,"],
        )
        .await;

        assert_eq!(result.stats.created, 3);
        assert_eq!(result.stats.added, 3);
        assert_eq!(result.stats.matched, 0);
        assert_eq!(result.stats.duplicates, 0);
        assert_eq!(result.stats.errors, 0);
        assert_eq!(store.student_count(), 3);
        assert_eq!(store.attachment_count(), 3);
    }

    #[tokio::test]
    async fn test_scenario_duplicate_email_in_upload() {
        let call_list = Uuid::new_v4();
        let store = Arc::new(MemoryStore::new(call_list));
        let executor = executor_with(Arc::clone(&store));

        let result =
            upload_and_commit(&executor, call_list, &["A,same@m.ru,", "B,SAME@m.ru,"]).await;

        assert_eq!(result.stats.created, 1);
        assert_eq!(result.stats.added, 1);
        assert_eq!(result.stats.duplicates, 1);
        assert_eq!(result.stats.errors, 0);
        assert_eq!(store.student_count(), 1);
    }

    #[tokio::test]
    async fn test_row_fault_does_not_abort_the_run() {
        let call_list = Uuid::new_v4();
        let store = Arc::new(MemoryStore::new(call_list));
        let executor = executor_with(Arc::clone(&store));

        // Вторая строка падает на валидации e-mail при записи
        let result = upload_and_commit(
            &executor,
            call_list,
            &["A,a@m.ru,", "B,not-an-email,", "C,c@m.ru,"],
        )
        .await;

        assert_eq!(result.stats.errors, 1);
        assert_eq!(result.stats.created, 2);
        assert_eq!(result.stats.added, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("row 2:"));
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let call_list = Uuid::new_v4();
        let store = Arc::new(MemoryStore::new(call_list));
        let executor = executor_with(Arc::clone(&store));
        let rows = ["A,a@m.ru,", "B,b@m.ru,", "C,c@m.ru,"];

        let first = upload_and_commit(&executor, call_list, &rows).await;
        assert_eq!(first.stats.created, 3);

        // Свежая сессия с тем же файлом: все строки сопоставляются,
        // ничего не создается и не добавляется второй раз
        let second = upload_and_commit(&executor, call_list, &rows).await;
        assert_eq!(second.stats.created, 0);
        assert_eq!(second.stats.matched, 3);
        assert_eq!(second.stats.added, 0);
        assert_eq!(second.stats.duplicates, 3);
        assert_eq!(store.student_count(), 3);
        assert_eq!(store.attachment_count(), 3);
    }

    #[tokio::test]
    async fn test_conservation_law() {
        let call_list = Uuid::new_v4();
        let store = Arc::new(MemoryStore::new(call_list));
        let executor = executor_with(Arc::clone(&store));
        store
            .create_student("Existing", "existing@m.ru", "")
            .await
            .unwrap();

        let rows = [
            "A,a@m.ru,",          // created + added
            "B,a@m.ru,",          // duplicate in upload
            "C,,",                // no key -> pure skip
            "D,bad email,",       // row fault
            "E,existing@m.ru,",   // matched + added
        ];
        let result = upload_and_commit(&executor, call_list, &rows).await;

        let untouched_skips = 1;
        assert_eq!(result.stats.added, 2);
        assert_eq!(result.stats.duplicates, 1);
        assert_eq!(result.stats.errors, 1);
        assert_eq!(
            result.stats.added + result.stats.duplicates + result.stats.errors + untouched_skips,
            rows.len() as i32
        );
    }

    #[tokio::test]
    async fn test_second_commit_joins_the_first_run() {
        let call_list = Uuid::new_v4();
        let store = Arc::new(MemoryStore::new(call_list));
        let executor = executor_with(Arc::clone(&store));

        let response = executor
            .start_upload(
                call_list,
                Some("students.csv"),
                &csv_bytes(&["A,a@m.ru,", "B,b@m.ru,", "C,c@m.ru,"]),
            )
            .await
            .unwrap();
        let session_id = Uuid::parse_str(&response.session_id).unwrap();

        let first = executor.start_commit(session_id).await.unwrap();
        let second = executor.start_commit(session_id).await.unwrap();
        assert_eq!(first.status, "started");
        assert_eq!(second.status, "already_importing");

        let result = wait_done(&executor, session_id).await;
        // Ровно один прогон по строкам
        assert_eq!(result.stats.created, 3);
        assert_eq!(store.student_count(), 3);
        assert_eq!(store.attachment_count(), 3);
    }

    #[tokio::test]
    async fn test_cancellation_at_batch_boundary() {
        let call_list = Uuid::new_v4();
        let store = Arc::new(MemoryStore::new(call_list));
        let executor = executor_with(Arc::clone(&store));

        let response = executor
            .start_upload(
                call_list,
                Some("students.csv"),
                &csv_bytes(&["A,a@m.ru,", "B,b@m.ru,", "C,c@m.ru,"]),
            )
            .await
            .unwrap();
        let session_id = Uuid::parse_str(&response.session_id).unwrap();

        executor.start_commit(session_id).await.unwrap();
        // Однопоточный runtime: фоновая задача еще не начала работу,
        // отмена видна уже на первой границе батча
        executor.sessions().request_cancel(&session_id).unwrap();

        let result = wait_done(&executor, session_id).await;
        assert!(result.cancelled);
        assert_eq!(result.stats.created, 0);
        assert_eq!(store.student_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_without_name_mapping_fails() {
        let call_list = Uuid::new_v4();
        let store = Arc::new(MemoryStore::new(call_list));
        let executor = executor_with(Arc::clone(&store));

        let response = executor
            .start_upload(
                call_list,
                Some("students.csv"),
                // Заголовки не распознаются — маппинг пуст
                b"col1,col2\nx,y\n",
            )
            .await
            .unwrap();
        let session_id = Uuid::parse_str(&response.session_id).unwrap();

        let err = executor.start_commit(session_id).await.unwrap_err();
        assert!(matches!(
            err,
            ImportError::Mapping(MappingError::MissingRequiredField)
        ));
        // Сессия осталась в Map
        assert_eq!(
            executor.sessions().get(&session_id).unwrap().step,
            ImportStep::Map
        );
    }
}
