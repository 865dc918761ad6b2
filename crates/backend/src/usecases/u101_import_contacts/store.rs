use async_trait::async_trait;
use contracts::domain::a001_student::aggregate::Student;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{a001_student, a002_call_list};

/// Ошибки хранилища. `Unavailable` фатальна для прогона,
/// остальные остаются построчными.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("store conflict: {0}")]
    Conflict(String),
}

/// Граница с хранилищем сущностей. Каждая операция атомарна сама по себе;
/// транзакции на весь коммит нет, сходимость обеспечивается повторной
/// классификацией по живому индексу.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Живой набор студентов для построения индекса сопоставления
    async fn list_students(&self) -> Result<Vec<Student>, StoreError>;

    /// Создать студента из полей строки импорта
    async fn create_student(
        &self,
        name: &str,
        email: &str,
        phone: &str,
    ) -> Result<Student, StoreError>;

    /// Включить студента в список обзвона.
    /// `Ok(true)` — добавлен, `Ok(false)` — уже состоял.
    async fn attach(&self, student_id: Uuid, call_list_id: Uuid) -> Result<bool, StoreError>;

    async fn call_list_exists(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Хранилище поверх sea-orm репозиториев
pub struct SqlEntityStore;

#[async_trait]
impl EntityStore for SqlEntityStore {
    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        a001_student::repository::list_active()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn create_student(
        &self,
        name: &str,
        email: &str,
        phone: &str,
    ) -> Result<Student, StoreError> {
        let code = format!("STU-{}", Uuid::new_v4());
        let mut student = Student::new_for_insert(
            code,
            name.trim().to_string(),
            email.trim().to_string(),
            phone.trim().to_string(),
            None,
        );

        student.validate().map_err(StoreError::Validation)?;
        student.before_write();

        a001_student::repository::insert(&student)
            .await
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        Ok(student)
    }

    async fn attach(&self, student_id: Uuid, call_list_id: Uuid) -> Result<bool, StoreError> {
        a002_call_list::entries::attach(call_list_id, student_id)
            .await
            .map_err(|e| StoreError::Conflict(e.to_string()))
    }

    async fn call_list_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        let found = a002_call_list::repository::get_by_id(id)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(found.map(|l| !l.base.metadata.is_deleted).unwrap_or(false))
    }
}
