use crate::domain::common::{AggregateId, AggregateRoot, BaseAggregate, EntityMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// ID Type
// ============================================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(pub Uuid);

impl StudentId {
    pub fn new(value: Uuid) -> Self {
        Self(value)
    }

    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl AggregateId for StudentId {
    fn as_string(&self) -> String {
        self.0.to_string()
    }

    fn from_string(s: &str) -> Result<Self, String> {
        Uuid::parse_str(s)
            .map(StudentId::new)
            .map_err(|e| format!("Invalid UUID: {}", e))
    }
}

// ============================================================================
// Aggregate Root
// ============================================================================

/// Студент (контакт). `base.description` — отображаемое имя.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    #[serde(flatten)]
    pub base: BaseAggregate<StudentId>,

    /// E-mail (хранится как введен, нормализуется при сопоставлении)
    #[serde(default)]
    pub email: String,

    /// Телефон (хранится как введен, нормализуется при сопоставлении)
    #[serde(default)]
    pub phone: String,
}

impl Student {
    pub fn new_for_insert(
        code: String,
        name: String,
        email: String,
        phone: String,
        comment: Option<String>,
    ) -> Self {
        let mut base = BaseAggregate::new(StudentId::new_v4(), code, name);
        base.comment = comment;

        Self { base, email, phone }
    }

    pub fn to_string_id(&self) -> String {
        self.base.id.as_string()
    }

    pub fn touch_updated(&mut self) {
        self.base.touch();
    }

    pub fn update(&mut self, dto: &StudentDto) {
        self.base.code = dto.code.clone().unwrap_or_default();
        self.base.description = dto.description.clone();
        self.base.comment = dto.comment.clone();
        self.email = dto.email.clone().unwrap_or_default();
        self.phone = dto.phone.clone().unwrap_or_default();
    }

    /// Валидация перед записью. E-mail проверяется здесь, а не при парсинге
    /// файла: строка импорта с мусорным адресом должна упасть как row fault.
    pub fn validate(&self) -> Result<(), String> {
        if self.base.description.trim().is_empty() {
            return Err("Имя не может быть пустым".into());
        }
        if self.base.code.trim().is_empty() {
            return Err("Код не может быть пустым".into());
        }
        let email = self.email.trim();
        if !email.is_empty() {
            if !email.contains('@') || email.contains(char::is_whitespace) {
                return Err(format!("Некорректный e-mail: {}", email));
            }
        }
        Ok(())
    }

    pub fn before_write(&mut self) {
        self.touch_updated();
    }
}

impl AggregateRoot for Student {
    type Id = StudentId;

    fn id(&self) -> Self::Id {
        self.base.id
    }

    fn code(&self) -> &str {
        &self.base.code
    }

    fn description(&self) -> &str {
        &self.base.description
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.base.metadata
    }

    fn metadata_mut(&mut self) -> &mut EntityMetadata {
        &mut self.base.metadata
    }

    fn aggregate_index() -> &'static str {
        "a001"
    }

    fn collection_name() -> &'static str {
        "student"
    }
}

// ============================================================================
// DTO
// ============================================================================
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StudentDto {
    pub id: Option<String>,
    pub code: Option<String>,
    pub description: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub comment: Option<String>,
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_garbage_email() {
        let mut student = Student::new_for_insert(
            "STU-1".into(),
            "Иванов Иван".into(),
            "not-an-email".into(),
            String::new(),
            None,
        );
        assert!(student.validate().is_err());

        student.email = "ivanov @mail.ru".into();
        assert!(student.validate().is_err());

        student.email = "ivanov@mail.ru".into();
        assert!(student.validate().is_ok());
    }

    #[test]
    fn test_validate_allows_empty_email() {
        let student = Student::new_for_insert(
            "STU-2".into(),
            "Петров Петр".into(),
            String::new(),
            "+7 (900) 123-45-67".into(),
            None,
        );
        assert!(student.validate().is_ok());
    }
}
