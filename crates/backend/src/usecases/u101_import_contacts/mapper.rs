use super::error::MappingError;
use contracts::usecases::u101_import_contacts::ColumnMapping;

// Синонимы канонических полей. Порядок проверки: email, phone, name,
// чтобы "student email" ушел в email, а не в name.
const EMAIL_SYNONYMS: &[&str] = &["e-mail", "email", "mail", "почта"];
const PHONE_SYNONYMS: &[&str] = &["phone", "mobile", "tel", "contact", "телефон", "моб"];
const NAME_SYNONYMS: &[&str] = &["full name", "fullname", "name", "student", "фио", "имя", "студент"];

/// Предложить маппинг колонок по заголовкам. Best-effort: подстрочное
/// сопоставление без учета регистра, первый подходящий заголовок
/// выигрывает, уже занятый повторно не используется.
pub fn infer_mapping(headers: &[String]) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();
    let mut used: Vec<String> = Vec::new();

    mapping.email = pick_header(headers, EMAIL_SYNONYMS, &mut used);
    mapping.phone = pick_header(headers, PHONE_SYNONYMS, &mut used);
    mapping.name = pick_header(headers, NAME_SYNONYMS, &mut used);

    mapping
}

fn pick_header(headers: &[String], synonyms: &[&str], used: &mut Vec<String>) -> Option<String> {
    for header in headers {
        if used.iter().any(|u| u == header) {
            continue;
        }
        let lower = header.to_lowercase();
        if synonyms.iter().any(|s| lower.contains(s)) {
            used.push(header.clone());
            return Some(header.clone());
        }
    }
    None
}

/// Проверить маппинг перед коммитом: все указанные колонки существуют,
/// поле `name` назначено. Без побочных эффектов.
pub fn validate_mapping(headers: &[String], mapping: &ColumnMapping) -> Result<(), MappingError> {
    check_known_columns(headers, mapping)?;
    if mapping.name.is_none() {
        return Err(MappingError::MissingRequiredField);
    }
    Ok(())
}

/// Частичная проверка для шага Map: колонки должны существовать,
/// но `name` еще может быть не назначен
pub fn check_known_columns(
    headers: &[String],
    mapping: &ColumnMapping,
) -> Result<(), MappingError> {
    for column in [&mapping.name, &mapping.email, &mapping.phone]
        .into_iter()
        .flatten()
    {
        if !headers.iter().any(|h| h == column) {
            return Err(MappingError::UnknownColumn(column.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_infers_english_headers() {
        let mapping = infer_mapping(&headers(&["Full Name", "E-mail", "Mobile"]));
        assert_eq!(mapping.name.as_deref(), Some("Full Name"));
        assert_eq!(mapping.email.as_deref(), Some("E-mail"));
        assert_eq!(mapping.phone.as_deref(), Some("Mobile"));
    }

    #[test]
    fn test_infers_russian_headers() {
        let mapping = infer_mapping(&headers(&["ФИО студента", "Почта", "Телефон"]));
        assert_eq!(mapping.name.as_deref(), Some("ФИО студента"));
        assert_eq!(mapping.email.as_deref(), Some("Почта"));
        assert_eq!(mapping.phone.as_deref(), Some("Телефон"));
    }

    #[test]
    fn test_student_email_goes_to_email_not_name() {
        let mapping = infer_mapping(&headers(&["student email", "student"]));
        assert_eq!(mapping.email.as_deref(), Some("student email"));
        assert_eq!(mapping.name.as_deref(), Some("student"));
    }

    #[test]
    fn test_unknown_headers_leave_fields_unset() {
        let mapping = infer_mapping(&headers(&["город", "возраст"]));
        assert_eq!(mapping, ColumnMapping::default());
    }

    #[test]
    fn test_validate_rejects_unknown_column() {
        let mapping = ColumnMapping {
            name: Some("ФИО".into()),
            email: Some("нет такой".into()),
            phone: None,
        };
        let err = validate_mapping(&headers(&["ФИО", "Почта"]), &mapping).unwrap_err();
        assert!(matches!(err, MappingError::UnknownColumn(c) if c == "нет такой"));
    }

    #[test]
    fn test_validate_requires_name() {
        let mapping = ColumnMapping {
            name: None,
            email: Some("Почта".into()),
            phone: None,
        };
        let err = validate_mapping(&headers(&["Почта"]), &mapping).unwrap_err();
        assert!(matches!(err, MappingError::MissingRequiredField));
    }
}
