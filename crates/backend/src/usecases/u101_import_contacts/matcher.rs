use contracts::domain::a001_student::aggregate::{Student, StudentId};
use contracts::usecases::u101_import_contacts::{
    ColumnMapping, ImportOptions, MatchStrategy, MatchingStats, UploadedTable,
};
use std::collections::{HashMap, HashSet};

/// Классификация строки. Вычисляется заново при каждом прогоне,
/// отдельно не хранится.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowClassification {
    /// Найден существующий студент. `student == None` возможно только в
    /// предпросмотре: строка совпала с более ранней строкой файла, чей
    /// студент еще не создан.
    WillMatch { student: Option<StudentId> },
    /// Совпадений нет, создание разрешено
    WillCreate,
    WillSkip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Ключ уже встретился выше в этом же файле
    DuplicateInUpload,
    /// Ни одно поле активной стратегии не заполнено
    NoKey,
    /// Совпадений нет, а создание запрещено опциями
    CreationDisabled,
}

// ============================================================================
// Нормализация ключей
// ============================================================================

/// E-mail: trim + нижний регистр
pub fn normalize_email(raw: &str) -> Option<String> {
    let v = raw.trim().to_lowercase();
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

/// Телефон: только цифры, сравнение по последним `significant_digits`
/// цифрам. Так "+7 (900) 123-45-67" и "8 900 1234567" дают один ключ.
pub fn normalize_phone(raw: &str, significant_digits: usize) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let tail_start = digits.len().saturating_sub(significant_digits);
    Some(digits[tail_start..].to_string())
}

/// Имя: trim + casefold, точное сравнение
pub fn normalize_name(raw: &str) -> Option<String> {
    let v = raw.trim().to_lowercase();
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

// Ключи разных полей живут в одном индексе, поэтому разносятся префиксом
fn email_key(v: String) -> String {
    format!("e:{}", v)
}

fn phone_key(v: String) -> String {
    format!("p:{}", v)
}

fn name_key(v: String) -> String {
    format!("n:{}", v)
}

// ============================================================================
// Индекс существующих студентов
// ============================================================================

/// Индекс нормализованный ключ -> студент, построенный по живому набору
/// сущностей. При конфликте ключей выигрывает первый студент в порядке
/// выдачи хранилища.
pub struct MatchIndex {
    significant_digits: usize,
    by_key: HashMap<String, StudentId>,
}

impl MatchIndex {
    pub fn build(students: &[Student], significant_digits: usize) -> Self {
        let mut index = Self {
            significant_digits,
            by_key: HashMap::new(),
        };
        for student in students {
            index.insert_student(student);
        }
        tracing::debug!(
            "built match index: {} keys from {} students",
            index.by_key.len(),
            students.len()
        );
        index
    }

    /// Добавить студента в индекс. Исполнитель вызывает это для только
    /// что созданных студентов, чтобы последующие строки файла их видели.
    pub fn insert_student(&mut self, student: &Student) {
        if let Some(v) = normalize_email(&student.email) {
            self.by_key.entry(email_key(v)).or_insert(student.base.id);
        }
        if let Some(v) = normalize_phone(&student.phone, self.significant_digits) {
            self.by_key.entry(phone_key(v)).or_insert(student.base.id);
        }
        if let Some(v) = normalize_name(&student.base.description) {
            self.by_key.entry(name_key(v)).or_insert(student.base.id);
        }
    }

    fn lookup(&self, key: &str) -> Option<StudentId> {
        self.by_key.get(key).copied()
    }
}

// ============================================================================
// Классификатор строк
// ============================================================================

/// Классификатор одного прогона по таблице. Держит ключи уже пройденных
/// строк файла (первое вхождение выигрывает); состояния вне себя не меняет.
pub struct RowClassifier {
    mapping: ColumnMapping,
    options: ImportOptions,
    significant_digits: usize,
    /// Ключ -> породила ли первая строка с этим ключом сущность
    seen: HashMap<String, bool>,
}

impl RowClassifier {
    pub fn new(mapping: ColumnMapping, options: ImportOptions, significant_digits: usize) -> Self {
        Self {
            mapping,
            options,
            significant_digits,
            seen: HashMap::new(),
        }
    }

    /// Ключи строки в порядке приоритета активной стратегии.
    /// Для ByEmailOrPhone e-mail проверяется первым.
    fn keys_for_row(&self, row: &HashMap<String, String>) -> Vec<String> {
        let cell = |column: &Option<String>| -> &str {
            column
                .as_ref()
                .and_then(|c| row.get(c))
                .map(|s| s.as_str())
                .unwrap_or("")
        };

        let email = || normalize_email(cell(&self.mapping.email)).map(email_key);
        let phone =
            || normalize_phone(cell(&self.mapping.phone), self.significant_digits).map(phone_key);
        let name = || normalize_name(cell(&self.mapping.name)).map(name_key);

        let keys: Vec<Option<String>> = match self.options.match_strategy {
            MatchStrategy::ByEmail => vec![email()],
            MatchStrategy::ByPhone => vec![phone()],
            MatchStrategy::ByName => vec![name()],
            MatchStrategy::ByEmailOrPhone => vec![email(), phone()],
        };
        keys.into_iter().flatten().collect()
    }

    /// Классифицировать строку против живого индекса.
    ///
    /// Детерминирована для фиксированных (таблица, маппинг, опции, индекс);
    /// порядок вызовов по строкам файла обязателен: на внутреннем
    /// состоянии держится правило "первое вхождение выигрывает".
    pub fn classify(
        &mut self,
        row: &HashMap<String, String>,
        index: &MatchIndex,
    ) -> RowClassification {
        let keys = self.keys_for_row(row);
        if keys.is_empty() {
            return RowClassification::WillSkip(SkipReason::NoKey);
        }

        let in_upload = keys.iter().any(|k| self.seen.contains_key(k));
        if in_upload {
            let earlier_has_entity = keys
                .iter()
                .any(|k| self.seen.get(k).copied().unwrap_or(false))
                || keys.iter().any(|k| index.lookup(k).is_some());
            self.remember(&keys, earlier_has_entity);

            if self.options.skip_duplicates {
                return RowClassification::WillSkip(SkipReason::DuplicateInUpload);
            }
            if earlier_has_entity {
                // Обрабатывается как совпадение; на коммите attach даст
                // no-op и строка уйдет в duplicates
                let student = keys.iter().find_map(|k| index.lookup(k));
                return RowClassification::WillMatch { student };
            }
            return RowClassification::WillSkip(SkipReason::DuplicateInUpload);
        }

        if let Some(id) = keys.iter().find_map(|k| index.lookup(k)) {
            self.remember(&keys, true);
            return RowClassification::WillMatch { student: Some(id) };
        }

        if self.options.create_new_entities {
            self.remember(&keys, true);
            RowClassification::WillCreate
        } else {
            self.remember(&keys, false);
            RowClassification::WillSkip(SkipReason::CreationDisabled)
        }
    }

    fn remember(&mut self, keys: &[String], has_entity: bool) {
        for key in keys {
            self.seen.entry(key.clone()).or_insert(has_entity);
        }
    }
}

/// Предпросмотр: агрегированная классификация всей таблицы без мутаций.
/// Повторные вызовы с теми же входами дают тот же результат.
pub fn preview(
    table: &UploadedTable,
    mapping: &ColumnMapping,
    options: &ImportOptions,
    students: &[Student],
    significant_digits: usize,
) -> MatchingStats {
    let index = MatchIndex::build(students, significant_digits);
    let mut classifier = RowClassifier::new(mapping.clone(), *options, significant_digits);

    let mut stats = MatchingStats::default();
    for row in &table.rows {
        match classifier.classify(row, &index) {
            RowClassification::WillMatch { .. } => stats.will_match += 1,
            RowClassification::WillCreate => stats.will_create += 1,
            RowClassification::WillSkip(_) => stats.will_skip += 1,
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIG: usize = 8;

    fn student(name: &str, email: &str, phone: &str) -> Student {
        Student::new_for_insert(
            format!("STU-{}", name),
            name.to_string(),
            email.to_string(),
            phone.to_string(),
            None,
        )
    }

    fn mapping() -> ColumnMapping {
        ColumnMapping {
            name: Some("name".into()),
            email: Some("email".into()),
            phone: Some("phone".into()),
        }
    }

    fn options(strategy: MatchStrategy, create: bool, skip_dup: bool) -> ImportOptions {
        ImportOptions {
            match_strategy: strategy,
            create_new_entities: create,
            skip_duplicates: skip_dup,
        }
    }

    fn row(name: &str, email: &str, phone: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("name".to_string(), name.to_string());
        map.insert("email".to_string(), email.to_string());
        map.insert("phone".to_string(), phone.to_string());
        map
    }

    fn table(rows: Vec<HashMap<String, String>>) -> UploadedTable {
        UploadedTable {
            headers: vec!["name".into(), "email".into(), "phone".into()],
            rows,
        }
    }

    #[test]
    fn test_normalize_email_lowercases_and_trims() {
        assert_eq!(
            normalize_email("  Ivanov@Mail.RU "),
            Some("ivanov@mail.ru".into())
        );
        assert_eq!(normalize_email("   "), None);
    }

    #[test]
    fn test_normalize_phone_compares_tails() {
        // Один номер в разных записях: +7..., 8..., без кода страны
        assert_eq!(
            normalize_phone("+7 (900) 123-45-67", SIG),
            normalize_phone("8 900 123 45 67", SIG)
        );
        assert_eq!(
            normalize_phone("9001234567", SIG),
            Some("01234567".to_string())
        );
        assert_eq!(normalize_phone("abc", SIG), None);
    }

    #[test]
    fn test_matches_existing_by_email() {
        let existing = vec![student("Ivanov", "ivanov@mail.ru", "")];
        let index = MatchIndex::build(&existing, SIG);
        let mut clf = RowClassifier::new(mapping(), options(MatchStrategy::ByEmail, true, true), SIG);

        let got = clf.classify(&row("Другой Иванов", "IVANOV@mail.ru", ""), &index);
        assert_eq!(
            got,
            RowClassification::WillMatch {
                student: Some(existing[0].base.id)
            }
        );
    }

    #[test]
    fn test_email_checked_before_phone() {
        let a = student("A", "a@mail.ru", "+7 900 000 00 01");
        let b = student("B", "b@mail.ru", "+7 900 000 00 02");
        let index = MatchIndex::build(&[a.clone(), b.clone()], SIG);
        let mut clf = RowClassifier::new(
            mapping(),
            options(MatchStrategy::ByEmailOrPhone, true, true),
            SIG,
        );

        // E-mail указывает на A, телефон на B: выигрывает e-mail
        let got = clf.classify(&row("X", "a@mail.ru", "+7 900 000 00 02"), &index);
        assert_eq!(
            got,
            RowClassification::WillMatch {
                student: Some(a.base.id)
            }
        );
    }

    #[test]
    fn test_no_key_is_skipped_unless_by_name() {
        let index = MatchIndex::build(&[], SIG);

        let mut by_email =
            RowClassifier::new(mapping(), options(MatchStrategy::ByEmail, true, true), SIG);
        assert_eq!(
            by_email.classify(&row("Иванов", "", "+79001234567"), &index),
            RowClassification::WillSkip(SkipReason::NoKey)
        );

        // Для ByName достаточно одного имени
        let mut by_name =
            RowClassifier::new(mapping(), options(MatchStrategy::ByName, true, true), SIG);
        assert_eq!(
            by_name.classify(&row("Иванов", "", ""), &index),
            RowClassification::WillCreate
        );
    }

    #[test]
    fn test_creation_disabled_falls_to_skip() {
        let index = MatchIndex::build(&[], SIG);
        let mut clf =
            RowClassifier::new(mapping(), options(MatchStrategy::ByEmail, false, true), SIG);
        assert_eq!(
            clf.classify(&row("X", "x@mail.ru", ""), &index),
            RowClassification::WillSkip(SkipReason::CreationDisabled)
        );
    }

    #[test]
    fn test_duplicate_in_upload_skipped() {
        let index = MatchIndex::build(&[], SIG);
        let mut clf =
            RowClassifier::new(mapping(), options(MatchStrategy::ByEmail, true, true), SIG);

        assert_eq!(
            clf.classify(&row("A", "same@mail.ru", ""), &index),
            RowClassification::WillCreate
        );
        assert_eq!(
            clf.classify(&row("B", "Same@mail.ru", ""), &index),
            RowClassification::WillSkip(SkipReason::DuplicateInUpload)
        );
    }

    #[test]
    fn test_duplicate_processed_when_skip_disabled() {
        let index = MatchIndex::build(&[], SIG);
        let mut clf =
            RowClassifier::new(mapping(), options(MatchStrategy::ByEmail, true, false), SIG);

        assert_eq!(
            clf.classify(&row("A", "same@mail.ru", ""), &index),
            RowClassification::WillCreate
        );
        // Вторая строка все равно обрабатывается — как совпадение
        assert_eq!(
            clf.classify(&row("B", "same@mail.ru", ""), &index),
            RowClassification::WillMatch { student: None }
        );
    }

    #[test]
    fn test_preview_scenario_three_distinct_emails() {
        // Сценарий: 3 строки с разными e-mail, пустая база
        let t = table(vec![
            row("A", "a@mail.ru", ""),
            row("B", "b@mail.ru", ""),
            row("C", "c@mail.ru", ""),
        ]);
        let stats = preview(
            &t,
            &mapping(),
            &options(MatchStrategy::ByEmail, true, true),
            &[],
            SIG,
        );
        assert_eq!(
            stats,
            MatchingStats {
                will_match: 0,
                will_create: 3,
                will_skip: 0
            }
        );
    }

    #[test]
    fn test_preview_scenario_duplicate_email() {
        // Сценарий: 2 строки с одним e-mail, skip_duplicates=true
        let t = table(vec![
            row("A", "same@mail.ru", ""),
            row("B", "SAME@mail.ru", ""),
        ]);
        let stats = preview(
            &t,
            &mapping(),
            &options(MatchStrategy::ByEmail, true, true),
            &[],
            SIG,
        );
        assert_eq!(
            stats,
            MatchingStats {
                will_match: 0,
                will_create: 1,
                will_skip: 1
            }
        );
    }

    #[test]
    fn test_preview_is_repeatable() {
        let t = table(vec![row("A", "a@mail.ru", ""), row("B", "a@mail.ru", "")]);
        let existing = vec![student("A", "a@mail.ru", "")];
        let opts = options(MatchStrategy::ByEmail, true, true);

        let first = preview(&t, &mapping(), &opts, &existing, SIG);
        let second = preview(&t, &mapping(), &opts, &existing, SIG);
        assert_eq!(first, second);
        assert_eq!(
            first,
            MatchingStats {
                will_match: 1,
                will_create: 0,
                will_skip: 1
            }
        );
    }
}
