use super::error::ParseError;
use calamine::{DataType, Reader as CalamineReader, Xlsx};
use contracts::usecases::u101_import_contacts::UploadedTable;
use std::collections::HashMap;
use std::io::Cursor;

/// Подсказка формата от вызывающей стороны (обычно по расширению файла)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    Delimited,
    Spreadsheet,
}

/// Результат разбора: таблица плюс предупреждения, не являющиеся ошибками
#[derive(Debug, Clone)]
pub struct ParsedTable {
    pub table: UploadedTable,
    /// Строк, обрезанных до ширины заголовка
    pub truncated_rows: i32,
}

// Сигнатура zip-контейнера (xlsx)
const XLSX_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Разобрать загруженный файл в таблицу.
///
/// Формат определяется по подсказке, а при ее отсутствии — по сигнатуре
/// контейнера. Первая непустая строка становится заголовком; короткие
/// строки дополняются пустыми значениями, длинные обрезаются с
/// предупреждением, пустой хвост отбрасывается.
pub fn parse_upload(
    bytes: &[u8],
    hint: Option<FormatHint>,
    max_rows: usize,
) -> Result<ParsedTable, ParseError> {
    let is_spreadsheet = match hint {
        Some(FormatHint::Spreadsheet) => true,
        Some(FormatHint::Delimited) => false,
        None => bytes.len() >= 4 && bytes[..4] == XLSX_MAGIC,
    };

    let raw_rows = if is_spreadsheet {
        read_workbook(bytes)?
    } else {
        read_delimited(bytes)?
    };

    build_table(raw_rows, max_rows)
}

/// Первый лист xlsx-книги -> строки ячеек как строки
fn read_workbook(bytes: &[u8]) -> Result<Vec<Vec<String>>, ParseError> {
    let cursor = Cursor::new(bytes);
    let mut workbook =
        Xlsx::new(cursor).map_err(|e| ParseError::Malformed(format!("bad workbook: {}", e)))?;

    let sheet_names: Vec<String> = workbook.sheet_names().clone();
    let first_sheet = sheet_names.first().ok_or(ParseError::Empty)?;

    let range = match workbook.worksheet_range(first_sheet) {
        Some(Ok(range)) => range,
        Some(Err(e)) => return Err(ParseError::Malformed(format!("bad worksheet: {}", e))),
        None => return Err(ParseError::Empty),
    };

    let mut rows = Vec::with_capacity(range.height());
    for row in range.rows() {
        let cells: Vec<String> = row.iter().map(cell_to_string).collect();
        rows.push(cells);
    }
    Ok(rows)
}

fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.trim().to_string(),
        // Целые значения без десятичного хвоста: телефоны и коды Excel
        // хранит как float
        DataType::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => {
            format!("{:.0}", v)
        }
        DataType::Float(v) => v.to_string(),
        DataType::Int(v) => v.to_string(),
        DataType::Bool(b) => b.to_string(),
        DataType::DateTime(v) => v.to_string(),
        DataType::DateTimeIso(s) => s.clone(),
        DataType::Duration(v) => v.to_string(),
        DataType::DurationIso(s) => s.clone(),
        DataType::Error(e) => format!("#{:?}", e),
        DataType::Empty => String::new(),
    }
}

/// Текст с разделителями -> строки полей
fn read_delimited(bytes: &[u8]) -> Result<Vec<Vec<String>>, ParseError> {
    let text = String::from_utf8_lossy(bytes);
    // Strip UTF-8 BOM if present
    let text = text.trim_start_matches('\u{FEFF}');

    let delimiter = sniff_delimiter(text);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ParseError::Malformed(e.to_string()))?;
        rows.push(record.iter().map(|v| v.trim().to_string()).collect());
    }
    Ok(rows)
}

/// Выбрать разделитель по первой непустой строке: `;`, табуляция или запятая
fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let candidates: [(u8, usize); 3] = [
        (b';', first_line.matches(';').count()),
        (b'\t', first_line.matches('\t').count()),
        (b',', first_line.matches(',').count()),
    ];
    candidates
        .iter()
        .max_by_key(|(_, count)| *count)
        .filter(|(_, count)| *count > 0)
        .map(|(d, _)| *d)
        .unwrap_or(b',')
}

/// Собрать таблицу: заголовок, выравнивание ширины строк, потолок размера
fn build_table(raw_rows: Vec<Vec<String>>, max_rows: usize) -> Result<ParsedTable, ParseError> {
    let mut iter = raw_rows.into_iter();

    // Заголовок — первая строка с хотя бы одной непустой ячейкой
    let header_cells = iter
        .by_ref()
        .find(|row| row.iter().any(|c| !c.is_empty()))
        .ok_or(ParseError::Empty)?;
    let headers = unique_headers(header_cells);

    let mut data_rows: Vec<Vec<String>> = iter.collect();

    // Пустой хвост отбрасывается
    while data_rows
        .last()
        .map(|row| row.iter().all(|c| c.is_empty()))
        .unwrap_or(false)
    {
        data_rows.pop();
    }

    if data_rows.len() > max_rows {
        return Err(ParseError::TooLarge { limit: max_rows });
    }

    let mut truncated_rows = 0;
    let mut rows = Vec::with_capacity(data_rows.len());
    for mut cells in data_rows {
        if cells.len() > headers.len() {
            cells.truncate(headers.len());
            truncated_rows += 1;
        }
        // Короткие строки дополняются пустыми значениями
        cells.resize(headers.len(), String::new());

        let row: HashMap<String, String> = headers.iter().cloned().zip(cells).collect();
        rows.push(row);
    }

    if truncated_rows > 0 {
        tracing::warn!(
            "{} row(s) were wider than the header and got truncated",
            truncated_rows
        );
    }

    Ok(ParsedTable {
        table: UploadedTable { headers, rows },
        truncated_rows,
    })
}

/// Нормализовать заголовки: пустым дать имя по номеру, дубликаты различить
/// суффиксом (ключи строк — имена колонок, им нужна уникальность)
fn unique_headers(cells: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    cells
        .into_iter()
        .enumerate()
        .map(|(i, cell)| {
            let base = if cell.is_empty() {
                format!("column_{}", i + 1)
            } else {
                cell
            };
            let n = seen.entry(base.clone()).or_insert(0);
            *n += 1;
            if *n == 1 {
                base
            } else {
                format!("{}_{}", base, n)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_comma_csv() {
        let data = b"name,email,phone\nIvanov,ivanov@mail.ru,+79001234567\n";
        let parsed = parse_upload(data, None, 1000).unwrap();
        assert_eq!(parsed.table.headers, vec!["name", "email", "phone"]);
        assert_eq!(parsed.table.rows.len(), 1);
        assert_eq!(parsed.table.rows[0]["email"], "ivanov@mail.ru");
    }

    #[test]
    fn test_sniffs_semicolon_delimiter() {
        let data = "\u{FEFF}ФИО;Телефон\nИванов Иван;+7 900 123-45-67\n".as_bytes();
        let parsed = parse_upload(data, None, 1000).unwrap();
        assert_eq!(parsed.table.headers, vec!["ФИО", "Телефон"]);
        assert_eq!(parsed.table.rows[0]["Телефон"], "+7 900 123-45-67");
    }

    #[test]
    fn test_sniffs_tab_delimiter() {
        let data = b"name\temail\nIvanov\tivanov@mail.ru\n";
        let parsed = parse_upload(data, None, 1000).unwrap();
        assert_eq!(parsed.table.headers, vec!["name", "email"]);
    }

    #[test]
    fn test_pads_short_rows_and_truncates_long_ones() {
        let data = b"name,email\nIvanov\nPetrov,petrov@mail.ru,extra\n";
        let parsed = parse_upload(data, None, 1000).unwrap();
        assert_eq!(parsed.table.rows[0]["email"], "");
        assert_eq!(parsed.table.rows[1]["email"], "petrov@mail.ru");
        assert_eq!(parsed.truncated_rows, 1);
    }

    #[test]
    fn test_drops_trailing_empty_rows() {
        let data = b"name,email\nIvanov,ivanov@mail.ru\n,\n,\n";
        let parsed = parse_upload(data, None, 1000).unwrap();
        assert_eq!(parsed.table.rows.len(), 1);
    }

    #[test]
    fn test_header_is_first_non_empty_row() {
        let data = b",\nname,email\nIvanov,ivanov@mail.ru\n";
        let parsed = parse_upload(data, None, 1000).unwrap();
        assert_eq!(parsed.table.headers, vec!["name", "email"]);
        assert_eq!(parsed.table.rows.len(), 1);
    }

    #[test]
    fn test_empty_input_fails() {
        let err = parse_upload(b"", None, 1000).unwrap_err();
        assert!(matches!(err, ParseError::Empty));

        let err = parse_upload(b"\n\n,\n", None, 1000).unwrap_err();
        assert!(matches!(err, ParseError::Empty));
    }

    #[test]
    fn test_row_ceiling() {
        let mut data = String::from("name\n");
        for i in 0..11 {
            data.push_str(&format!("student {}\n", i));
        }
        let err = parse_upload(data.as_bytes(), None, 10).unwrap_err();
        assert!(matches!(err, ParseError::TooLarge { limit: 10 }));
    }

    #[test]
    fn test_duplicate_headers_get_suffixes() {
        let data = b"name,name,\nIvanov,Petrov,x\n";
        let parsed = parse_upload(data, None, 1000).unwrap();
        assert_eq!(parsed.table.headers, vec!["name", "name_2", "column_3"]);
        assert_eq!(parsed.table.rows[0]["name_2"], "Petrov");
    }
}
