//! Table structure extraction and validation.
//!
//! Turns raw tabular input (markdown, JSON mappings, or 2D string lists)
//! into the canonical `TableStructure`. Rows whose arity does not match the
//! header arity are dropped, never padded. Input that cannot be parsed at
//! all is preserved as raw text rather than discarded.

use std::sync::LazyLock;

use crate::types::TableStructure;

static PLAIN_NUMBER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^-?\d{1,3}(,\d{3})*(\.\d+)?$|^-?\d+(\.\d+)?$")
        .expect("plain number regex is valid")
});

static CURRENCY_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\$\s?\d{1,3}(,\d{3})*(\.\d+)?$").expect("currency regex is valid")
});

static PERCENT_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\d+(\.\d+)?\s?%$").expect("percent regex is valid")
});

static UNIT_VALUE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)^\d+(\.\d+)?\s?(km|cents?|days?|hours?)$")
        .expect("unit value regex is valid")
});

/// Regex for pulling numeric values (plain, currency, percent) out of
/// free text. Shared with the ranker's numeric-presence check.
static EMBEDDED_VALUE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\s?\d{1,3}(,\d{3})*(\.\d+)?|\d+(\.\d+)?\s?%|\b\d+(\.\d+)?\b")
        .expect("embedded value regex is valid")
});

static SEPARATOR_ROW_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\s*\|?[\s:|\-]+\|?\s*$").expect("separator row regex is valid")
});

/// Raw tabular input shapes accepted by the extractor.
#[derive(Debug, Clone)]
pub enum RawTable<'a> {
    Markdown(&'a str),
    Json(&'a serde_json::Value),
    Cells(Vec<Vec<String>>),
}

/// Extraction outcome. Unparseable content is never dropped; it comes back
/// as `Raw` so the caller can index it as plain text.
#[derive(Debug, Clone)]
pub enum Extracted {
    Structured(TableStructure),
    Raw(String),
}

/// One slice of a large table after row-group splitting. Headers are
/// replicated into every part; all parts after the first are continuations.
#[derive(Debug, Clone)]
pub struct TableSlice {
    pub structure: TableStructure,
    pub title: Option<String>,
    pub is_continuation: bool,
    pub part: usize,
    pub total_parts: usize,
}

/// Header-indicator vocabulary used by the header detection heuristic.
pub struct TableExtractor {
    header_indicators: Vec<String>,
}

impl Default for TableExtractor {
    fn default() -> Self {
        Self {
            header_indicators: crate::config::VocabularyConfig::default().header_indicators,
        }
    }
}

impl TableExtractor {
    pub fn new(header_indicators: Vec<String>) -> Self {
        Self { header_indicators }
    }

    /// Parse and validate raw tabular input into the canonical model.
    pub fn validate_table_structure(&self, raw: RawTable<'_>) -> Extracted {
        match raw {
            RawTable::Markdown(text) => self.from_markdown(text),
            RawTable::Json(value) => self.from_json(value),
            RawTable::Cells(cells) => self.from_cells(cells),
        }
    }

    fn from_markdown(&self, text: &str) -> Extracted {
        let mut cells: Vec<Vec<String>> = Vec::new();
        let mut title: Option<String> = None;

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !trimmed.contains('|') {
                // A leading non-pipe line is treated as the table title.
                if cells.is_empty() && title.is_none() {
                    title = Some(trimmed.trim_start_matches('#').trim().to_string());
                }
                continue;
            }
            if SEPARATOR_ROW_RE.is_match(trimmed) {
                continue;
            }
            let row: Vec<String> = trimmed
                .trim_matches('|')
                .split('|')
                .map(|c| c.trim().to_string())
                .collect();
            if row.iter().any(|c| !c.is_empty()) {
                cells.push(row);
            }
        }

        if cells.len() < 2 {
            // No delimiter rows found: preserve the content untouched.
            return Extracted::Raw(text.to_string());
        }

        match self.from_cells(cells) {
            Extracted::Structured(mut table) => {
                table.title = title;
                Extracted::Structured(table)
            }
            raw => raw,
        }
    }

    fn from_json(&self, value: &serde_json::Value) -> Extracted {
        match value {
            serde_json::Value::Object(map) => {
                let rows: Vec<Vec<String>> = map
                    .iter()
                    .map(|(k, v)| vec![k.clone(), json_scalar(v)])
                    .collect();
                if rows.is_empty() {
                    return Extracted::Raw(value.to_string());
                }
                Extracted::Structured(TableStructure::new(
                    vec!["Key".to_string(), "Value".to_string()],
                    rows,
                ))
            }
            serde_json::Value::Array(items) => {
                let mut headers: Vec<String> = Vec::new();
                for item in items {
                    if let serde_json::Value::Object(map) = item {
                        for key in map.keys() {
                            if !headers.contains(key) {
                                headers.push(key.clone());
                            }
                        }
                    }
                }
                if headers.is_empty() {
                    return Extracted::Raw(value.to_string());
                }
                let rows: Vec<Vec<String>> = items
                    .iter()
                    .filter_map(|item| item.as_object())
                    .map(|map| {
                        headers
                            .iter()
                            .map(|h| map.get(h).map(json_scalar).unwrap_or_default())
                            .collect()
                    })
                    .collect();
                Extracted::Structured(TableStructure::new(headers, rows))
            }
            _ => Extracted::Raw(value.to_string()),
        }
    }

    /// Validate a raw 2D grid: detect headers, enforce arity, drop
    /// malformed rows.
    fn from_cells(&self, mut cells: Vec<Vec<String>>) -> Extracted {
        cells.retain(|row| !row.is_empty());
        if cells.is_empty() {
            return Extracted::Raw(String::new());
        }

        let columns = cells[0].len();
        let has_headers = self.first_row_is_header(&cells);

        let (headers, data_start) = if has_headers {
            (cells[0].clone(), 1)
        } else {
            let generated = (1..=columns).map(|i| format!("column_{}", i)).collect();
            (generated, 0)
        };

        let rows: Vec<Vec<String>> = cells
            .into_iter()
            .skip(data_start)
            .filter(|row| row.len() == columns)
            .collect();

        Extracted::Structured(TableStructure::new(headers, rows))
    }

    /// Score the first row: +2 per cell containing a header-indicator word,
    /// +1 per non-numeric cell, +3 if the second row is majority-numeric.
    /// Headers are accepted when the score reaches the column count. An
    /// all-numeric first row is never a header, whatever the second row
    /// looks like.
    fn first_row_is_header(&self, cells: &[Vec<String>]) -> bool {
        let first = &cells[0];
        if first.iter().all(|c| is_numeric_value(c)) {
            return false;
        }
        let columns = first.len();
        let mut score = 0usize;

        for cell in first {
            let lower = cell.to_lowercase();
            if self
                .header_indicators
                .iter()
                .any(|ind| lower.contains(ind.as_str()))
            {
                score += 2;
            }
            if !is_numeric_value(cell) {
                score += 1;
            }
        }

        if let Some(second) = cells.get(1) {
            let numeric = second.iter().filter(|c| is_numeric_value(c)).count();
            if numeric * 2 > second.len() {
                score += 3;
            }
        }

        score >= columns
    }
}

/// Split a table into row groups of at most `max_rows`, replicating headers
/// into every slice. All but the first slice are marked as continuations
/// and get a "(continued - part K)" title suffix.
pub fn chunk_table(table: &TableStructure, max_rows: usize) -> Vec<TableSlice> {
    let max_rows = max_rows.max(1);
    let total_parts = table.rows.len().div_ceil(max_rows).max(1);
    let base_title = table.title.clone();

    table
        .rows
        .chunks(max_rows)
        .enumerate()
        .map(|(i, group)| {
            let part = i + 1;
            let title = if part == 1 {
                base_title.clone()
            } else {
                let base = base_title.as_deref().unwrap_or("Table");
                Some(format!("{} (continued - part {})", base, part))
            };
            let mut structure = TableStructure::new(table.headers.clone(), group.to_vec());
            structure.title = title.clone();
            TableSlice {
                structure,
                title,
                is_continuation: part > 1,
                part,
                total_parts,
            }
        })
        .collect()
}

/// Render a table back to canonical markdown with a separator row.
pub fn to_markdown(table: &TableStructure) -> String {
    let mut out = String::new();
    if let Some(title) = &table.title {
        out.push_str(title);
        out.push('\n');
    }
    out.push_str(&format!("| {} |\n", table.headers.join(" | ")));
    out.push_str(&format!(
        "| {} |\n",
        table
            .headers
            .iter()
            .map(|_| "---")
            .collect::<Vec<_>>()
            .join(" | ")
    ));
    for row in &table.rows {
        out.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    for note in &table.footnotes {
        out.push_str(note);
        out.push('\n');
    }
    out.trim_end().to_string()
}

/// Render a two-column table as "key: value" lines. Falls back to markdown
/// when the table has a different shape.
pub fn to_key_value(table: &TableStructure) -> String {
    if table.headers.len() != 2 {
        return to_markdown(table);
    }
    let mut out = String::new();
    if let Some(title) = &table.title {
        out.push_str(title);
        out.push('\n');
    }
    for row in &table.rows {
        out.push_str(&format!("{}: {}\n", row[0], row[1]));
    }
    out.trim_end().to_string()
}

/// Whether a single cell holds a recognizable numeric value: plain number,
/// currency, percentage, or unit-suffixed quantity.
pub fn is_numeric_value(cell: &str) -> bool {
    let cell = cell.trim();
    !cell.is_empty()
        && (PLAIN_NUMBER_RE.is_match(cell)
            || CURRENCY_RE.is_match(cell)
            || PERCENT_RE.is_match(cell)
            || UNIT_VALUE_RE.is_match(cell))
}

/// Whether free text contains any extractable numeric value.
pub fn contains_numeric_value(text: &str) -> bool {
    EMBEDDED_VALUE_RE.is_match(text)
}

/// Count dollar amounts appearing in free text.
pub fn count_dollar_amounts(text: &str) -> usize {
    EMBEDDED_VALUE_RE
        .find_iter(text)
        .filter(|m| m.as_str().starts_with('$'))
        .count()
}

fn json_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> TableExtractor {
        TableExtractor::default()
    }

    #[test]
    fn test_markdown_round_trip_arity() {
        let md = "\
Meal Rates
| Location | Breakfast | Dinner |
|---|---|---|
| Ottawa | $25.65 | $61.45 |
| Yukon | $28.10 | $65.10 |
| malformed row without enough cells |
| Halifax | $24.90 | $59.80 |";

        match extractor().validate_table_structure(RawTable::Markdown(md)) {
            Extracted::Structured(table) => {
                assert_eq!(table.headers.len(), 3);
                assert_eq!(table.rows.len(), 3);
                assert!(table.rows.iter().all(|r| r.len() == 3));
                assert_eq!(table.title.as_deref(), Some("Meal Rates"));
            }
            Extracted::Raw(_) => panic!("well-formed table should parse"),
        }
    }

    #[test]
    fn test_unparseable_falls_back_to_raw() {
        let text = "no delimiters here at all, just prose";
        match extractor().validate_table_structure(RawTable::Markdown(text)) {
            Extracted::Raw(raw) => assert_eq!(raw, text),
            Extracted::Structured(_) => panic!("prose must not parse as a table"),
        }
    }

    #[test]
    fn test_header_detection_with_numeric_second_row() {
        let cells = vec![
            vec!["Level".to_string(), "Rate".to_string()],
            vec!["3".to_string(), "400".to_string()],
        ];
        match extractor().validate_table_structure(RawTable::Cells(cells)) {
            Extracted::Structured(table) => {
                assert_eq!(table.headers, vec!["Level", "Rate"]);
                assert_eq!(table.rows.len(), 1);
            }
            Extracted::Raw(_) => panic!("cells should parse"),
        }
    }

    #[test]
    fn test_headerless_data_gets_generated_columns() {
        let cells = vec![
            vec!["12".to_string(), "34".to_string()],
            vec!["56".to_string(), "78".to_string()],
        ];
        match extractor().validate_table_structure(RawTable::Cells(cells)) {
            Extracted::Structured(table) => {
                assert_eq!(table.headers, vec!["column_1", "column_2"]);
                assert_eq!(table.rows.len(), 2);
            }
            Extracted::Raw(_) => panic!("cells should parse"),
        }
    }

    #[test]
    fn test_json_object_becomes_key_value_table() {
        let value = serde_json::json!({"breakfast": "$25.65", "dinner": "$61.45"});
        match extractor().validate_table_structure(RawTable::Json(&value)) {
            Extracted::Structured(table) => {
                assert_eq!(table.headers, vec!["Key", "Value"]);
                assert_eq!(table.rows.len(), 2);
            }
            Extracted::Raw(_) => panic!("object should parse"),
        }
    }

    #[test]
    fn test_json_array_of_objects() {
        let value = serde_json::json!([
            {"level": 1, "rate": "$200"},
            {"level": 2, "rate": "$300"},
        ]);
        match extractor().validate_table_structure(RawTable::Json(&value)) {
            Extracted::Structured(table) => {
                assert_eq!(table.headers.len(), 2);
                assert_eq!(table.rows.len(), 2);
            }
            Extracted::Raw(_) => panic!("array of objects should parse"),
        }
    }

    #[test]
    fn test_large_table_chunking_replicates_headers() {
        let rows: Vec<Vec<String>> = (0..45)
            .map(|i| vec![i.to_string(), format!("${}.00", i)])
            .collect();
        let mut table = TableStructure::new(
            vec!["Level".to_string(), "Rate".to_string()],
            rows,
        );
        table.title = Some("Hardship Allowance".to_string());

        let slices = chunk_table(&table, 20);
        assert_eq!(slices.len(), 3);
        assert!(slices.iter().all(|s| s.structure.headers.len() == 2));
        assert!(!slices[0].is_continuation);
        assert!(slices[1].is_continuation);
        assert!(slices[1]
            .title
            .as_deref()
            .unwrap()
            .contains("(continued - part 2)"));
        let total: usize = slices.iter().map(|s| s.structure.rows.len()).sum();
        assert_eq!(total, 45);
    }

    #[test]
    fn test_table_round_trip_through_markdown() {
        let table = TableStructure::new(
            vec!["Level".to_string(), "Rate".to_string()],
            vec![
                vec!["3".to_string(), "$400".to_string()],
                vec!["4".to_string(), "$550".to_string()],
            ],
        );
        let md = to_markdown(&table);
        match extractor().validate_table_structure(RawTable::Markdown(&md)) {
            Extracted::Structured(parsed) => {
                assert_eq!(parsed.headers, table.headers);
                assert_eq!(parsed.rows, table.rows);
            }
            Extracted::Raw(_) => panic!("rendered markdown should parse back"),
        }
    }

    #[test]
    fn test_numeric_recognition() {
        assert!(is_numeric_value("1,234.56"));
        assert!(is_numeric_value("$1,234.56"));
        assert!(is_numeric_value("42%"));
        assert!(is_numeric_value("16 km"));
        assert!(is_numeric_value("55 cents"));
        assert!(is_numeric_value("3 days"));
        assert!(!is_numeric_value("Ottawa"));
        assert!(!is_numeric_value(""));
    }

    #[test]
    fn test_dollar_counting() {
        let text = "Breakfast is $25.65, lunch is $22.50 and dinner is $61.45.";
        assert_eq!(count_dollar_amounts(text), 3);
        assert!(contains_numeric_value(text));
        assert!(!contains_numeric_value("no values here"));
    }
}
