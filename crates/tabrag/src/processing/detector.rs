//! Structured-content detection.
//!
//! Scans raw text for pipe-delimited table regions and fenced code blocks.
//! A single pipe-containing line is never a table; a region needs at least
//! two data-bearing pipe lines (header + data). Separator lines are
//! recognized as part of a region but never counted as data rows.

use std::sync::LazyLock;

static CODE_FENCE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?s)```.*?```").expect("code fence regex is valid")
});

static PIPE_LINE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\|.*\|").expect("pipe line regex is valid"));

static SEPARATOR_LINE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\s*\|?[\s:|\-]+\|?\s*$").expect("separator regex is valid")
});

/// Best-effort table category, resolved in priority order on first match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    HardshipAllowance,
    RatesTable,
    GeneralTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Table(TableKind),
    Code,
}

/// A detected span of structured content, as byte offsets into the input.
#[derive(Debug, Clone)]
pub struct ContentRegion {
    pub start: usize,
    pub end: usize,
    pub kind: RegionKind,
}

#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub regions: Vec<ContentRegion>,
}

impl Detection {
    pub fn has_structured_content(&self) -> bool {
        !self.regions.is_empty()
    }

    pub fn table_regions(&self) -> impl Iterator<Item = &ContentRegion> {
        self.regions
            .iter()
            .filter(|r| matches!(r.kind, RegionKind::Table(_)))
    }
}

pub struct ContentDetector {
    table_keywords: TableKeywords,
}

struct TableKeywords {
    hardship: Vec<String>,
    rates: Vec<String>,
}

impl Default for ContentDetector {
    fn default() -> Self {
        Self {
            table_keywords: TableKeywords {
                hardship: vec!["hardship".into(), "level".into()],
                rates: vec!["rate".into(), "amount".into(), "cost".into()],
            },
        }
    }
}

impl ContentDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect code fences and table regions. Code fences are found first;
    /// lines inside them are excluded from table candidacy, so the two
    /// region kinds never overlap.
    pub fn detect(&self, text: &str) -> Detection {
        let mut regions: Vec<ContentRegion> = Vec::new();

        for m in CODE_FENCE_RE.find_iter(text) {
            regions.push(ContentRegion {
                start: m.start(),
                end: m.end(),
                kind: RegionKind::Code,
            });
        }
        let code_spans: Vec<(usize, usize)> =
            regions.iter().map(|r| (r.start, r.end)).collect();

        let in_code =
            |offset: usize| code_spans.iter().any(|&(s, e)| offset >= s && offset < e);

        // Accumulate runs of candidate pipe lines, tolerating a single
        // blank line between them.
        let mut run_start: Option<usize> = None;
        let mut run_end = 0usize;
        let mut data_lines = 0usize;
        let mut blank_gap = 0usize;
        let mut offset = 0usize;

        let flush =
            |start: Option<usize>, end: usize, data: usize, regions: &mut Vec<ContentRegion>| {
                if let Some(s) = start {
                    if data >= 2 {
                        let kind = self.identify_table(&text[s..end]);
                        regions.push(ContentRegion {
                            start: s,
                            end,
                            kind: RegionKind::Table(kind),
                        });
                    }
                }
            };

        for line in text.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();
            let trimmed = line.trim_end_matches('\n');

            if in_code(line_start) {
                flush(run_start.take(), run_end, data_lines, &mut regions);
                data_lines = 0;
                blank_gap = 0;
                continue;
            }

            let is_candidate = PIPE_LINE_RE.is_match(trimmed);
            let is_separator = is_candidate && SEPARATOR_LINE_RE.is_match(trimmed);
            let is_blank = trimmed.trim().is_empty();

            if is_candidate {
                if run_start.is_none() {
                    run_start = Some(line_start);
                }
                run_end = line_start + trimmed.len();
                if !is_separator {
                    data_lines += 1;
                }
                blank_gap = 0;
            } else if is_blank && run_start.is_some() && blank_gap == 0 {
                // Near-consecutive: tolerate one blank line inside a run.
                blank_gap = 1;
            } else {
                flush(run_start.take(), run_end, data_lines, &mut regions);
                data_lines = 0;
                blank_gap = 0;
            }
        }
        flush(run_start.take(), run_end, data_lines, &mut regions);

        regions.sort_by_key(|r| r.start);
        Detection { regions }
    }

    /// Keyword heuristic over the region body. First matching category in
    /// priority order wins; correctness is best-effort.
    fn identify_table(&self, body: &str) -> TableKind {
        let lower = body.to_lowercase();
        if self
            .table_keywords
            .hardship
            .iter()
            .all(|kw| lower.contains(kw.as_str()))
        {
            return TableKind::HardshipAllowance;
        }
        if self
            .table_keywords
            .rates
            .iter()
            .any(|kw| lower.contains(kw.as_str()))
        {
            return TableKind::RatesTable;
        }
        TableKind::GeneralTable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_pipe_line_is_not_a_table() {
        let detector = ContentDetector::new();
        let detection = detector.detect("some text with | a pipe | in it\nplain prose follows\n");
        assert!(!detection.has_structured_content());
    }

    #[test]
    fn test_two_pipe_lines_form_a_table() {
        let detector = ContentDetector::new();
        let text = "| Name | Value |\n| a | 1 |\n";
        let detection = detector.detect(text);
        assert_eq!(detection.table_regions().count(), 1);
    }

    #[test]
    fn test_separator_not_counted_as_data() {
        let detector = ContentDetector::new();
        // Header + separator only: one data line, not a table.
        let text = "| Name | Value |\n|---|---|\n";
        let detection = detector.detect(text);
        assert_eq!(detection.table_regions().count(), 0);

        // Header + separator + one data row: table.
        let text = "| Name | Value |\n|---|---|\n| a | 1 |\n";
        let detection = detector.detect(text);
        assert_eq!(detection.table_regions().count(), 1);
    }

    #[test]
    fn test_code_fence_detected_and_not_a_table() {
        let detector = ContentDetector::new();
        let text = "intro\n```\n| looks | tabular |\n| but | code |\n```\ntail\n";
        let detection = detector.detect(text);
        let code_count = detection
            .regions
            .iter()
            .filter(|r| r.kind == RegionKind::Code)
            .count();
        assert_eq!(code_count, 1);
        assert_eq!(detection.table_regions().count(), 0);
    }

    #[test]
    fn test_hardship_table_identified() {
        let detector = ContentDetector::new();
        let text = "| Hardship Level | Monthly Rate |\n|---|---|\n| 3 | $400 |\n";
        let detection = detector.detect(text);
        let region = detection.table_regions().next().unwrap();
        assert_eq!(region.kind, RegionKind::Table(TableKind::HardshipAllowance));
    }

    #[test]
    fn test_rates_table_identified() {
        let detector = ContentDetector::new();
        let text = "| City | Daily Amount |\n| Ottawa | $95.00 |\n";
        let detection = detector.detect(text);
        let region = detection.table_regions().next().unwrap();
        assert_eq!(region.kind, RegionKind::Table(TableKind::RatesTable));
    }

    #[test]
    fn test_table_separated_by_blank_line_stays_one_region() {
        let detector = ContentDetector::new();
        let text = "| a | b |\n\n| c | d |\n";
        let detection = detector.detect(text);
        assert_eq!(detection.table_regions().count(), 1);
    }

    #[test]
    fn test_two_distinct_tables() {
        let detector = ContentDetector::new();
        let text = "| a | b |\n| c | d |\n\nprose in between here\n\n| e | f |\n| g | h |\n";
        let detection = detector.detect(text);
        assert_eq!(detection.table_regions().count(), 2);
    }
}
