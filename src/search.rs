use crate::errors::GatewayError;
use crate::model::MatchCandidate;
use crate::tools::param_enums::NeighborDirection;
use crate::utils::{levenshtein_distance, stable_content_id};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static A1_RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$?([A-Za-z]{1,3})\$?(\d+)(?::\$?([A-Za-z]{1,3})\$?(\d+))?$").unwrap());

/// Inclusive rectangular range in 1-based spreadsheet coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct A1Range {
    pub start_col: u32,
    pub start_row: u32,
    pub end_col: u32,
    pub end_row: u32,
}

impl A1Range {
    pub fn parse(address: &str) -> Result<Self, GatewayError> {
        let captures = A1_RANGE_RE.captures(address.trim()).ok_or_else(|| {
            GatewayError::validation(format!(
                "invalid range '{address}': expected A1 notation like B2 or A1:C10"
            ))
        })?;

        let start_col = col_from_letters(&captures[1]).ok_or_else(|| {
            GatewayError::validation(format!("invalid column in range '{address}'"))
        })?;
        let start_row: u32 = captures[2]
            .parse()
            .map_err(|_| GatewayError::validation(format!("invalid row in range '{address}'")))?;

        let (end_col, end_row) = match (captures.get(3), captures.get(4)) {
            (Some(col), Some(row)) => {
                let end_col = col_from_letters(col.as_str()).ok_or_else(|| {
                    GatewayError::validation(format!("invalid column in range '{address}'"))
                })?;
                let end_row: u32 = row.as_str().parse().map_err(|_| {
                    GatewayError::validation(format!("invalid row in range '{address}'"))
                })?;
                (end_col, end_row)
            }
            _ => (start_col, start_row),
        };

        if start_row == 0 || end_row == 0 {
            return Err(GatewayError::validation(format!(
                "invalid range '{address}': rows are 1-based"
            )));
        }
        if end_col < start_col || end_row < start_row {
            return Err(GatewayError::validation(format!(
                "invalid range '{address}': end before start"
            )));
        }

        Ok(Self {
            start_col,
            start_row,
            end_col,
            end_row,
        })
    }

    pub fn width(&self) -> usize {
        (self.end_col - self.start_col + 1) as usize
    }

    pub fn height(&self) -> usize {
        (self.end_row - self.start_row + 1) as usize
    }

    pub fn to_a1(&self) -> String {
        if self.start_col == self.end_col && self.start_row == self.end_row {
            cell_a1(self.start_col, self.start_row)
        } else {
            format!(
                "{}:{}",
                cell_a1(self.start_col, self.start_row),
                cell_a1(self.end_col, self.end_row)
            )
        }
    }
}

pub fn col_from_letters(letters: &str) -> Option<u32> {
    let mut col = 0u32;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    Some(col)
}

pub fn col_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        letters.push(b'A' + rem);
        col = (col - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).expect("ascii column letters")
}

pub fn cell_a1(col: u32, row: u32) -> String {
    format!("{}{}", col_letters(col), row)
}

/// A cell value rendered the way a user would type it in a search box.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                int.to_string()
            } else {
                n.to_string()
            }
        }
        other => other.to_string(),
    }
}

/// One worksheet's fetched cells, anchored at the range origin.
#[derive(Debug, Clone)]
pub struct SheetGrid {
    pub sheet: String,
    pub origin_col: u32,
    pub origin_row: u32,
    pub values: Vec<Vec<Value>>,
}

impl SheetGrid {
    pub fn new(sheet: impl Into<String>, origin: A1Range, values: Vec<Vec<Value>>) -> Self {
        Self {
            sheet: sheet.into(),
            origin_col: origin.start_col,
            origin_row: origin.start_row,
            values,
        }
    }

    /// Build from a Graph range payload; a missing address means A1 origin.
    pub fn from_range(sheet: impl Into<String>, local_address: Option<&str>, values: Vec<Vec<Value>>) -> Self {
        let origin = local_address
            .and_then(|addr| A1Range::parse(addr).ok())
            .unwrap_or(A1Range {
                start_col: 1,
                start_row: 1,
                end_col: 1,
                end_row: 1,
            });
        Self::new(sheet, origin, values)
    }

    pub fn text_at(&self, col: u32, row: u32) -> Option<String> {
        if col < self.origin_col || row < self.origin_row {
            return None;
        }
        let r = (row - self.origin_row) as usize;
        let c = (col - self.origin_col) as usize;
        self.values.get(r)?.get(c).map(cell_text)
    }

    pub fn iter_cells(&self) -> impl Iterator<Item = (u32, u32, String)> + '_ {
        self.values.iter().enumerate().flat_map(move |(r, row)| {
            row.iter().enumerate().map(move |(c, value)| {
                (
                    self.origin_col + c as u32,
                    self.origin_row + r as u32,
                    cell_text(value),
                )
            })
        })
    }
}

/// Compiled text predicate for substring / whole-word matching.
#[derive(Debug, Clone)]
pub struct TextQuery {
    pub term: String,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pattern: Regex,
}

impl TextQuery {
    pub fn new(term: &str, case_sensitive: bool, whole_word: bool) -> Result<Self, GatewayError> {
        if term.is_empty() {
            return Err(GatewayError::validation("searchTerm must not be empty"));
        }
        let mut pattern = regex::escape(term);
        if whole_word {
            pattern = format!(r"\b{pattern}\b");
        }
        if !case_sensitive {
            pattern = format!("(?i){pattern}");
        }
        let pattern = Regex::new(&pattern)
            .map_err(|e| GatewayError::validation(format!("unusable searchTerm: {e}")))?;
        Ok(Self {
            term: term.to_string(),
            case_sensitive,
            whole_word,
            pattern,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    pub fn replace_all(&self, text: &str, replacement: &str) -> String {
        // Literal replacement: `$` in the user's text must not be treated as
        // a capture-group reference.
        self.pattern
            .replace_all(text, regex::NoExpand(replacement))
            .into_owned()
    }
}

pub fn make_match(sheet: &str, col: u32, row: u32, current_value: String) -> MatchCandidate {
    let address = cell_a1(col, row);
    let match_id = stable_content_id("m", &[sheet, &address, &current_value]);
    MatchCandidate {
        sheet: sheet.to_string(),
        address,
        current_value,
        match_id,
    }
}

/// Text-strategy scan. `header_only` restricts the scan to the grid's first
/// row (the top of the used range).
pub fn find_text_matches(grid: &SheetGrid, query: &TextQuery, header_only: bool) -> Vec<MatchCandidate> {
    let mut matches = Vec::new();
    for (col, row, text) in grid.iter_cells() {
        if header_only && row != grid.origin_row {
            continue;
        }
        if !text.is_empty() && query.matches(&text) {
            matches.push(make_match(&grid.sheet, col, row, text));
        }
    }
    matches
}

/// Label-neighbor search parameters, bounds already clamped by the caller.
#[derive(Debug, Clone)]
pub struct LabelQuery {
    pub labels: Vec<String>,
    /// 1.0 requires exact (case-insensitive) equality; below that, normalized
    /// edit-distance similarity must reach the threshold.
    pub similarity_threshold: f64,
    pub max_steps_right: u32,
    pub max_steps_down: u32,
    pub direction: NeighborDirection,
}

impl LabelQuery {
    fn label_matches(&self, text: &str) -> bool {
        self.labels.iter().any(|label| {
            if label.eq_ignore_ascii_case(text) {
                return true;
            }
            self.similarity_threshold < 1.0
                && string_similarity(label, text) >= self.similarity_threshold
        })
    }
}

/// Normalized similarity in [0, 1]: 1.0 is equal, 0.0 shares nothing.
pub fn string_similarity(left: &str, right: &str) -> f64 {
    let left = left.to_lowercase();
    let right = right.to_lowercase();
    let max_len = left.chars().count().max(right.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein_distance(&left, &right);
    1.0 - distance as f64 / max_len as f64
}

/// For every cell matching one of the labels, return the first non-empty
/// neighbor: scanning right first, then down, each bounded by the step
/// limits. Matches are the neighbor (value) cells, never the labels.
pub fn find_label_neighbor_matches(grid: &SheetGrid, query: &LabelQuery) -> Vec<MatchCandidate> {
    let mut matches = Vec::new();
    for (col, row, text) in grid.iter_cells() {
        if text.is_empty() || !query.label_matches(&text) {
            continue;
        }
        if let Some((ncol, nrow, nvalue)) = first_nonempty_neighbor(grid, col, row, query) {
            matches.push(make_match(&grid.sheet, ncol, nrow, nvalue));
        }
    }
    matches
}

fn first_nonempty_neighbor(
    grid: &SheetGrid,
    col: u32,
    row: u32,
    query: &LabelQuery,
) -> Option<(u32, u32, String)> {
    if query.direction.scans_right() {
        for step in 1..=query.max_steps_right {
            if let Some(text) = grid.text_at(col + step, row) {
                if !text.is_empty() {
                    return Some((col + step, row, text));
                }
            }
        }
    }
    if query.direction.scans_down() {
        for step in 1..=query.max_steps_down {
            if let Some(text) = grid.text_at(col, row + step) {
                if !text.is_empty() {
                    return Some((col, row + step, text));
                }
            }
        }
    }
    None
}
