//! Spreadsheet decoding: turns an uploaded `.xlsx` or `.csv` into a row
//! oriented [`Table`] whose first row supplies the column headers.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::io::{Cursor, Read};
use thiserror::Error;
use zip::ZipArchive;

/// Largest row number an xlsx sheet may reference.
pub const MAX_ROWS: usize = 1_048_576;
/// Largest column number an xlsx sheet may reference (`XFD`).
pub const MAX_COLUMNS: usize = 16_384;
/// Upper bound on rows x columns once every row is padded to the table width.
pub const MAX_CELLS: usize = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadsheetFormat {
    Xlsx,
    Xls,
    Csv,
}

impl SpreadsheetFormat {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, extension) = filename.rsplit_once('.')?;
        match extension.to_lowercase().as_str() {
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Xls => "application/vnd.ms-excel",
            Self::Csv => "text/csv",
        }
    }
}

#[derive(Debug, Error)]
pub enum SpreadsheetError {
    #[error("Unsupported spreadsheet format: {0}")]
    Unsupported(String),

    #[error("Malformed spreadsheet: {0}")]
    Malformed(String),
}

impl From<zip::result::ZipError> for SpreadsheetError {
    fn from(e: zip::result::ZipError) -> Self {
        SpreadsheetError::Malformed(e.to_string())
    }
}

impl From<quick_xml::Error> for SpreadsheetError {
    fn from(e: quick_xml::Error) -> Self {
        SpreadsheetError::Malformed(e.to_string())
    }
}

impl From<csv::Error> for SpreadsheetError {
    fn from(e: csv::Error) -> Self {
        SpreadsheetError::Malformed(e.to_string())
    }
}

impl From<std::io::Error> for SpreadsheetError {
    fn from(e: std::io::Error) -> Self {
        SpreadsheetError::Malformed(e.to_string())
    }
}

/// A single cell. Serializes to the matching JSON scalar (`null` when empty).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Interprets free text the way a CSV cell is read.
    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Empty;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return CellValue::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return CellValue::Bool(false);
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => CellValue::Number(n),
            _ => CellValue::Text(raw.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Numeric reading of the cell; `None` when it has no numeric meaning.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            CellValue::Bool(_) | CellValue::Empty => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Empty => Value::Null,
            CellValue::Bool(b) => json!(b),
            CellValue::Number(n) => json!(n),
            CellValue::Text(s) => json!(s),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl Table {
    /// Builds a table from raw rows. Blank rows are dropped, the first
    /// remaining row becomes the header row and every data row is padded to
    /// the table width.
    pub fn from_grid(grid: Vec<Vec<CellValue>>) -> Self {
        let mut rows = grid
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.is_empty()));

        let Some(header_row) = rows.next() else {
            return Table::default();
        };

        let mut rows: Vec<Vec<CellValue>> = rows.collect();
        let width = rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header_row.len()))
            .max()
            .unwrap_or(0);

        let headers = (0..width)
            .map(|i| match header_row.get(i) {
                Some(cell) if !cell.is_empty() => cell.to_string(),
                _ => format!("Column {}", i + 1),
            })
            .collect();

        for row in &mut rows {
            row.resize(width, CellValue::Empty);
        }

        Table { headers, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn cell<'a>(&self, row: &'a [CellValue], column: usize) -> &'a CellValue {
        row.get(column).unwrap_or(&EMPTY_CELL)
    }

    /// Rows as objects keyed by header name.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .enumerate()
                    .map(|(i, header)| (header.clone(), self.cell(row, i).to_json()))
                    .collect()
            })
            .collect()
    }

    pub fn truncated(mut self, limit: usize) -> Self {
        self.rows.truncate(limit);
        self
    }
}

pub fn parse_table(bytes: &[u8], filename: &str) -> Result<Table, SpreadsheetError> {
    match SpreadsheetFormat::from_filename(filename) {
        Some(SpreadsheetFormat::Xlsx) => parse_xlsx(bytes),
        Some(SpreadsheetFormat::Csv) => parse_csv(bytes),
        Some(SpreadsheetFormat::Xls) => Err(SpreadsheetError::Unsupported(
            "legacy .xls workbooks cannot be read, save the file as .xlsx".to_string(),
        )),
        None => Err(SpreadsheetError::Unsupported(filename.to_string())),
    }
}

pub fn parse_csv(bytes: &[u8]) -> Result<Table, SpreadsheetError> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record?;
        grid.push(record.iter().map(CellValue::from_text).collect());
    }

    check_dimensions(&grid)?;
    Ok(Table::from_grid(grid))
}

/// Rejects grids whose padded table would exceed [`MAX_CELLS`].
fn check_dimensions(grid: &[Vec<CellValue>]) -> Result<(), SpreadsheetError> {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    let rows = grid
        .iter()
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .count();
    match width.checked_mul(rows) {
        Some(cells) if cells <= MAX_CELLS => Ok(()),
        _ => Err(SpreadsheetError::Malformed(format!(
            "table of {} rows by {} columns is too large",
            rows, width
        ))),
    }
}

pub fn parse_xlsx(bytes: &[u8]) -> Result<Table, SpreadsheetError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let shared_strings = match read_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let sheet_path = first_sheet_path(&mut archive)?;
    let sheet_xml = read_entry(&mut archive, &sheet_path)?
        .ok_or_else(|| SpreadsheetError::Malformed(format!("missing worksheet {}", sheet_path)))?;

    let grid = parse_sheet(&sheet_xml, &shared_strings)?;
    check_dimensions(&grid)?;
    Ok(Table::from_grid(grid))
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>, SpreadsheetError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)?;
    Ok(Some(xml))
}

const DEFAULT_SHEET: &str = "xl/worksheets/sheet1.xml";

fn first_sheet_path(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<String, SpreadsheetError> {
    let Some(workbook) = read_entry(archive, "xl/workbook.xml")? else {
        return Ok(DEFAULT_SHEET.to_string());
    };
    let Some(rel_id) = first_sheet_relationship(&workbook)? else {
        return Ok(DEFAULT_SHEET.to_string());
    };
    let Some(rels) = read_entry(archive, "xl/_rels/workbook.xml.rels")? else {
        return Ok(DEFAULT_SHEET.to_string());
    };

    Ok(relationship_target(&rels, &rel_id)?
        .map(|target| match target.strip_prefix('/') {
            Some(absolute) => absolute.to_string(),
            None => format!("xl/{}", target),
        })
        .unwrap_or_else(|| DEFAULT_SHEET.to_string()))
}

fn attribute(element: &BytesStart, local_name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == local_name)
        .map(|attr| unescape_xml(&String::from_utf8_lossy(&attr.value)))
}

fn first_sheet_relationship(workbook_xml: &str) -> Result<Option<String>, SpreadsheetError> {
    let mut reader = Reader::from_str(workbook_xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                return Ok(attribute(&e, b"id"));
            }
            Event::Eof => return Ok(None),
            _ => (),
        }
        buf.clear();
    }
}

fn relationship_target(rels_xml: &str, rel_id: &str) -> Result<Option<String>, SpreadsheetError> {
    let mut reader = Reader::from_str(rels_xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e)
                if e.local_name().as_ref() == b"Relationship"
                    && attribute(&e, b"Id").as_deref() == Some(rel_id) =>
            {
                return Ok(attribute(&e, b"Target"));
            }
            Event::Eof => return Ok(None),
            _ => (),
        }
        buf.clear();
    }
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, SpreadsheetError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    // Phonetic hints (<rPh>) carry their own <t> runs that are not part of the value
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = phonetic_depth == 0,
                b"rPh" => phonetic_depth += 1,
                _ => (),
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => {
                    if let Some(s) = current.take() {
                        strings.push(s);
                    }
                }
                b"t" => in_text = false,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                _ => (),
            },
            Event::Text(e) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&unescape_xml(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Event::CData(e) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&entity_text(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Event::Eof => break,
            _ => (),
        }
        buf.clear();
    }

    Ok(strings)
}

struct OpenCell {
    column: usize,
    kind: String,
    value: String,
}

fn parse_sheet(xml: &str, shared_strings: &[String]) -> Result<Vec<Vec<CellValue>>, SpreadsheetError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut grid: Vec<Vec<CellValue>> = Vec::new();
    let mut row: Vec<CellValue> = Vec::new();
    let mut row_index = 0usize;
    let mut next_column = 0usize;
    let mut cell: Option<OpenCell> = None;
    let mut in_value = false;
    let mut allocated = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_index = match attribute(&e, b"r") {
                        Some(r) => row_from_attribute(&r)?,
                        None => grid.len(),
                    };
                    if row_index >= MAX_ROWS {
                        return Err(SpreadsheetError::Malformed(format!(
                            "row {} is beyond the sheet limit",
                            row_index + 1
                        )));
                    }
                    row.clear();
                    next_column = 0;
                }
                b"c" => {
                    let column = cell_column(&e, next_column)?;
                    cell = Some(OpenCell {
                        column,
                        kind: attribute(&e, b"t").unwrap_or_else(|| "n".to_string()),
                        value: String::new(),
                    });
                }
                b"v" | b"t" => in_value = cell.is_some(),
                _ => (),
            },
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                next_column = cell_column(&e, next_column)? + 1;
            }
            Event::Text(e) if in_value => {
                if let Some(open) = cell.as_mut() {
                    open.value
                        .push_str(&unescape_xml(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Event::CData(e) if in_value => {
                if let Some(open) = cell.as_mut() {
                    open.value.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) if in_value => {
                if let Some(open) = cell.as_mut() {
                    open.value
                        .push_str(&entity_text(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(open) = cell.take() {
                        let value = decode_cell(&open.kind, &open.value, shared_strings);
                        if row.len() <= open.column {
                            row.resize(open.column + 1, CellValue::Empty);
                        }
                        row[open.column] = value;
                        next_column = open.column + 1;
                    }
                }
                b"row" => {
                    let cells = std::mem::take(&mut row);
                    allocated += cells.len();
                    if allocated > MAX_CELLS {
                        return Err(SpreadsheetError::Malformed(
                            "sheet holds too many cells".to_string(),
                        ));
                    }
                    if row_index < grid.len() {
                        grid[row_index] = cells;
                    } else {
                        grid.resize(row_index, Vec::new());
                        grid.push(cells);
                    }
                }
                _ => (),
            },
            Event::Eof => break,
            _ => (),
        }
        buf.clear();
    }

    Ok(grid)
}

fn row_from_attribute(r: &str) -> Result<usize, SpreadsheetError> {
    match r.trim().parse::<usize>() {
        Ok(n) if (1..=MAX_ROWS).contains(&n) => Ok(n - 1),
        _ => Err(SpreadsheetError::Malformed(format!("invalid row number {}", r))),
    }
}

/// Column of a `<c>` element: its `r` reference when present, else the
/// position after the previous cell.
fn cell_column(e: &BytesStart, next_column: usize) -> Result<usize, SpreadsheetError> {
    let column = match attribute(e, b"r") {
        Some(r) if r.starts_with(|c: char| c.is_ascii_alphabetic()) => column_from_reference(&r)
            .ok_or_else(|| SpreadsheetError::Malformed(format!("invalid cell reference {}", r)))?,
        _ => next_column,
    };
    if column >= MAX_COLUMNS {
        return Err(SpreadsheetError::Malformed(format!(
            "column {} is beyond the sheet limit",
            column + 1
        )));
    }
    Ok(column)
}

fn decode_cell(kind: &str, raw: &str, shared_strings: &[String]) -> CellValue {
    if raw.is_empty() {
        return CellValue::Empty;
    }
    match kind {
        "s" => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i))
            .map(|s| CellValue::Text(s.clone()))
            .unwrap_or(CellValue::Empty),
        "b" => CellValue::Bool(raw.trim() == "1"),
        "str" | "inlineStr" | "e" | "d" => CellValue::Text(raw.to_string()),
        _ => match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => CellValue::Number(n),
            _ => CellValue::Text(raw.to_string()),
        },
    }
}

/// Zero-based column of an A1-style reference ("C7" -> 2).
pub fn column_from_reference(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let number = letters.iter().try_fold(0usize, |acc, b| {
        acc.checked_mul(26)?.checked_add((b - b'A' + 1) as usize)
    })?;
    Some(number - 1)
}

fn entity_text(name: &str) -> String {
    resolve_entity(name).unwrap_or_else(|| format!("&{};", name))
}

fn resolve_entity(name: &str) -> Option<String> {
    let resolved = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse::<u32>().ok()?,
            };
            char::from_u32(value)?
        }
    };
    Some(resolved.to_string())
}

fn unescape_xml(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find(';').and_then(|end| Some((end, resolve_entity(&after[..end])?))) {
            Some((end, text)) => {
                out.push_str(&text);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
