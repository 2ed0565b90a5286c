//! Worksheets flattened into plain cell grids.

use calamine::{open_workbook_auto_from_rs, open_workbook_from_rs, Data, Range, Reader, Xlsx};
use std::io::Cursor;
use tracing::{debug, warn};

use super::error::ParseError;

/// A single cell value, reduced to what the timetable parser needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Trimmed textual value, `None` for empty or blank cells.
    pub fn text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Cell::Number(n) => {
                if n.fract() == 0.0 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(n.to_string())
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text().is_none()
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::Bool(b) => Cell::Text(b.to_string()),
            _ => Cell::Empty,
        }
    }
}

/// Inclusive rectangle of merged cells, anchored at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedRegion {
    pub start: (usize, usize),
    pub end: (usize, usize),
}

impl MergedRegion {
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.start.0 && row <= self.end.0 && col >= self.start.1 && col <= self.end.1
    }
}

/// One worksheet with absolute (row, column) addressing.
#[derive(Debug, Clone)]
pub struct SheetGrid {
    pub name: String,
    rows: Vec<Vec<Cell>>,
    merges: Vec<MergedRegion>,
}

static EMPTY: Cell = Cell::Empty;

impl SheetGrid {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            rows,
            merges: Vec::new(),
        }
    }

    pub fn with_merges(mut self, merges: Vec<MergedRegion>) -> Self {
        self.merges = merges;
        self
    }

    /// Builds a grid from string rows; empty strings become empty cells.
    pub fn from_strings(name: impl Into<String>, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|s| {
                        if s.is_empty() {
                            Cell::Empty
                        } else {
                            Cell::Text(s.to_string())
                        }
                    })
                    .collect()
            })
            .collect();
        Self::new(name, rows)
    }

    fn from_range(name: String, range: &Range<Data>, merges: Vec<MergedRegion>) -> Self {
        let (row_offset, col_offset) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        let mut rows = vec![Vec::new(); row_offset];
        for row in range.rows() {
            let mut cells = vec![Cell::Empty; col_offset];
            cells.extend(row.iter().map(Cell::from));
            rows.push(cells);
        }

        Self::new(name, rows).with_merges(merges)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    pub fn get(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    /// Value shown at (row, col): the cell itself, or the anchor of the merged
    /// region covering it.
    pub fn visible(&self, row: usize, col: usize) -> &Cell {
        let cell = self.get(row, col);
        if !cell.is_empty() {
            return cell;
        }
        match self.merges.iter().find(|m| m.contains(row, col)) {
            Some(region) => self.get(region.start.0, region.start.1),
            None => cell,
        }
    }
}

/// Opens a workbook and flattens every worksheet.
///
/// XLSX files are read with their merged regions; anything else (XLS, ODS)
/// goes through calamine's format detection without merge information.
pub fn load_workbook(bytes: &[u8]) -> Result<Vec<SheetGrid>, ParseError> {
    match open_workbook_from_rs::<Xlsx<_>, _>(Cursor::new(bytes)) {
        Ok(mut workbook) => {
            let merges_loaded = match workbook.load_merged_regions() {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Failed to load merged regions, continuing without them");
                    false
                }
            };

            let mut grids = Vec::new();
            for name in workbook.sheet_names() {
                let merges: Vec<MergedRegion> = if merges_loaded {
                    workbook
                        .merged_regions_by_sheet(&name)
                        .into_iter()
                        .map(|(_, _, dims)| MergedRegion {
                            start: (dims.start.0 as usize, dims.start.1 as usize),
                            end: (dims.end.0 as usize, dims.end.1 as usize),
                        })
                        .collect()
                } else {
                    Vec::new()
                };

                match workbook.worksheet_range(&name) {
                    Ok(range) => grids.push(SheetGrid::from_range(name, &range, merges)),
                    Err(e) => warn!(sheet = %name, error = %e, "Skipping unreadable worksheet"),
                }
            }
            Ok(grids)
        }
        Err(xlsx_err) => {
            debug!(error = %xlsx_err, "Not an XLSX workbook, trying format detection");

            let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
            let mut grids = Vec::new();
            for name in workbook.sheet_names() {
                match workbook.worksheet_range(&name) {
                    Ok(range) => grids.push(SheetGrid::from_range(name, &range, Vec::new())),
                    Err(e) => warn!(sheet = %name, error = %e, "Skipping unreadable worksheet"),
                }
            }
            Ok(grids)
        }
    }
}
