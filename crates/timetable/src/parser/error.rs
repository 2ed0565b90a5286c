//! Error types for spreadsheet parsing.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The bytes are not a workbook calamine can open
    #[error("Unreadable spreadsheet: {message}")]
    Unreadable { message: String },

    /// The workbook opened but contains no worksheets
    #[error("Spreadsheet has no worksheets")]
    NoSheets,

    /// No worksheet matched the expected timetable layout
    #[error("No timetable found in {sheets} worksheet(s)")]
    NoSchedule { sheets: usize },
}

impl From<calamine::XlsxError> for ParseError {
    fn from(err: calamine::XlsxError) -> Self {
        ParseError::Unreadable {
            message: err.to_string(),
        }
    }
}

impl From<calamine::Error> for ParseError {
    fn from(err: calamine::Error) -> Self {
        ParseError::Unreadable {
            message: err.to_string(),
        }
    }
}
