//! Workbook I/O
//!
//! - Read: Excel (.xlsx) → WorkbookModel (values, formulas, tables)
//! - Write: AnalysisReport → Excel (.xlsx)

mod reader;
mod report_writer;

pub use reader::{raw_value, WorkbookReader};
pub use report_writer::ReportWriter;
