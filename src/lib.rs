//! xl2py - compile spreadsheet formulas into a vectorised Python program
//!
//! A workbook is read into a [`WorkbookModel`], every formula is parsed and
//! normalised into a position-independent pattern, runs of equivalent
//! formulas become loop groups, the groups are ordered by their cell-level
//! dependencies, and each one is translated into a single Python statement.
//!
//! # Features
//!
//! - Groups of copied-down or copied-across formulas emitted as one loop
//! - Cross-sheet, external-workbook and structured table references
//! - Deterministic output for identical workbooks
//! - JSON and Excel analysis reports
//!
//! # Example
//!
//! ```no_run
//! use royalbit_xl2py::core::Converter;
//! use royalbit_xl2py::excel::WorkbookReader;
//!
//! let model = WorkbookReader::new("model.xlsx").read()?;
//! let conversion = Converter::default().convert(&model)?;
//!
//! println!("Work items: {}", conversion.report.summary.work_items);
//! std::fs::write("calculate.py", &conversion.program)?;
//! # Ok::<(), royalbit_xl2py::error::ConvertError>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod excel;
pub mod types;
pub mod writer;

// Re-export commonly used types
pub use config::ConvertConfig;
pub use core::{Analysis, Conversion, Converter};
pub use error::{ConvertError, ConvertResult};
pub use types::{CellAddress, CellValue, RawCell, RawValue, TableDef, WorkbookModel};
