//! Workbook reader: Excel (.xlsx) → WorkbookModel

use crate::error::{ConvertError, ConvertResult};
use crate::types::{CellAddress, RawCell, RawValue, TableDef, WorkbookModel};
use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Loads every sheet's values, formulas and table definitions
pub struct WorkbookReader {
    path: PathBuf,
}

impl WorkbookReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn read(&self) -> ConvertResult<WorkbookModel> {
        let mut workbook: Xlsx<BufReader<File>> = open_workbook(&self.path).map_err(|e| {
            ConvertError::Workbook(format!(
                "Failed to open {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        let mut model = WorkbookModel::new(name);

        let sheet_names = workbook.sheet_names().to_vec();
        for sheet_name in &sheet_names {
            model.add_sheet(sheet_name.clone());

            let range = workbook.worksheet_range(sheet_name).map_err(|e| {
                ConvertError::Workbook(format!("Failed to read sheet '{}': {}", sheet_name, e))
            })?;
            self.load_values(sheet_name, &range, &mut model);

            // Formulas win over the cached values read above
            match workbook.worksheet_formula(sheet_name) {
                Ok(formulas) => self.load_formulas(sheet_name, &formulas, &mut model),
                Err(e) => warn!(sheet = %sheet_name, error = %e, "formulas unreadable"),
            }
        }

        self.load_tables(&mut workbook, &mut model)?;

        debug!(
            sheets = model.sheets.len(),
            cells = model.cells.len(),
            tables = model.tables.len(),
            "workbook loaded"
        );
        Ok(model)
    }

    fn load_values(&self, sheet_name: &str, range: &Range<Data>, model: &mut WorkbookModel) {
        let (row_offset, col_offset) = range.start().unwrap_or((0, 0));
        for (row, col, cell) in range.used_cells() {
            let value = raw_value(cell);
            if value == RawValue::Empty {
                continue;
            }
            let address = CellAddress::new(
                sheet_name,
                col_offset + col as u32 + 1,
                row_offset + row as u32 + 1,
            );
            model.cells.insert(address, RawCell::Value(value));
        }
    }

    fn load_formulas(&self, sheet_name: &str, formulas: &Range<String>, model: &mut WorkbookModel) {
        let (row_offset, col_offset) = formulas.start().unwrap_or((0, 0));
        for (row, col, formula) in formulas.used_cells() {
            if formula.trim().is_empty() {
                continue;
            }
            // calamine strips the leading '='
            let text = if formula.starts_with('=') {
                formula.clone()
            } else {
                format!("={}", formula)
            };
            let address = CellAddress::new(
                sheet_name,
                col_offset + col as u32 + 1,
                row_offset + row as u32 + 1,
            );
            model.cells.insert(address, RawCell::Formula(text));
        }
    }

    fn load_tables(
        &self,
        workbook: &mut Xlsx<BufReader<File>>,
        model: &mut WorkbookModel,
    ) -> ConvertResult<()> {
        workbook
            .load_tables()
            .map_err(|e| ConvertError::Workbook(format!("Failed to read tables: {}", e)))?;

        let names: Vec<String> = workbook.table_names().into_iter().cloned().collect();
        for name in names {
            let table = workbook.table_by_name(&name).map_err(|e| {
                ConvertError::Workbook(format!("Failed to read table '{}': {}", name, e))
            })?;
            let data = table.data();
            let Some((first_row, first_col)) = data.start() else {
                warn!(table = %name, "table has no data rows, skipped");
                continue;
            };
            let (last_row, _) = data.end().unwrap_or((first_row, first_col));
            model.add_table(TableDef {
                name: table.name().to_string(),
                sheet: table.sheet_name().to_string(),
                first_column: first_col + 1,
                first_row: first_row + 1,
                last_row: last_row + 1,
                columns: table.columns().to_vec(),
            });
        }
        Ok(())
    }
}

/// Map a calamine cell to the raw value the converter understands
pub fn raw_value(cell: &Data) -> RawValue {
    match cell {
        Data::Int(i) => RawValue::Integer(*i),
        Data::Float(f) => RawValue::Float(*f),
        Data::Bool(b) => RawValue::Boolean(*b),
        Data::String(s) => RawValue::Text(s.clone()),
        // Date cells carry their serial number
        Data::DateTime(dt) => RawValue::Float(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => RawValue::Text(s.clone()),
        Data::Error(e) => RawValue::Opaque {
            type_name: format!("Error({})", e),
        },
        Data::Empty => RawValue::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;

    #[test]
    fn test_raw_value_scalars() {
        assert_eq!(raw_value(&Data::Int(7)), RawValue::Integer(7));
        assert_eq!(raw_value(&Data::Float(2.5)), RawValue::Float(2.5));
        assert_eq!(raw_value(&Data::Bool(true)), RawValue::Boolean(true));
        assert_eq!(
            raw_value(&Data::String("Apple".to_string())),
            RawValue::Text("Apple".to_string())
        );
        assert_eq!(raw_value(&Data::Empty), RawValue::Empty);
    }

    #[test]
    fn test_error_cells_are_opaque() {
        match raw_value(&Data::Error(CellErrorType::Div0)) {
            RawValue::Opaque { type_name } => assert!(type_name.starts_with("Error(")),
            other => panic!("Expected Opaque, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_workbook_error() {
        let err = WorkbookReader::new("does-not-exist.xlsx").read().unwrap_err();
        assert!(matches!(err, ConvertError::Workbook(_)));
        assert!(err.to_string().contains("does-not-exist.xlsx"));
    }
}
