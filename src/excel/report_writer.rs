//! Analysis report → Excel (.xlsx)

use crate::core::report::AnalysisReport;
use crate::error::{ConvertError, ConvertResult};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;

/// One cell of a report row
enum Value {
    Text(String),
    Number(f64),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

/// Renders an analysis report as a workbook, one sheet per section
pub struct ReportWriter<'a> {
    report: &'a AnalysisReport,
}

impl<'a> ReportWriter<'a> {
    pub fn new(report: &'a AnalysisReport) -> Self {
        Self { report }
    }

    pub fn write(&self, output_path: &Path) -> ConvertResult<()> {
        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();

        let summary = &self.report.summary;
        let mut summary_rows: Vec<Vec<Value>> = vec![
            vec!["Workbook".into(), self.report.workbook.clone().into()],
            vec!["Sheets".into(), summary.sheets.into()],
            vec!["Formula cells".into(), summary.formula_cells.into()],
            vec!["Hardcoded cells".into(), summary.hardcoded_cells.into()],
            vec!["Work items".into(), summary.work_items.into()],
            vec!["Groups".into(), summary.groups.into()],
            vec!["Grouped cells".into(), summary.grouped_cells.into()],
            vec!["Singletons".into(), summary.singletons.into()],
            vec!["Levels".into(), summary.levels.into()],
            vec![
                "Cross-sheet references".into(),
                summary.cross_sheet_references.into(),
            ],
            vec![
                "External references".into(),
                summary.external_references.into(),
            ],
            vec!["External files".into(), summary.external_files.into()],
            vec!["Unsupported".into(), summary.unsupported.into()],
            vec![
                "Serialization warnings".into(),
                summary.serialization_warnings.into(),
            ],
            vec![
                "Removed hardcoded cells".into(),
                summary.removed_hardcoded_cells.into(),
            ],
        ];
        if let Some(cycle) = &self.report.cycle {
            summary_rows.push(vec!["Cycle".into(), cycle.join(" -> ").into()]);
        }
        write_sheet(
            &mut workbook,
            "Summary",
            &["Metric", "Value"],
            summary_rows,
            &header,
        )?;

        let work_items = self
            .report
            .work_items
            .iter()
            .map(|w| {
                vec![
                    w.position.into(),
                    w.level.into(),
                    w.label.clone().into(),
                    match w.direction {
                        Some(direction) => format!("{:?}", direction).into(),
                        None => "".into(),
                    },
                    w.extent.into(),
                    w.formula.clone().into(),
                    w.pattern.clone().into(),
                    w.depends_on.join(", ").into(),
                ]
            })
            .collect();
        write_sheet(
            &mut workbook,
            "Work Items",
            &[
                "Position",
                "Level",
                "Cells",
                "Direction",
                "Extent",
                "Formula",
                "Pattern",
                "Depends On",
            ],
            work_items,
            &header,
        )?;

        let cross_sheet = self
            .report
            .cross_sheet_references
            .iter()
            .map(|r| {
                vec![
                    r.from.to_string().into(),
                    r.target_sheet.clone().into(),
                    r.reference.clone().into(),
                    r.formula.clone().into(),
                ]
            })
            .collect();
        write_sheet(
            &mut workbook,
            "Cross-Sheet Refs",
            &["From", "Target Sheet", "Reference", "Formula"],
            cross_sheet,
            &header,
        )?;

        let external = self
            .report
            .external_references
            .iter()
            .map(|r| {
                vec![
                    r.from.to_string().into(),
                    r.file.clone().into(),
                    r.sheet.clone().into(),
                    r.reference.clone().into(),
                    r.store_key.clone().into(),
                ]
            })
            .collect();
        write_sheet(
            &mut workbook,
            "External Refs",
            &["From", "File", "Sheet", "Reference", "Store Key"],
            external,
            &header,
        )?;

        let unsupported = self
            .report
            .unsupported
            .iter()
            .map(|d| {
                vec![
                    d.address.to_string().into(),
                    d.formula.clone().into(),
                    d.message.clone().into(),
                ]
            })
            .chain(self.report.serialization_warnings.iter().map(|w| {
                vec![
                    w.address.to_string().into(),
                    "".into(),
                    format!("value of type {} written as empty", w.type_name).into(),
                ]
            }))
            .collect();
        write_sheet(
            &mut workbook,
            "Unsupported",
            &["Cell", "Formula", "Reason"],
            unsupported,
            &header,
        )?;

        let per_sheet = self
            .report
            .per_sheet
            .iter()
            .map(|s| {
                vec![
                    s.sheet.clone().into(),
                    s.formula_cells.into(),
                    s.hardcoded_cells.into(),
                    s.groups.into(),
                    s.singletons.into(),
                ]
            })
            .collect();
        write_sheet(
            &mut workbook,
            "Per-Sheet",
            &["Sheet", "Formula Cells", "Hardcoded Cells", "Groups", "Singletons"],
            per_sheet,
            &header,
        )?;

        workbook
            .save(output_path)
            .map_err(|e| ConvertError::Report(format!("Failed to save report workbook: {}", e)))?;
        Ok(())
    }
}

fn write_sheet(
    workbook: &mut Workbook,
    name: &str,
    headers: &[&str],
    rows: Vec<Vec<Value>>,
    header_format: &Format,
) -> ConvertResult<()> {
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(name)
        .map_err(|e| ConvertError::Report(format!("Failed to set worksheet name: {}", e)))?;

    for (col, title) in headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, *title, header_format)
            .map_err(|e| ConvertError::Report(format!("Failed to write header: {}", e)))?;
    }

    for (row_idx, values) in rows.into_iter().enumerate() {
        let row = row_idx as u32 + 1;
        for (col, value) in values.into_iter().enumerate() {
            write_cell(worksheet, row, col as u16, value)?;
        }
    }
    Ok(())
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, value: Value) -> ConvertResult<()> {
    let result = match value {
        Value::Text(text) if text.is_empty() => return Ok(()),
        Value::Text(text) => worksheet.write_string(row, col, text).map(|_| ()),
        Value::Number(n) => worksheet.write_number(row, col, n).map(|_| ()),
    };
    result.map_err(|e| ConvertError::Report(format!("Failed to write cell: {}", e)))
}
