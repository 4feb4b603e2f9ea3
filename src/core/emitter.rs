//! Code emitter
//!
//! Renders the scheduled work items into a self-contained Python program.
//! Every formula is translated before any text is produced, so a translation
//! failure leaves nothing half-written.

use std::collections::{BTreeMap, BTreeSet};

use super::cells::HardcodedCell;
use super::formula::FormulaCell;
use super::grouping::Direction;
use super::scheduler::{Schedule, WorkItem};
use super::translator::{py_number, py_str, TranslateError, Translator, COLUMN_VAR, ROW_VAR};
use crate::error::{ConvertError, ConvertResult};
use crate::types::{CellAddress, CellValue};

/// Spreadsheet semantics shipped inside every generated program
pub const RUNTIME: &str = include_str!("../runtime/xl_runtime.py");
/// Workbook I/O and `main`, appended after `compute`
pub const SCAFFOLD: &str = include_str!("../runtime/xl_program.py");

const INDENT: &str = "    ";

/// Everything the emitter needs, borrowed from the converter
pub struct ProgramSource<'a> {
    /// Workbook file name, for the docstring
    pub workbook: &'a str,
    pub sheets: &'a [String],
    pub hardcoded: &'a BTreeMap<CellAddress, HardcodedCell>,
    pub formulas: &'a BTreeMap<CellAddress, FormulaCell>,
    pub schedule: &'a Schedule,
    /// External file name → sheets read from it
    pub externals: &'a BTreeMap<String, BTreeSet<String>>,
}

/// Python literal for a hardcoded value
pub fn py_literal(value: &CellValue) -> String {
    match value {
        CellValue::Integer(i) => i.to_string(),
        CellValue::Float(f) => py_number(*f),
        CellValue::Boolean(true) => "True".to_string(),
        CellValue::Boolean(false) => "False".to_string(),
        CellValue::Text(s) => py_str(s),
        CellValue::Null => "None".to_string(),
    }
}

fn cell_key(address: &CellAddress) -> String {
    format!(
        "({}, {}, {})",
        py_str(&address.sheet),
        address.column,
        address.row
    )
}

/// Convert a translator failure into the conversion error for that cell
fn translate_failure(cell: &FormulaCell, err: TranslateError) -> ConvertError {
    match err {
        TranslateError::UnsupportedFunction(function) => ConvertError::UnsupportedFunction {
            function,
            address: cell.address.clone(),
            formula: cell.text.clone(),
        },
        other => ConvertError::Translate {
            address: cell.address.clone(),
            formula: cell.text.clone(),
            message: other.to_string(),
        },
    }
}

/// One translated work item, ready to print
struct Block {
    comment: String,
    loop_header: Option<String>,
    key: String,
    body: String,
}

fn translate_item(
    item: &WorkItem,
    formulas: &BTreeMap<CellAddress, FormulaCell>,
) -> ConvertResult<Block> {
    let anchor = item.anchor();
    let cell = formulas.get(anchor).ok_or_else(|| ConvertError::Translate {
        address: anchor.clone(),
        formula: String::new(),
        message: "work item has no formula".to_string(),
    })?;

    let (direction, loop_header) = match item {
        WorkItem::Singleton(_) => (None, None),
        WorkItem::Group(group) => {
            let (first, last) = group.index_range();
            let var = match group.direction {
                Direction::Vertical => ROW_VAR,
                Direction::Horizontal => COLUMN_VAR,
            };
            (
                Some(group.direction),
                Some(format!("for {} in range({}, {}):", var, first, last + 1)),
            )
        }
    };

    let translator = Translator::new(cell, direction);
    let body = translator
        .translate(&cell.expr)
        .map_err(|e| translate_failure(cell, e))?;

    Ok(Block {
        comment: format!("# {}  {}", item.label(), cell.text.replace('\n', " ")),
        loop_header,
        key: translator.owner_key(),
        body,
    })
}

/// Render the full program
pub fn emit(source: &ProgramSource<'_>) -> ConvertResult<String> {
    let blocks = source
        .schedule
        .items
        .iter()
        .map(|item| translate_item(item, source.formulas))
        .collect::<ConvertResult<Vec<_>>>()?;

    let mut out = String::new();

    out.push_str("#!/usr/bin/env python3\n");
    out.push_str(&format!(
        "\"\"\"Calculation program for {}.\n\n",
        source.workbook.replace('"', "'").replace('\\', "/")
    ));
    out.push_str("Usage: python calculate.py [input.xlsx] [-o output.xlsx] [--externals input_files_config.json]\n");
    out.push_str("\"\"\"\n\n");
    out.push_str("import json\nimport sys\n\n");
    out.push_str(RUNTIME);
    out.push('\n');

    emit_constants(&mut out, source);
    emit_seed(&mut out, source.hardcoded);
    emit_compute(&mut out, &blocks);

    out.push('\n');
    out.push_str(SCAFFOLD);
    Ok(out)
}

fn emit_constants(out: &mut String, source: &ProgramSource<'_>) {
    out.push_str("# ---------------------------------------------------------------------------\n");
    out.push_str("# Workbook layout\n");
    out.push_str("# ---------------------------------------------------------------------------\n\n");

    let sheets: Vec<String> = source.sheets.iter().map(|s| py_str(s)).collect();
    out.push_str(&format!("SHEETS = [{}]\n\n", sheets.join(", ")));

    out.push_str("EXTERNAL_SHEETS = {");
    if source.externals.is_empty() {
        out.push_str("}\n\n");
    } else {
        out.push('\n');
        for (file, sheets) in source.externals {
            let sheets: Vec<String> = sheets.iter().map(|s| py_str(s)).collect();
            out.push_str(&format!(
                "{}{}: [{}],\n",
                INDENT,
                py_str(file),
                sheets.join(", ")
            ));
        }
        out.push_str("}\n\n");
    }

    out.push_str("INPUT_CELLS = [\n");
    for address in source.hardcoded.keys() {
        out.push_str(&format!("{}{},\n", INDENT, cell_key(address)));
    }
    out.push_str("]\n\n\n");
}

fn emit_seed(out: &mut String, hardcoded: &BTreeMap<CellAddress, HardcodedCell>) {
    out.push_str("def seed(c):\n");
    out.push_str(&format!("{}\"\"\"Literal values of every hardcoded cell.\"\"\"\n", INDENT));
    if hardcoded.is_empty() {
        out.push_str(&format!("{}pass\n\n\n", INDENT));
        return;
    }
    out.push_str(&format!("{}c.update({{\n", INDENT));
    for (address, cell) in hardcoded {
        out.push_str(&format!(
            "{}{}{}: {},\n",
            INDENT,
            INDENT,
            cell_key(address),
            py_literal(&cell.value)
        ));
    }
    out.push_str(&format!("{}}})\n\n\n", INDENT));
}

fn emit_compute(out: &mut String, blocks: &[Block]) {
    out.push_str("def compute(c, diag):\n");
    out.push_str(&format!(
        "{}\"\"\"Evaluate every formula in dependency order.\"\"\"\n",
        INDENT
    ));
    if blocks.is_empty() {
        out.push_str(&format!("{}pass\n", INDENT));
        return;
    }
    for block in blocks {
        out.push_str(&format!("{}{}\n", INDENT, block.comment));
        let indent = match &block.loop_header {
            Some(header) => {
                out.push_str(&format!("{}{}\n", INDENT, header));
                format!("{}{}", INDENT, INDENT)
            }
            None => INDENT.to_string(),
        };
        out.push_str(&format!(
            "{}_cell(c, diag, {}, lambda: {})\n",
            indent, block.key, block.body
        ));
    }
}
