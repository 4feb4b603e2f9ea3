//! Pipeline orchestration
//!
//! `analyze` runs every stage and records what it finds without failing;
//! `convert` applies the hard errors (parse failures, unsupported functions,
//! cycles) before anything is emitted.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use super::cells::{CellCatalog, HardcodedCell};
use super::emitter::{self, ProgramSource};
use super::formula::FormulaCell;
use super::grouping::build_groups;
use super::report::AnalysisReport;
use super::scheduler::{schedule, Schedule};
use super::translator::functions;
use crate::config::ConvertConfig;
use crate::error::{ConvertError, ConvertResult, FormulaDiagnostic};
use crate::types::{CellAddress, WorkbookModel};

/// Everything learned about a workbook, errors included
#[derive(Debug, Clone)]
pub struct Analysis {
    pub workbook: String,
    pub sheets: Vec<String>,
    pub catalog: CellCatalog,
    /// Formulas calling functions outside the supported table
    pub unsupported_functions: Vec<FormulaDiagnostic>,
    /// Empty when `cycle` is set
    pub schedule: Schedule,
    /// Members of the smallest cycle, when the graph is not acyclic
    pub cycle: Option<Vec<String>>,
    pub report: AnalysisReport,
}

/// Output of a successful conversion
#[derive(Debug, Clone)]
pub struct Conversion {
    /// Source of the generated program
    pub program: String,
    /// External workbook names as written in formulas → path (left empty)
    pub manifest: BTreeMap<String, String>,
    pub report: AnalysisReport,
}

pub struct Converter {
    config: ConvertConfig,
}

impl Converter {
    pub fn new(config: ConvertConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    /// Run every stage, collecting problems instead of stopping at them
    pub fn analyze(&self, model: &WorkbookModel) -> Analysis {
        info!(workbook = %model.name, cells = model.cells.len(), "parsing cells");
        let catalog = CellCatalog::build(model);
        info!(
            formulas = catalog.formulas.len(),
            hardcoded = catalog.hardcoded.len(),
            rejected = catalog.diagnostics.len(),
            "parse pass complete"
        );

        let unsupported_functions = find_unsupported_functions(&catalog);

        let grouping = build_groups(&catalog.formulas);
        info!(
            groups = grouping.groups.len(),
            singletons = grouping.singletons.len(),
            "grouping complete"
        );

        let (schedule, cycle) = match schedule(grouping, &catalog.formulas) {
            Ok(schedule) => (schedule, None),
            Err(ConvertError::CircularDependency(members)) => (Schedule::default(), Some(members)),
            Err(other) => (
                Schedule::default(),
                Some(vec![format!("scheduling failed: {}", other)]),
            ),
        };
        info!(
            work_items = schedule.len(),
            levels = schedule.levels.len(),
            "scheduling complete"
        );

        let report = AnalysisReport::build(
            &model.name,
            &model.sheets,
            &catalog,
            &unsupported_functions,
            &schedule,
            cycle.as_ref(),
        );

        Analysis {
            workbook: model.name.clone(),
            sheets: model.sheets.clone(),
            catalog,
            unsupported_functions,
            schedule,
            cycle,
            report,
        }
    }

    /// Compile the workbook into a program, or fail before emitting anything
    pub fn convert(&self, model: &WorkbookModel) -> ConvertResult<Conversion> {
        let analysis = self.analyze(model);

        if !analysis.catalog.diagnostics.is_empty() {
            return Err(ConvertError::Parse(analysis.catalog.diagnostics));
        }
        if let Some((cell, function)) = analysis
            .catalog
            .formulas
            .values()
            .find_map(|cell| unsupported_call(cell).map(|name| (cell, name)))
        {
            return Err(ConvertError::UnsupportedFunction {
                function,
                address: cell.address.clone(),
                formula: cell.text.clone(),
            });
        }
        if let Some(members) = analysis.cycle {
            return Err(ConvertError::CircularDependency(members));
        }

        let mut report = analysis.report;
        let hardcoded = if self.config.delete_unreferenced_hardcoded_values {
            let kept = referenced_hardcoded(&analysis.catalog);
            let removed = analysis.catalog.hardcoded.len() - kept.len();
            info!(removed, "dropped unreferenced hardcoded cells");
            report.summary.removed_hardcoded_cells = removed;
            kept
        } else {
            analysis.catalog.hardcoded.clone()
        };

        let externals = external_sheets(&analysis.catalog);
        let program = emitter::emit(&ProgramSource {
            workbook: &analysis.workbook,
            sheets: &analysis.sheets,
            hardcoded: &hardcoded,
            formulas: &analysis.catalog.formulas,
            schedule: &analysis.schedule,
            externals: &externals,
        })?;
        info!(bytes = program.len(), "program emitted");

        let manifest = externals
            .keys()
            .map(|file| (file.clone(), String::new()))
            .collect();

        Ok(Conversion {
            program,
            manifest,
            report,
        })
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(ConvertConfig::default())
    }
}

/// First function in the formula with no translation
fn unsupported_call(cell: &FormulaCell) -> Option<String> {
    cell.expr
        .function_names()
        .into_iter()
        .find(|name| !functions::is_supported(name))
        .map(str::to_string)
}

/// Every formula calling a function with no translation
fn find_unsupported_functions(catalog: &CellCatalog) -> Vec<FormulaDiagnostic> {
    let mut found = Vec::new();
    for cell in catalog.formulas.values() {
        if let Some(name) = unsupported_call(cell) {
            debug!(address = %cell.address, function = name, "unsupported function");
            found.push(FormulaDiagnostic::new(
                &cell.address,
                &cell.text,
                format!("function {} is not supported", name),
            ));
        }
    }
    found
}

/// External file → sheets referenced from it
fn external_sheets(catalog: &CellCatalog) -> BTreeMap<String, BTreeSet<String>> {
    let mut externals: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for cell in catalog.formulas.values() {
        for reference in &cell.references {
            if let Some(file) = &reference.external_file {
                externals
                    .entry(file.clone())
                    .or_default()
                    .insert(reference.sheet.clone());
            }
        }
    }
    externals
}

/// Hardcoded cells read by at least one formula, directly or through a range
fn referenced_hardcoded(catalog: &CellCatalog) -> BTreeMap<CellAddress, HardcodedCell> {
    let mut kept = BTreeMap::new();
    for cell in catalog.formulas.values() {
        for reference in &cell.references {
            if reference.external_file.is_some() {
                continue;
            }
            let (start, end) = reference.target.corners();
            let lower = CellAddress::new(reference.sheet.clone(), 0, start.row);
            let upper = CellAddress::new(reference.sheet.clone(), u32::MAX, end.row);
            for (address, hardcoded) in catalog.hardcoded.range(lower..=upper) {
                if (start.column..=end.column).contains(&address.column) {
                    kept.insert(address.clone(), hardcoded.clone());
                }
            }
        }
    }
    kept
}
