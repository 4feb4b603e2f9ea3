//! Analysis report
//!
//! Structured inventory of what the converter found: work items with their
//! pattern keys, cross-sheet and external references, unsupported formulas
//! and gated values. Serialised to JSON and rendered as a workbook.

use serde::Serialize;
use std::collections::BTreeMap;

use super::cells::{CellCatalog, SerializationWarning};
use super::grouping::Direction;
use super::pattern::Pattern;
use super::scheduler::{Schedule, WorkItem, WorkItemKind};
use crate::error::FormulaDiagnostic;
use crate::types::CellAddress;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub sheets: usize,
    pub formula_cells: usize,
    pub hardcoded_cells: usize,
    pub work_items: usize,
    pub groups: usize,
    pub grouped_cells: usize,
    pub singletons: usize,
    pub levels: usize,
    pub cross_sheet_references: usize,
    pub external_references: usize,
    pub external_files: usize,
    pub unsupported: usize,
    pub serialization_warnings: usize,
    pub removed_hardcoded_cells: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkItemEntry {
    pub position: usize,
    pub level: usize,
    pub kind: WorkItemKind,
    pub label: String,
    pub sheet: String,
    pub anchor: CellAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    pub extent: u32,
    pub formula: String,
    pub pattern: String,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossSheetReference {
    pub from: CellAddress,
    pub target_sheet: String,
    pub reference: String,
    pub formula: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalReference {
    pub from: CellAddress,
    pub file: String,
    pub sheet: String,
    pub reference: String,
    /// Composite store key of the referenced sheet
    pub store_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SheetSummary {
    pub sheet: String,
    pub formula_cells: usize,
    pub hardcoded_cells: usize,
    pub groups: usize,
    pub singletons: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub workbook: String,
    pub summary: Summary,
    pub work_items: Vec<WorkItemEntry>,
    pub cross_sheet_references: Vec<CrossSheetReference>,
    pub external_references: Vec<ExternalReference>,
    pub unsupported: Vec<FormulaDiagnostic>,
    pub serialization_warnings: Vec<SerializationWarning>,
    pub per_sheet: Vec<SheetSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<Vec<String>>,
}

impl AnalysisReport {
    /// Assemble the report from the pipeline's outputs
    pub fn build(
        workbook: &str,
        sheets: &[String],
        catalog: &CellCatalog,
        unsupported_functions: &[FormulaDiagnostic],
        schedule: &Schedule,
        cycle: Option<&Vec<String>>,
    ) -> Self {
        let mut level_of = vec![0; schedule.len()];
        for (level, positions) in schedule.levels.iter().enumerate() {
            for &position in positions {
                level_of[position] = level;
            }
        }

        let work_items: Vec<WorkItemEntry> = schedule
            .items
            .iter()
            .enumerate()
            .map(|(position, item)| {
                let anchor = item.anchor();
                let formula = catalog.formulas.get(anchor);
                let (direction, extent, pattern) = match item {
                    WorkItem::Group(group) => {
                        (Some(group.direction), group.extent, group.pattern.to_string())
                    }
                    WorkItem::Singleton(_) => (
                        None,
                        1,
                        formula.map(|f| Pattern::of(f).to_string()).unwrap_or_default(),
                    ),
                };
                WorkItemEntry {
                    position,
                    level: level_of[position],
                    kind: item.kind(),
                    label: item.label(),
                    sheet: anchor.sheet.clone(),
                    anchor: anchor.clone(),
                    direction,
                    extent,
                    formula: formula.map(|f| f.text.clone()).unwrap_or_default(),
                    pattern,
                    depends_on: schedule
                        .dependencies
                        .get(position)
                        .map(|deps| deps.iter().map(|&d| schedule.items[d].label()).collect())
                        .unwrap_or_default(),
                }
            })
            .collect();

        let mut cross_sheet_references = Vec::new();
        let mut external_references = Vec::new();
        for cell in catalog.formulas.values() {
            for reference in &cell.references {
                if let Some(file) = &reference.external_file {
                    external_references.push(ExternalReference {
                        from: cell.address.clone(),
                        file: file.clone(),
                        sheet: reference.sheet.clone(),
                        reference: reference.text.clone(),
                        store_key: reference.sheet_key(),
                    });
                } else if reference.is_cross_sheet(&cell.address.sheet) {
                    cross_sheet_references.push(CrossSheetReference {
                        from: cell.address.clone(),
                        target_sheet: reference.sheet.clone(),
                        reference: reference.text.clone(),
                        formula: cell.text.clone(),
                    });
                }
            }
        }

        let mut unsupported: Vec<FormulaDiagnostic> = catalog
            .diagnostics
            .iter()
            .chain(unsupported_functions)
            .cloned()
            .collect();
        unsupported.sort_by(|a, b| a.address.cmp(&b.address));

        let mut per_sheet: BTreeMap<&str, SheetSummary> = sheets
            .iter()
            .map(|s| {
                (
                    s.as_str(),
                    SheetSummary {
                        sheet: s.clone(),
                        ..Default::default()
                    },
                )
            })
            .collect();
        for address in catalog.formulas.keys() {
            if let Some(entry) = per_sheet.get_mut(address.sheet.as_str()) {
                entry.formula_cells += 1;
            }
        }
        for address in catalog.hardcoded.keys() {
            if let Some(entry) = per_sheet.get_mut(address.sheet.as_str()) {
                entry.hardcoded_cells += 1;
            }
        }
        for item in &schedule.items {
            if let Some(entry) = per_sheet.get_mut(item.anchor().sheet.as_str()) {
                match item {
                    WorkItem::Group(_) => entry.groups += 1,
                    WorkItem::Singleton(_) => entry.singletons += 1,
                }
            }
        }
        // Keep tab order rather than alphabetical
        let per_sheet: Vec<SheetSummary> = sheets
            .iter()
            .filter_map(|s| per_sheet.remove(s.as_str()))
            .collect();

        let groups: Vec<_> = work_items
            .iter()
            .filter(|w| w.kind == WorkItemKind::Group)
            .collect();
        let external_files = external_references
            .iter()
            .map(|r| r.file.as_str())
            .collect::<std::collections::BTreeSet<_>>()
            .len();

        let summary = Summary {
            sheets: sheets.len(),
            formula_cells: catalog.formulas.len(),
            hardcoded_cells: catalog.hardcoded.len(),
            work_items: work_items.len(),
            groups: groups.len(),
            grouped_cells: groups.iter().map(|g| g.extent as usize).sum(),
            singletons: work_items.len() - groups.len(),
            levels: schedule.levels.len(),
            cross_sheet_references: cross_sheet_references.len(),
            external_references: external_references.len(),
            external_files,
            unsupported: unsupported.len(),
            serialization_warnings: catalog.serialization_warnings.len(),
            removed_hardcoded_cells: 0,
        };

        Self {
            workbook: workbook.to_string(),
            summary,
            work_items,
            cross_sheet_references,
            external_references,
            unsupported,
            serialization_warnings: catalog.serialization_warnings.clone(),
            per_sheet,
            cycle: cycle.cloned(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
