//! Parse pass: classify every workbook cell as hardcoded or formula
//!
//! Hardcoded values are type-gated here. Anything without a literal form in
//! the generated program becomes null and is recorded as a serialization
//! warning instead of leaking into the emitted source.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::formula::FormulaCell;
use crate::error::FormulaDiagnostic;
use crate::types::{CellAddress, CellValue, RawCell, RawValue, WorkbookModel};

/// A literal cell
#[derive(Debug, Clone, PartialEq)]
pub struct HardcodedCell {
    pub address: CellAddress,
    pub value: CellValue,
}

/// A hardcoded value that had no literal form and was replaced by null
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerializationWarning {
    pub address: CellAddress,
    pub type_name: String,
}

/// Every cell of the workbook after the parse pass
#[derive(Debug, Clone, Default)]
pub struct CellCatalog {
    pub hardcoded: BTreeMap<CellAddress, HardcodedCell>,
    pub formulas: BTreeMap<CellAddress, FormulaCell>,
    /// Formulas that failed to tokenize, resolve or parse
    pub diagnostics: Vec<FormulaDiagnostic>,
    pub serialization_warnings: Vec<SerializationWarning>,
}

impl CellCatalog {
    /// Run the parse pass over the whole model. Never aborts; failures are
    /// collected in `diagnostics`.
    pub fn build(model: &WorkbookModel) -> Self {
        let mut catalog = CellCatalog::default();

        for (address, raw) in &model.cells {
            match raw {
                RawCell::Formula(text) => match FormulaCell::parse(address, text, model) {
                    Ok(cell) => {
                        catalog.formulas.insert(address.clone(), cell);
                    }
                    Err(diagnostic) => {
                        debug!(address = %address, "formula rejected: {}", diagnostic.message);
                        catalog.diagnostics.push(diagnostic);
                    }
                },
                RawCell::Value(RawValue::Empty) => {}
                RawCell::Value(value) => {
                    let (value, warning) = gate_value(address, value);
                    if let Some(warning) = warning {
                        catalog.serialization_warnings.push(warning);
                    }
                    catalog.hardcoded.insert(
                        address.clone(),
                        HardcodedCell {
                            address: address.clone(),
                            value,
                        },
                    );
                }
            }
        }

        catalog
    }
}

/// Coerce a raw value to a literal, or null with a warning
pub fn gate_value(
    address: &CellAddress,
    raw: &RawValue,
) -> (CellValue, Option<SerializationWarning>) {
    let rejected = |type_name: &str| {
        warn!(
            address = %address,
            type_name,
            "hardcoded value has no literal form, writing null"
        );
        (
            CellValue::Null,
            Some(SerializationWarning {
                address: address.clone(),
                type_name: type_name.to_string(),
            }),
        )
    };

    match raw {
        RawValue::Integer(i) => (CellValue::Integer(*i), None),
        RawValue::Float(f) if f.is_finite() => (CellValue::Float(*f), None),
        RawValue::Float(_) => rejected("NonFiniteFloat"),
        RawValue::Boolean(b) => (CellValue::Boolean(*b), None),
        RawValue::Text(s) => (CellValue::Text(s.clone()), None),
        RawValue::Empty => (CellValue::Null, None),
        RawValue::Opaque { type_name } => rejected(type_name),
    }
}
