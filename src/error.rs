use crate::types::CellAddress;
use serde::Serialize;
use thiserror::Error;

pub type ConvertResult<T> = Result<T, ConvertError>;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("{} formula(s) could not be parsed:\n{}", .0.len(), format_diagnostics(.0))]
    Parse(Vec<FormulaDiagnostic>),

    #[error("Unsupported function {function} in {address}: {formula}")]
    UnsupportedFunction {
        function: String,
        address: CellAddress,
        formula: String,
    },

    #[error("Cannot translate {address} ({formula}): {message}")]
    Translate {
        address: CellAddress,
        formula: String,
        message: String,
    },

    #[error("Circular dependency detected between: {}", .0.join(", "))]
    CircularDependency(Vec<String>),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A formula that failed the parse pass, with enough context to find it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormulaDiagnostic {
    pub address: CellAddress,
    pub formula: String,
    pub message: String,
}

impl FormulaDiagnostic {
    pub fn new(address: &CellAddress, formula: &str, message: impl Into<String>) -> Self {
        Self {
            address: address.clone(),
            formula: formula.to_string(),
            message: message.into(),
        }
    }
}

fn format_diagnostics(diagnostics: &[FormulaDiagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("  {} {}: {}", d.address, d.formula, d.message))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_lists_every_cell() {
        let err = ConvertError::Parse(vec![
            FormulaDiagnostic::new(&CellAddress::new("S", 1, 1), "=A:A", "whole-column"),
            FormulaDiagnostic::new(&CellAddress::new("S", 2, 1), "={1,2}", "array constant"),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 formula(s)"));
        assert!(msg.contains("S!A1 =A:A: whole-column"));
        assert!(msg.contains("S!B1 ={1,2}: array constant"));
    }

    #[test]
    fn test_unsupported_function_names_cell_and_text() {
        let err = ConvertError::UnsupportedFunction {
            function: "XLOOKUP".to_string(),
            address: CellAddress::new("Calc", 4, 9),
            formula: "=XLOOKUP(A1,B:B,C:C)".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported function XLOOKUP in Calc!D9: =XLOOKUP(A1,B:B,C:C)"
        );
    }
}
