//! Formula front end: tokenizer, reference resolution and parser
//!
//! `FormulaCell::parse` is the single entry point used by the parse pass. It
//! tokenizes the text once and derives both the ordered reference list and
//! the expression tree from the same token stream, so reference slot `i` in
//! the tree is always `references[i]`.

pub mod parser;
pub mod references;
pub mod tokenizer;

pub use parser::Expr;
pub use tokenizer::formula_body;

use crate::error::FormulaDiagnostic;
use crate::types::{CellAddress, Reference, WorkbookModel};
use tokenizer::Token;

/// A formula cell after the parse pass; immutable from here on
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaCell {
    pub address: CellAddress,
    /// Formula text as stored in the workbook, leading `=` included
    pub text: String,
    /// References in left-to-right text order
    pub references: Vec<Reference>,
    pub expr: Expr,
}

impl FormulaCell {
    /// Tokenize, resolve references and parse one formula
    pub fn parse(
        address: &CellAddress,
        text: &str,
        model: &WorkbookModel,
    ) -> Result<Self, FormulaDiagnostic> {
        let body = formula_body(text);
        let tokens = tokenizer::tokenize(text)
            .map_err(|e| FormulaDiagnostic::new(address, text, e.message))?;

        let mut references = Vec::new();
        for token in &tokens {
            if let Token::Reference(raw) = token {
                let reference = references::resolve(raw, body, address, model)
                    .map_err(|e| FormulaDiagnostic::new(address, text, e.to_string()))?;
                references.push(reference);
            }
        }

        let expr =
            parser::parse(tokens).map_err(|e| FormulaDiagnostic::new(address, text, e.message))?;

        Ok(Self {
            address: address.clone(),
            text: text.to_string(),
            references,
            expr,
        })
    }

    /// Formula text without the leading `=`
    pub fn body(&self) -> &str {
        formula_body(&self.text)
    }
}
