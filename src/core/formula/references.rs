//! Reference resolution
//!
//! Turns raw reference tokens into typed [`Reference`]s: sheet resolved against
//! the owner cell, per-axis absolute/relative flags, and structured table
//! references expanded to the cells they cover.

use regex::Regex;
use std::sync::OnceLock;

use super::tokenizer::{RawCoord, RefShape, RefToken};
use crate::types::{Axis, CellAddress, Coord, RefTarget, Reference, TableDef, WorkbookModel};

/// A reference that cannot be represented
#[derive(Debug, Clone, PartialEq)]
pub struct UnsupportedReference {
    pub text: String,
    pub message: String,
}

impl std::fmt::Display for UnsupportedReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unsupported reference '{}': {}", self.text, self.message)
    }
}

impl std::error::Error for UnsupportedReference {}

fn bracket_item_re() -> &'static Regex {
    static ITEM_RE: OnceLock<Regex> = OnceLock::new();
    ITEM_RE.get_or_init(|| Regex::new(r"\[([^\[\]]*)\]").expect("valid regex"))
}

fn to_coord(raw: RawCoord) -> Coord {
    Coord {
        column: raw.column,
        row: raw.row,
        column_axis: Axis::from_dollar(raw.column_absolute),
        row_axis: Axis::from_dollar(raw.row_absolute),
    }
}

/// Resolve one token against the formula that owns it
pub fn resolve(
    token: &RefToken,
    body: &str,
    owner: &CellAddress,
    model: &WorkbookModel,
) -> Result<Reference, UnsupportedReference> {
    let text = body[token.span.clone()].to_string();

    match &token.shape {
        RefShape::Cells { start, end } => {
            let target = match end {
                None => RefTarget::Cell(to_coord(*start)),
                Some(end) => normalise_range(to_coord(*start), to_coord(*end)),
            };
            Ok(Reference {
                sheet: token.sheet.clone().unwrap_or_else(|| owner.sheet.clone()),
                external_file: token.external_file.clone(),
                qualified: token.sheet.is_some(),
                target,
                span: token.span.clone(),
                coord_span: token.coord_span.clone(),
                text,
            })
        }
        RefShape::Structured { table, selector } => {
            let table_def = if table.is_empty() {
                model.table_at(owner)
            } else {
                model.table(table)
            };
            let Some(table_def) = table_def else {
                let message = if table.is_empty() {
                    "formula is not inside a table".to_string()
                } else {
                    format!("unknown table '{}'", table)
                };
                return Err(UnsupportedReference { text, message });
            };
            let target = structured_target(table_def, selector, owner)
                .map_err(|message| UnsupportedReference {
                    text: text.clone(),
                    message,
                })?;
            Ok(Reference {
                sheet: table_def.sheet.clone(),
                external_file: None,
                qualified: table_def.sheet != owner.sheet,
                target,
                span: token.span.clone(),
                coord_span: token.coord_span.clone(),
                text,
            })
        }
    }
}

/// Order range corners top-left to bottom-right, keeping each side's flags
fn normalise_range(a: Coord, b: Coord) -> RefTarget {
    let (left, right) = if a.column <= b.column { (a, b) } else { (b, a) };
    let (top, bottom) = if a.row <= b.row { (a, b) } else { (b, a) };
    RefTarget::Range {
        start: Coord {
            column: left.column,
            row: top.row,
            column_axis: left.column_axis,
            row_axis: top.row_axis,
        },
        end: Coord {
            column: right.column,
            row: bottom.row,
            column_axis: right.column_axis,
            row_axis: bottom.row_axis,
        },
    }
}

/// Expand `Table[selector]` into the cells it covers
///
/// Data-block selections are absolute on both axes; `@`/`#This Row`
/// selections are row-relative to the owner so they drag down a table column.
fn structured_target(
    table: &TableDef,
    selector: &str,
    owner: &CellAddress,
) -> Result<RefTarget, String> {
    let mut this_row = false;
    let mut columns: Vec<String> = Vec::new();

    let selector = selector.trim();
    if let Some(rest) = selector.strip_prefix('@') {
        this_row = true;
        let rest = rest.trim();
        let name = rest
            .strip_prefix('[')
            .and_then(|r| r.strip_suffix(']'))
            .unwrap_or(rest);
        if !name.is_empty() {
            columns.push(name.to_string());
        }
    } else if selector.contains('[') {
        for caps in bracket_item_re().captures_iter(selector) {
            let item = caps[1].trim();
            match item.to_ascii_lowercase().as_str() {
                "#this row" => this_row = true,
                "#data" => {}
                special if special.starts_with('#') => {
                    return Err(format!("'{}' selection is not supported", item));
                }
                _ => columns.push(item.to_string()),
            }
        }
    } else if selector.eq_ignore_ascii_case("#data") || selector.is_empty() {
    } else if selector.starts_with('#') {
        return Err(format!("'{}' selection is not supported", selector));
    } else {
        columns.push(selector.to_string());
    }

    let (first_col, last_col) = match columns.as_slice() {
        [] => (table.first_column, table.last_column()),
        [single] => {
            let col = lookup_column(table, single)?;
            (col, col)
        }
        [from, to] => {
            let a = lookup_column(table, from)?;
            let b = lookup_column(table, to)?;
            (a.min(b), a.max(b))
        }
        _ => return Err("too many column selectors".to_string()),
    };

    if this_row {
        if owner.sheet != table.sheet || !(table.first_row..=table.last_row).contains(&owner.row)
        {
            return Err(format!(
                "this-row selection used outside table '{}'",
                table.name
            ));
        }
        let start = Coord {
            column: first_col,
            row: owner.row,
            column_axis: Axis::Absolute,
            row_axis: Axis::Relative,
        };
        let end = Coord {
            column: last_col,
            ..start
        };
        return Ok(if first_col == last_col {
            RefTarget::Cell(start)
        } else {
            RefTarget::Range { start, end }
        });
    }

    Ok(RefTarget::Range {
        start: Coord::absolute(first_col, table.first_row),
        end: Coord::absolute(last_col, table.last_row),
    })
}

fn lookup_column(table: &TableDef, name: &str) -> Result<u32, String> {
    table
        .column_index(name)
        .ok_or_else(|| format!("table '{}' has no column '{}'", table.name, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formula::tokenizer::{tokenize, Token};

    fn model() -> WorkbookModel {
        let mut model = WorkbookModel::new("book.xlsx");
        model.add_sheet("Calc");
        model.add_table(TableDef {
            name: "Sales".to_string(),
            sheet: "Data".to_string(),
            first_column: 2,
            first_row: 2,
            last_row: 6,
            columns: vec![
                "Region".to_string(),
                "Units".to_string(),
                "Price".to_string(),
            ],
        });
        model
    }

    fn resolve_one(formula: &str, owner: &CellAddress) -> Result<Reference, UnsupportedReference> {
        let tokens = tokenize(formula).unwrap();
        let token = tokens
            .iter()
            .find_map(|t| match t {
                Token::Reference(r) => Some(r.clone()),
                _ => None,
            })
            .unwrap();
        resolve(&token, formula, owner, &model())
    }

    #[test]
    fn test_unqualified_reference_uses_owner_sheet() {
        let owner = CellAddress::new("Calc", 4, 2);
        let r = resolve_one("B$2", &owner).unwrap();
        assert_eq!(r.sheet, "Calc");
        assert!(!r.qualified);
        match r.target {
            RefTarget::Cell(c) => {
                assert_eq!(c.column_axis, Axis::Relative);
                assert_eq!(c.row_axis, Axis::Absolute);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reversed_range_is_normalised() {
        let owner = CellAddress::new("Calc", 1, 1);
        let r = resolve_one("C5:A1", &owner).unwrap();
        let (start, end) = r.target.corners();
        assert_eq!((start.column, start.row), (1, 1));
        assert_eq!((end.column, end.row), (3, 5));
    }

    #[test]
    fn test_external_sheet_key() {
        let owner = CellAddress::new("Calc", 1, 1);
        let r = resolve_one("[Ext.xlsx]Sheet1!A1", &owner).unwrap();
        assert_eq!(r.sheet_key(), "Ext.xlsx|Sheet1");
        assert!(!r.is_cross_sheet("Calc"));
    }

    #[test]
    fn test_table_column_expands_to_data_rows() {
        let owner = CellAddress::new("Calc", 1, 1);
        let r = resolve_one("Sales[Units]", &owner).unwrap();
        assert_eq!(r.sheet, "Data");
        assert!(r.qualified);
        assert_eq!(
            r.target,
            RefTarget::Range {
                start: Coord::absolute(3, 2),
                end: Coord::absolute(3, 6),
            }
        );
    }

    #[test]
    fn test_this_row_is_row_relative() {
        let owner = CellAddress::new("Data", 4, 4);
        let r = resolve_one("[@Price]", &owner).unwrap();
        match r.target {
            RefTarget::Cell(c) => {
                assert_eq!((c.column, c.row), (4, 4));
                assert_eq!(c.column_axis, Axis::Absolute);
                assert_eq!(c.row_axis, Axis::Relative);
            }
            other => panic!("unexpected {:?}", other),
        }

        let r = resolve_one("Sales[[#This Row],[Units]]", &owner).unwrap();
        assert_eq!(r.target.corners().0.column, 3);
    }

    #[test]
    fn test_column_span_selection() {
        let owner = CellAddress::new("Calc", 1, 1);
        let r = resolve_one("Sales[[Units]:[Price]]", &owner).unwrap();
        let (start, end) = r.target.corners();
        assert_eq!((start.column, end.column), (3, 4));
    }

    #[test]
    fn test_unknown_table_and_column_are_unsupported() {
        let owner = CellAddress::new("Calc", 1, 1);
        let err = resolve_one("Costs[Units]", &owner).unwrap_err();
        assert!(err.message.contains("unknown table"));
        let err = resolve_one("Sales[Margin]", &owner).unwrap_err();
        assert!(err.message.contains("no column"));
        let err = resolve_one("[@Units]", &owner).unwrap_err();
        assert!(err.message.contains("not inside a table"));
    }
}
