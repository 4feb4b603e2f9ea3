//! Pattern normaliser
//!
//! A pattern is the position-independent form of a formula: the text with each
//! reference's coordinate part replaced by `@i`, plus one signature entry per
//! reference holding relative offsets (for relative axes) or literal
//! coordinates (for `$` axes). Dragged copies of a formula share a pattern.

use serde::Serialize;
use std::fmt;

use super::formula::FormulaCell;
use crate::types::{Axis, CellAddress, Coord, RefTarget, Reference};

/// One axis of one reference corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AxisOffset {
    /// Target minus owner along this axis
    Relative(i64),
    /// Pinned coordinate
    Absolute(u32),
}

impl AxisOffset {
    fn of(axis: Axis, target: u32, owner: u32) -> Self {
        match axis {
            Axis::Absolute => AxisOffset::Absolute(target),
            Axis::Relative => AxisOffset::Relative(target as i64 - owner as i64),
        }
    }
}

impl fmt::Display for AxisOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisOffset::Relative(d) => write!(f, "{:+}", d),
            AxisOffset::Absolute(v) => write!(f, "${}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CornerOffset {
    pub column: AxisOffset,
    pub row: AxisOffset,
}

impl CornerOffset {
    fn of(coord: &Coord, owner: &CellAddress) -> Self {
        Self {
            column: AxisOffset::of(coord.column_axis, coord.column, owner.column),
            row: AxisOffset::of(coord.row_axis, coord.row, owner.row),
        }
    }
}

/// Signature of one reference slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RefSignature {
    pub start: CornerOffset,
    /// Present for ranges
    pub end: Option<CornerOffset>,
    /// Sheet of a structured table reference; the skeleton hides it
    pub table_sheet: Option<String>,
}

/// Grouping key: structurally equal patterns denote dragged copies
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Pattern {
    pub skeleton: String,
    pub signature: Vec<RefSignature>,
}

impl Pattern {
    /// Normalise a parsed formula against its own address
    pub fn of(cell: &FormulaCell) -> Self {
        Self::from_parts(cell.body(), &cell.address, &cell.references)
    }

    pub fn from_parts(body: &str, owner: &CellAddress, references: &[Reference]) -> Self {
        let mut skeleton = String::with_capacity(body.len());
        let mut cursor = 0;
        let mut signature = Vec::with_capacity(references.len());

        for (slot, reference) in references.iter().enumerate() {
            skeleton.push_str(&body[cursor..reference.coord_span.start]);
            skeleton.push('@');
            skeleton.push_str(&slot.to_string());
            cursor = reference.coord_span.end;

            let (start, end) = match &reference.target {
                RefTarget::Cell(c) => (CornerOffset::of(c, owner), None),
                RefTarget::Range { start, end } => (
                    CornerOffset::of(start, owner),
                    Some(CornerOffset::of(end, owner)),
                ),
            };
            // Qualified yet without a visible prefix: a table on another sheet
            let hidden_sheet = reference.qualified && reference.coord_span == reference.span;
            signature.push(RefSignature {
                start,
                end,
                table_sheet: hidden_sheet.then(|| reference.sheet.clone()),
            });
        }
        skeleton.push_str(&body[cursor..]);

        Self {
            skeleton,
            signature,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.skeleton)?;
        for (i, sig) in self.signature.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "@{}=({},{})", i, sig.start.column, sig.start.row)?;
            if let Some(end) = &sig.end {
                write!(f, ":({},{})", end.column, end.row)?;
            }
        }
        write!(f, "]")
    }
}
