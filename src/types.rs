use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Largest column index a workbook can address (XFD)
pub const MAX_COLUMN: u32 = 16_384;
/// Largest row index a workbook can address
pub const MAX_ROW: u32 = 1_048_576;

//==============================================================================
// Addresses
//==============================================================================

/// Convert a 1-based column index to letters (1 → A, 27 → AA)
pub fn column_to_letters(index: u32) -> String {
    let mut result = String::new();
    let mut idx = index;

    while idx > 0 {
        let remainder = (idx - 1) % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        idx = (idx - 1) / 26;
    }

    result
}

/// Convert column letters to a 1-based index (A → 1, AA → 27)
///
/// Returns None for empty input or non-letter characters.
pub fn letters_to_column(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut result: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
        result = result.checked_mul(26)?.checked_add(digit)?;
    }
    Some(result)
}

/// Identity of one cell: sheet plus 1-based column and row.
///
/// Ordered by (sheet, row, column) so iteration walks each sheet row by row.
/// Cells of an external workbook use the composite sheet key `"<file>|<sheet>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellAddress {
    pub sheet: String,
    pub column: u32,
    pub row: u32,
}

impl CellAddress {
    pub fn new(sheet: impl Into<String>, column: u32, row: u32) -> Self {
        Self {
            sheet: sheet.into(),
            column,
            row,
        }
    }

    /// Parse an A1-style coordinate (`B7`) on the given sheet
    pub fn parse_a1(sheet: impl Into<String>, a1: &str) -> Option<Self> {
        let split = a1.find(|c: char| c.is_ascii_digit())?;
        let column = letters_to_column(&a1[..split])?;
        let row: u32 = a1[split..].parse().ok()?;
        if row == 0 || column > MAX_COLUMN || row > MAX_ROW {
            return None;
        }
        Some(Self::new(sheet, column, row))
    }

    /// `B7`
    pub fn a1(&self) -> String {
        format!("{}{}", column_to_letters(self.column), self.row)
    }

    /// Same sheet, shifted by a column/row delta
    pub fn offset(&self, d_col: i64, d_row: i64) -> Self {
        Self {
            sheet: self.sheet.clone(),
            column: (self.column as i64 + d_col) as u32,
            row: (self.row as i64 + d_row) as u32,
        }
    }
}

impl Ord for CellAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sheet
            .cmp(&other.sheet)
            .then(self.row.cmp(&other.row))
            .then(self.column.cmp(&other.column))
    }
}

impl PartialOrd for CellAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.a1())
    }
}

impl Serialize for CellAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

//==============================================================================
// References
//==============================================================================

/// Whether one axis of a coordinate is pinned (`$`) or moves when dragged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Axis {
    Absolute,
    Relative,
}

impl Axis {
    pub fn from_dollar(pinned: bool) -> Self {
        if pinned {
            Axis::Absolute
        } else {
            Axis::Relative
        }
    }
}

/// One corner of a reference with its per-axis flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coord {
    pub column: u32,
    pub row: u32,
    pub column_axis: Axis,
    pub row_axis: Axis,
}

impl Coord {
    pub fn relative(column: u32, row: u32) -> Self {
        Self {
            column,
            row,
            column_axis: Axis::Relative,
            row_axis: Axis::Relative,
        }
    }

    pub fn absolute(column: u32, row: u32) -> Self {
        Self {
            column,
            row,
            column_axis: Axis::Absolute,
            row_axis: Axis::Absolute,
        }
    }

    /// Shift the relative axes only
    pub fn shifted(&self, d_col: i64, d_row: i64) -> Self {
        let mut moved = *self;
        if self.column_axis == Axis::Relative {
            moved.column = (self.column as i64 + d_col) as u32;
        }
        if self.row_axis == Axis::Relative {
            moved.row = (self.row as i64 + d_row) as u32;
        }
        moved
    }
}

/// What a reference points at
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefTarget {
    Cell(Coord),
    Range { start: Coord, end: Coord },
}

impl RefTarget {
    pub fn corners(&self) -> (Coord, Coord) {
        match self {
            RefTarget::Cell(c) => (*c, *c),
            RefTarget::Range { start, end } => (*start, *end),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RefTarget::Cell(_) => "cell",
            RefTarget::Range { .. } => "range",
        }
    }
}

/// A reference found inside a formula, in the order it appears in the text
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// Sheet name as resolved (owner's sheet when unqualified)
    pub sheet: String,
    /// Workbook file name for `[Book.xlsx]Sheet!A1`
    pub external_file: Option<String>,
    /// Text carried an explicit `Sheet!` qualifier
    pub qualified: bool,
    pub target: RefTarget,
    /// Byte span of the whole reference in the formula body
    pub span: std::ops::Range<usize>,
    /// Byte span replaced by the placeholder in the pattern skeleton
    pub coord_span: std::ops::Range<usize>,
    /// Original text of the reference
    pub text: String,
}

impl Reference {
    /// Store key for the sheet: `"<file>|<sheet>"` for external workbooks
    pub fn sheet_key(&self) -> String {
        match &self.external_file {
            Some(file) => format!("{}|{}", file, self.sheet),
            None => self.sheet.clone(),
        }
    }

    /// Target sheet differs from the owner's sheet (external refs excluded)
    pub fn is_cross_sheet(&self, owner_sheet: &str) -> bool {
        self.external_file.is_none() && self.sheet != owner_sheet
    }

    /// The same reference as seen from a cell shifted by (d_col, d_row)
    pub fn shifted(&self, d_col: i64, d_row: i64) -> RefTarget {
        match &self.target {
            RefTarget::Cell(c) => RefTarget::Cell(c.shifted(d_col, d_row)),
            RefTarget::Range { start, end } => RefTarget::Range {
                start: start.shifted(d_col, d_row),
                end: end.shifted(d_col, d_row),
            },
        }
    }
}

//==============================================================================
// Cell values
//==============================================================================

/// Raw value as delivered by the workbook I/O layer
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Empty,
    /// Library-internal object with no literal form (error cells, data table
    /// placeholders, rich values)
    Opaque { type_name: String },
}

/// Raw cell content: a value or a formula string
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Value(RawValue),
    Formula(String),
}

/// Literal value of a hardcoded cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Null,
}

impl CellValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Integer(_) => "Integer",
            CellValue::Float(_) => "Float",
            CellValue::Boolean(_) => "Boolean",
            CellValue::Text(_) => "Text",
            CellValue::Null => "Null",
        }
    }
}

//==============================================================================
// Tables and workbook model
//==============================================================================

/// A structured table: name → sheet + data block + header names
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub sheet: String,
    /// Column index of the table's first column
    pub first_column: u32,
    /// First data row (the row after the header)
    pub first_row: u32,
    /// Last data row
    pub last_row: u32,
    /// Header names, left to right
    pub columns: Vec<String>,
}

impl TableDef {
    /// Column index of a header name (case-insensitive)
    pub fn column_index(&self, name: &str) -> Option<u32> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name.trim()))
            .map(|pos| self.first_column + pos as u32)
    }

    pub fn last_column(&self) -> u32 {
        self.first_column + self.columns.len().saturating_sub(1) as u32
    }

    /// Cell lies within the table's data block
    pub fn contains(&self, address: &CellAddress) -> bool {
        address.sheet == self.sheet
            && (self.first_row..=self.last_row).contains(&address.row)
            && (self.first_column..=self.last_column()).contains(&address.column)
    }
}

/// Workbook content as supplied by the I/O layer
#[derive(Debug, Clone, Default)]
pub struct WorkbookModel {
    /// File name of the workbook, used in the generated program's docstring
    pub name: String,
    /// Sheet names in tab order
    pub sheets: Vec<String>,
    pub cells: BTreeMap<CellAddress, RawCell>,
    /// Tables keyed by upper-cased name
    pub tables: BTreeMap<String, TableDef>,
}

impl WorkbookModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_sheet(&mut self, sheet: impl Into<String>) {
        let sheet = sheet.into();
        if !self.sheets.contains(&sheet) {
            self.sheets.push(sheet);
        }
    }

    pub fn set_value(&mut self, sheet: &str, a1: &str, value: RawValue) {
        if let Some(address) = CellAddress::parse_a1(sheet, a1) {
            self.add_sheet(sheet);
            self.cells.insert(address, RawCell::Value(value));
        }
    }

    pub fn set_number(&mut self, sheet: &str, a1: &str, value: f64) {
        let raw = if value.fract() == 0.0 && value.abs() < 1e15 {
            RawValue::Integer(value as i64)
        } else {
            RawValue::Float(value)
        };
        self.set_value(sheet, a1, raw);
    }

    pub fn set_formula(&mut self, sheet: &str, a1: &str, formula: &str) {
        if let Some(address) = CellAddress::parse_a1(sheet, a1) {
            self.add_sheet(sheet);
            let text = if formula.starts_with('=') {
                formula.to_string()
            } else {
                format!("={}", formula)
            };
            self.cells.insert(address, RawCell::Formula(text));
        }
    }

    pub fn add_table(&mut self, table: TableDef) {
        self.tables.insert(table.name.to_uppercase(), table);
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(&name.to_uppercase())
    }

    /// Table whose data block contains the cell
    pub fn table_at(&self, address: &CellAddress) -> Option<&TableDef> {
        self.tables.values().find(|t| t.contains(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters_round_trip() {
        assert_eq!(column_to_letters(1), "A");
        assert_eq!(column_to_letters(26), "Z");
        assert_eq!(column_to_letters(27), "AA");
        assert_eq!(column_to_letters(702), "ZZ");
        assert_eq!(column_to_letters(16_384), "XFD");
        assert_eq!(letters_to_column("xfd"), Some(16_384));
        assert_eq!(letters_to_column("AB"), Some(28));
        assert_eq!(letters_to_column(""), None);
        assert_eq!(letters_to_column("A1"), None);
    }

    #[test]
    fn test_address_ordering_is_row_major() {
        let mut cells = vec![
            CellAddress::new("S", 2, 1),
            CellAddress::new("S", 1, 2),
            CellAddress::new("S", 1, 1),
        ];
        cells.sort();
        assert_eq!(
            cells.iter().map(|c| c.a1()).collect::<Vec<_>>(),
            vec!["A1", "B1", "A2"]
        );
    }

    #[test]
    fn test_parse_a1() {
        let addr = CellAddress::parse_a1("Data", "AB12").unwrap();
        assert_eq!(addr, CellAddress::new("Data", 28, 12));
        assert_eq!(addr.to_string(), "Data!AB12");
        assert!(CellAddress::parse_a1("Data", "A0").is_none());
        assert!(CellAddress::parse_a1("Data", "12").is_none());
    }

    #[test]
    fn test_coord_shift_keeps_absolute_axes() {
        let coord = Coord {
            column: 2,
            row: 5,
            column_axis: Axis::Absolute,
            row_axis: Axis::Relative,
        };
        let moved = coord.shifted(3, 2);
        assert_eq!(moved.column, 2);
        assert_eq!(moved.row, 7);
    }

    #[test]
    fn test_table_lookup() {
        let mut model = WorkbookModel::new("book.xlsx");
        model.add_table(TableDef {
            name: "Sales".to_string(),
            sheet: "Data".to_string(),
            first_column: 2,
            first_row: 3,
            last_row: 10,
            columns: vec!["Region".to_string(), "Amount".to_string()],
        });
        let table = model.table("SALES").unwrap();
        assert_eq!(table.column_index("amount"), Some(3));
        assert!(model.table_at(&CellAddress::new("Data", 3, 4)).is_some());
        assert!(model.table_at(&CellAddress::new("Data", 4, 4)).is_none());
    }
}
