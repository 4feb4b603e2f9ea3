//! Formula tokenizer
//!
//! Converts formula strings like "=SUM(Sheet2!B2:B9) * $C$1" into a sequence of
//! tokens. Reference tokens keep their byte spans so the pattern normaliser can
//! cut them out of the formula text.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

use crate::types::{letters_to_column, MAX_COLUMN, MAX_ROW};

/// Spreadsheet error literals, longest first so prefixes don't shadow
const ERROR_LITERALS: &[&str] = &[
    "#DIV/0!", "#VALUE!", "#NAME?", "#NULL!", "#REF!", "#NUM!", "#N/A",
];

/// A token in a formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal (e.g., 123, 45.67, 1.5e10)
    Number(f64),
    /// A string literal ("hello")
    Text(String),
    /// TRUE / FALSE
    Boolean(bool),
    /// An error literal (#N/A, #DIV/0!)
    Error(String),
    /// A function name or a defined name
    Identifier(String),
    /// A cell, range or structured reference
    Reference(RefToken),
    /// Binary/comparison operators: + - * / ^ & = <> >= <= < >
    Operator(String),
    /// Postfix percent
    Percent,
    OpenParen,
    CloseParen,
    Comma,
}

/// A coordinate exactly as written, `$` markers included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCoord {
    pub column: u32,
    pub row: u32,
    pub column_absolute: bool,
    pub row_absolute: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefShape {
    /// `A1` or `A1:B2`
    Cells { start: RawCoord, end: Option<RawCoord> },
    /// `Table[Column]`, `Table[@Column]`, `[@Column]` (empty table name)
    Structured { table: String, selector: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefToken {
    pub external_file: Option<String>,
    pub sheet: Option<String>,
    pub shape: RefShape,
    /// Whole reference text, sheet prefix included
    pub span: Range<usize>,
    /// Coordinate part only (the whole text for structured references)
    pub coord_span: Range<usize>,
}

/// Error during tokenization
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizeError {
    pub message: String,
    pub position: usize,
}

impl TokenizeError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tokenize error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for TokenizeError {}

fn coordinate_re() -> &'static Regex {
    static COORD_RE: OnceLock<Regex> = OnceLock::new();
    COORD_RE.get_or_init(|| {
        Regex::new(r"^(\$?)([A-Za-z]{1,3})(\$?)([1-9][0-9]{0,6})$").expect("valid regex")
    })
}

fn column_only_re() -> &'static Regex {
    static COLUMN_RE: OnceLock<Regex> = OnceLock::new();
    COLUMN_RE.get_or_init(|| Regex::new(r"^\$?[A-Za-z]{1,3}$").expect("valid regex"))
}

/// Parse `$B$7`-style text into a coordinate, if it is one
pub fn parse_coordinate(text: &str) -> Option<RawCoord> {
    let caps = coordinate_re().captures(text)?;
    let column = letters_to_column(caps.get(2)?.as_str())?;
    let row: u32 = caps.get(4)?.as_str().parse().ok()?;
    if column > MAX_COLUMN || row > MAX_ROW {
        return None;
    }
    Some(RawCoord {
        column,
        row,
        column_absolute: !caps.get(1)?.as_str().is_empty(),
        row_absolute: !caps.get(3)?.as_str().is_empty(),
    })
}

/// Strip the leading `=` a formula cell carries
pub fn formula_body(formula: &str) -> &str {
    formula.strip_prefix('=').unwrap_or(formula)
}

/// Tokenizer for formula expressions
pub struct Tokenizer<'a> {
    src: &'a str,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    /// Create a new tokenizer for the given formula string
    pub fn new(formula: &'a str) -> Self {
        Self {
            src: formula_body(formula),
            position: 0,
        }
    }

    /// Tokenize the entire formula into a vector of tokens
    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizeError> {
        let mut tokens = Vec::new();

        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }

        Ok(tokens)
    }

    /// Get the next token, or None if at end of input
    fn next_token(&mut self) -> Result<Option<Token>, TokenizeError> {
        self.skip_whitespace();

        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let token = match c {
            '"' => self.read_string()?,
            '\'' => self.read_quoted_reference()?,
            '[' => self.read_bracket_reference()?,
            '#' => self.read_error_literal()?,
            '(' => {
                self.advance();
                Token::OpenParen
            }
            ')' => {
                self.advance();
                Token::CloseParen
            }
            ',' => {
                self.advance();
                Token::Comma
            }
            '%' => {
                self.advance();
                Token::Percent
            }
            '+' | '-' | '*' | '/' | '^' | '&' | '=' => {
                self.advance();
                Token::Operator(c.to_string())
            }
            '<' => self.read_less_than_operator(),
            '>' => self.read_greater_than_operator(),
            '{' => {
                return Err(TokenizeError::new(
                    "Array constants are not supported",
                    self.position,
                ));
            }
            c if c.is_ascii_digit() || c == '.' => self.read_number()?,
            c if c.is_alphabetic() || c == '_' || c == '$' || c == '\\' => self.read_word()?,
            c => {
                return Err(TokenizeError::new(
                    format!("Unexpected character: '{}'", c),
                    self.position,
                ));
            }
        };
        Ok(Some(token))
    }

    fn peek(&self) -> Option<char> {
        self.src[self.position..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read a double-quoted string literal (`""` escapes a quote)
    fn read_string(&mut self) -> Result<Token, TokenizeError> {
        let start_pos = self.position;
        self.advance();
        let mut value = String::new();

        loop {
            match self.advance() {
                None => {
                    return Err(TokenizeError::new("Unterminated string literal", start_pos));
                }
                Some('"') => {
                    if self.peek() == Some('"') {
                        value.push('"');
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(c) => value.push(c),
            }
        }

        Ok(Token::Text(value))
    }

    /// Read a number (integer, decimal, or scientific notation)
    fn read_number(&mut self) -> Result<Token, TokenizeError> {
        let start_pos = self.position;

        self.eat_digits();
        if self.peek() == Some('.') {
            self.advance();
            self.eat_digits();
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let rest = &self.src[self.position + 1..];
            let signed = rest.starts_with('+') || rest.starts_with('-');
            let digits_at = if signed { 1 } else { 0 };
            if rest[digits_at..].starts_with(|c: char| c.is_ascii_digit()) {
                self.advance();
                if signed {
                    self.advance();
                }
                self.eat_digits();
            }
        }

        let num_str = &self.src[start_pos..self.position];
        if self.peek() == Some(':') {
            return Err(TokenizeError::new(
                format!("Whole-row reference '{}:...' is not supported", num_str),
                start_pos,
            ));
        }

        num_str
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| TokenizeError::new(format!("Invalid number: {}", num_str), start_pos))
    }

    fn eat_digits(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read `#DIV/0!`-style error literals
    fn read_error_literal(&mut self) -> Result<Token, TokenizeError> {
        let rest = &self.src[self.position..];
        for literal in ERROR_LITERALS {
            if rest.len() >= literal.len() && rest[..literal.len()].eq_ignore_ascii_case(literal) {
                self.position += literal.len();
                return Ok(Token::Error(literal.to_string()));
            }
        }
        Err(TokenizeError::new("Unknown error literal", self.position))
    }

    /// Read a run of name characters (letters, digits, `_`, `.`, `$`)
    fn read_name_chars(&mut self) -> &'a str {
        let start = self.position;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' || c == '$' || c == '\\' {
                self.advance();
            } else {
                break;
            }
        }
        &self.src[start..self.position]
    }

    /// Read a word: function name, boolean, coordinate, sheet prefix or table name
    fn read_word(&mut self) -> Result<Token, TokenizeError> {
        let start = self.position;
        let word = self.read_name_chars();

        match self.peek() {
            Some('!') => {
                if word.contains('$') {
                    return Err(TokenizeError::new(
                        format!("Invalid sheet name '{}'", word),
                        start,
                    ));
                }
                self.advance();
                let (shape, coord_span) = self.read_cells()?;
                return Ok(Token::Reference(RefToken {
                    external_file: None,
                    sheet: Some(word.to_string()),
                    shape,
                    span: start..self.position,
                    coord_span,
                }));
            }
            Some('[') => {
                let selector = self.read_bracket_group()?;
                return Ok(Token::Reference(RefToken {
                    external_file: None,
                    sheet: None,
                    shape: RefShape::Structured {
                        table: word.to_string(),
                        selector,
                    },
                    span: start..self.position,
                    coord_span: start..self.position,
                }));
            }
            Some('(') => return Ok(Token::Identifier(strip_future_prefix(word).to_string())),
            _ => {}
        }

        if parse_coordinate(word).is_some() {
            self.position = start;
            let (shape, coord_span) = self.read_cells()?;
            return Ok(Token::Reference(RefToken {
                external_file: None,
                sheet: None,
                shape,
                span: coord_span.clone(),
                coord_span,
            }));
        }

        if column_only_re().is_match(word) && self.peek() == Some(':') {
            return Err(TokenizeError::new(
                format!("Whole-column reference '{}:...' is not supported", word),
                start,
            ));
        }

        if word.eq_ignore_ascii_case("TRUE") {
            return Ok(Token::Boolean(true));
        }
        if word.eq_ignore_ascii_case("FALSE") {
            return Ok(Token::Boolean(false));
        }

        Ok(Token::Identifier(word.to_string()))
    }

    /// Read `A1` or `A1:B2` at the current position
    fn read_cells(&mut self) -> Result<(RefShape, Range<usize>), TokenizeError> {
        let start = self.position;
        let first = self.read_name_chars();
        let Some(start_coord) = parse_coordinate(first) else {
            let message = if column_only_re().is_match(first) && self.peek() == Some(':') {
                format!("Whole-column reference '{}:...' is not supported", first)
            } else {
                format!("Malformed cell reference '{}'", first)
            };
            return Err(TokenizeError::new(message, start));
        };

        let mut end_coord = None;
        if self.peek() == Some(':') {
            self.advance();
            let second_at = self.position;
            let second = self.read_name_chars();
            match parse_coordinate(second) {
                Some(coord) => end_coord = Some(coord),
                None => {
                    return Err(TokenizeError::new(
                        format!("Malformed range end '{}'", second),
                        second_at,
                    ));
                }
            }
        }

        Ok((
            RefShape::Cells {
                start: start_coord,
                end: end_coord,
            },
            start..self.position,
        ))
    }

    /// Read a balanced `[...]` group and return its inner text
    fn read_bracket_group(&mut self) -> Result<String, TokenizeError> {
        let start = self.position;
        self.advance();
        let inner_start = self.position;
        let mut depth = 1;

        while let Some(c) = self.advance() {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.src[inner_start..self.position - 1].to_string());
                    }
                }
                _ => {}
            }
        }

        Err(TokenizeError::new("Unterminated '[' in reference", start))
    }

    /// `[Book.xlsx]Sheet!A1` or a table-less structured reference `[@Col]`
    fn read_bracket_reference(&mut self) -> Result<Token, TokenizeError> {
        let start = self.position;
        let inner = self.read_bracket_group()?;

        let after_bracket = self.position;
        let sheet = self.read_name_chars();
        if !sheet.is_empty() && self.peek() == Some('!') {
            self.advance();
            let (shape, coord_span) = self.read_cells()?;
            return Ok(Token::Reference(RefToken {
                external_file: Some(inner),
                sheet: Some(sheet.to_string()),
                shape,
                span: start..self.position,
                coord_span,
            }));
        }
        self.position = after_bracket;

        Ok(Token::Reference(RefToken {
            external_file: None,
            sheet: None,
            shape: RefShape::Structured {
                table: String::new(),
                selector: inner,
            },
            span: start..self.position,
            coord_span: start..self.position,
        }))
    }

    /// `'Sheet Name'!A1` or `'[Book.xlsx]Sheet Name'!A1`
    fn read_quoted_reference(&mut self) -> Result<Token, TokenizeError> {
        let start = self.position;
        self.advance();
        let mut name = String::new();

        loop {
            match self.advance() {
                None => return Err(TokenizeError::new("Unterminated quoted sheet name", start)),
                Some('\'') => {
                    if self.peek() == Some('\'') {
                        name.push('\'');
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(c) => name.push(c),
            }
        }

        if self.peek() != Some('!') {
            return Err(TokenizeError::new(
                format!("Expected '!' after sheet name '{}'", name),
                self.position,
            ));
        }
        self.advance();

        let (external_file, sheet) = match name.strip_prefix('[').and_then(|n| n.split_once(']')) {
            Some((file, sheet)) => (Some(file.to_string()), sheet.to_string()),
            None => (None, name),
        };

        let (shape, coord_span) = self.read_cells()?;
        Ok(Token::Reference(RefToken {
            external_file,
            sheet: Some(sheet),
            shape,
            span: start..self.position,
            coord_span,
        }))
    }

    fn read_less_than_operator(&mut self) -> Token {
        self.advance();
        match self.peek() {
            Some('=') => {
                self.advance();
                Token::Operator("<=".to_string())
            }
            Some('>') => {
                self.advance();
                Token::Operator("<>".to_string())
            }
            _ => Token::Operator("<".to_string()),
        }
    }

    fn read_greater_than_operator(&mut self) -> Token {
        self.advance();
        match self.peek() {
            Some('=') => {
                self.advance();
                Token::Operator(">=".to_string())
            }
            _ => Token::Operator(">".to_string()),
        }
    }
}

/// Newer functions are stored as `_xlfn.CONCAT` / `_xlfn._xlws.SORT`
fn strip_future_prefix(name: &str) -> &str {
    let mut name = name;
    for prefix in ["_xlfn.", "_xlws.", "_XLFN.", "_XLWS."] {
        if let Some(rest) = name.strip_prefix(prefix) {
            name = rest;
        }
    }
    name
}

/// Convenience function to tokenize a formula string
pub fn tokenize(formula: &str) -> Result<Vec<Token>, TokenizeError> {
    Tokenizer::new(formula).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_ref(formula: &str) -> RefToken {
        let tokens = tokenize(formula).unwrap();
        match tokens.as_slice() {
            [Token::Reference(r)] => r.clone(),
            other => panic!("expected one reference, got {:?}", other),
        }
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(tokenize("42").unwrap(), vec![Token::Number(42.0)]);
        assert_eq!(tokenize("3.5").unwrap(), vec![Token::Number(3.5)]);
        assert_eq!(tokenize("1.5e10").unwrap(), vec![Token::Number(1.5e10)]);
        assert_eq!(tokenize("2E-5").unwrap(), vec![Token::Number(2e-5)]);
        assert_eq!(tokenize(".25").unwrap(), vec![Token::Number(0.25)]);
    }

    #[test]
    fn test_tokenize_string_escaped_quotes() {
        let tokens = tokenize("\"say \"\"hi\"\"\"").unwrap();
        assert_eq!(tokens, vec![Token::Text("say \"hi\"".to_string())]);
    }

    #[test]
    fn test_tokenize_cell_reference_flags() {
        let r = single_ref("=$B2");
        assert_eq!(r.span, 0..3);
        match r.shape {
            RefShape::Cells { start, end: None } => {
                assert_eq!((start.column, start.row), (2, 2));
                assert!(start.column_absolute);
                assert!(!start.row_absolute);
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn test_tokenize_range() {
        let r = single_ref("A1:$C$10");
        match r.shape {
            RefShape::Cells {
                start,
                end: Some(end),
            } => {
                assert_eq!((start.column, start.row), (1, 1));
                assert_eq!((end.column, end.row), (3, 10));
                assert!(end.column_absolute && end.row_absolute);
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn test_tokenize_sheet_prefix_keeps_spans_apart() {
        let r = single_ref("=Sheet2!B2");
        assert_eq!(r.sheet.as_deref(), Some("Sheet2"));
        assert_eq!(r.span, 0..9);
        assert_eq!(r.coord_span, 7..9);
    }

    #[test]
    fn test_tokenize_quoted_sheet() {
        let r = single_ref("'My ''Q1'' Sheet'!A1");
        assert_eq!(r.sheet.as_deref(), Some("My 'Q1' Sheet"));
        assert!(r.external_file.is_none());
    }

    #[test]
    fn test_tokenize_external_reference() {
        let r = single_ref("[Ext.xlsx]Sheet1!A1");
        assert_eq!(r.external_file.as_deref(), Some("Ext.xlsx"));
        assert_eq!(r.sheet.as_deref(), Some("Sheet1"));

        let r = single_ref("'[Prices 2024.xlsx]Raw Data'!$A$1:$B$4");
        assert_eq!(r.external_file.as_deref(), Some("Prices 2024.xlsx"));
        assert_eq!(r.sheet.as_deref(), Some("Raw Data"));
    }

    #[test]
    fn test_tokenize_structured_reference() {
        let r = single_ref("Sales[Amount]");
        assert_eq!(
            r.shape,
            RefShape::Structured {
                table: "Sales".to_string(),
                selector: "Amount".to_string()
            }
        );

        let r = single_ref("[@Amount]");
        assert_eq!(
            r.shape,
            RefShape::Structured {
                table: String::new(),
                selector: "@Amount".to_string()
            }
        );
    }

    #[test]
    fn test_tokenize_function_call_is_not_a_reference() {
        let tokens = tokenize("LOG10(A1)").unwrap();
        assert_eq!(tokens[0], Token::Identifier("LOG10".to_string()));
        assert_eq!(tokens[1], Token::OpenParen);
        assert!(matches!(tokens[2], Token::Reference(_)));
    }

    #[test]
    fn test_tokenize_strips_future_function_prefix() {
        let tokens = tokenize("_xlfn.CONCAT(A1,B1)").unwrap();
        assert_eq!(tokens[0], Token::Identifier("CONCAT".to_string()));
    }

    #[test]
    fn test_tokenize_operators() {
        let tokens = tokenize("1<>2&\"a\"<=3%").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Number(1.0),
                Token::Operator("<>".to_string()),
                Token::Number(2.0),
                Token::Operator("&".to_string()),
                Token::Text("a".to_string()),
                Token::Operator("<=".to_string()),
                Token::Number(3.0),
                Token::Percent,
            ]
        );
    }

    #[test]
    fn test_tokenize_booleans_and_errors() {
        let tokens = tokenize("IF(TRUE,#N/A,#DIV/0!)").unwrap();
        assert_eq!(tokens[2], Token::Boolean(true));
        assert_eq!(tokens[4], Token::Error("#N/A".to_string()));
        assert_eq!(tokens[6], Token::Error("#DIV/0!".to_string()));
    }

    #[test]
    fn test_tokenize_rejects_whole_column() {
        let err = tokenize("SUM(A:A)").unwrap_err();
        assert!(err.message.contains("Whole-column"));
        let err = tokenize("SUM(Data!B:B)").unwrap_err();
        assert!(err.message.contains("Whole-column"));
        let err = tokenize("SUM(1:3)").unwrap_err();
        assert!(err.message.contains("Whole-row"));
    }

    #[test]
    fn test_tokenize_rejects_array_constant() {
        let err = tokenize("SUM({1,2,3})").unwrap_err();
        assert!(err.message.contains("Array constants"));
    }

    #[test]
    fn test_tokenize_out_of_grid_is_a_name() {
        let tokens = tokenize("ZZZZ1").unwrap();
        assert_eq!(tokens, vec![Token::Identifier("ZZZZ1".to_string())]);
    }

    #[test]
    fn test_tokenize_error_unterminated_string() {
        let result = tokenize("\"hello");
        assert!(result.unwrap_err().message.contains("Unterminated"));
    }

    #[test]
    fn test_tokenize_error_malformed_range() {
        let result = tokenize("A1:foo");
        assert!(result.unwrap_err().message.contains("Malformed range end"));
    }
}
