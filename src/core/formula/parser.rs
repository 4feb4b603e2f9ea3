//! Formula parser
//!
//! Converts a sequence of tokens into an expression tree using recursive
//! descent with spreadsheet operator precedence. Reference tokens become
//! `Expr::Ref(slot)` nodes numbered in text order, so slot `i` is the `i`-th
//! reference the extractor reports for the same formula.

use super::tokenizer::Token;

/// Expression tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Error literal such as `#N/A`
    Error(String),
    /// Index into the formula's reference list
    Ref(usize),
    /// An omitted argument: `IF(A1,,0)`
    Missing,
    /// Function call: NAME(arg1, arg2, ...)
    Call { name: String, args: Vec<Expr> },
    /// Binary operation: left op right
    BinaryOp {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary `-` or `+`
    UnaryOp { op: String, operand: Box<Expr> },
    /// Postfix percent: expr%
    Percent(Box<Expr>),
}

impl Expr {
    /// Visit every function call name in the tree, outermost first
    pub fn function_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_function_names(&mut names);
        names
    }

    fn collect_function_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Call { name, args } => {
                names.push(name.as_str());
                for arg in args {
                    arg.collect_function_names(names);
                }
            }
            Expr::BinaryOp { left, right, .. } => {
                left.collect_function_names(names);
                right.collect_function_names(names);
            }
            Expr::UnaryOp { operand, .. } | Expr::Percent(operand) => {
                operand.collect_function_names(names)
            }
            _ => {}
        }
    }
}

/// Error during parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at token {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Parser for formula tokens
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    next_slot: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            next_slot: 0,
        }
    }

    /// Parse the tokens into an expression tree
    pub fn parse(mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new("Empty expression", 0));
        }
        let expr = self.expression()?;

        if !self.is_at_end() {
            return Err(ParseError::new(
                format!("Unexpected token after expression: {:?}", self.peek()),
                self.position,
            ));
        }

        Ok(expr)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<&Token> {
        if !self.is_at_end() {
            self.position += 1;
        }
        self.tokens.get(self.position - 1)
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_any_operator(&mut self, ops: &[&str]) -> Option<String> {
        if let Some(Token::Operator(s)) = self.peek() {
            if ops.contains(&s.as_str()) {
                let op = s.clone();
                self.advance();
                return Some(op);
            }
        }
        None
    }

    fn binary(&mut self, left: Expr, op: String, right: Expr) -> Expr {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.comparison()
    }

    /// Comparison: concat (( "=" | "<>" | "<" | ">" | "<=" | ">=" ) concat)*
    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.concat()?;

        while let Some(op) = self.match_any_operator(&["=", "<>", "<", ">", "<=", ">="]) {
            let right = self.concat()?;
            left = self.binary(left, op, right);
        }

        Ok(left)
    }

    /// Concat: term ( "&" term )*
    fn concat(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.term()?;

        while let Some(op) = self.match_any_operator(&["&"]) {
            let right = self.term()?;
            left = self.binary(left, op, right);
        }

        Ok(left)
    }

    /// Term: factor (( "+" | "-" ) factor)*
    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.factor()?;

        while let Some(op) = self.match_any_operator(&["+", "-"]) {
            let right = self.factor()?;
            left = self.binary(left, op, right);
        }

        Ok(left)
    }

    /// Factor: power (( "*" | "/" ) power)*
    fn factor(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.power()?;

        while let Some(op) = self.match_any_operator(&["*", "/"]) {
            let right = self.power()?;
            left = self.binary(left, op, right);
        }

        Ok(left)
    }

    /// Power: unary ( "^" unary )*   (left-associative, like the spreadsheet)
    fn power(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;

        while let Some(op) = self.match_any_operator(&["^"]) {
            let right = self.unary()?;
            left = self.binary(left, op, right);
        }

        Ok(left)
    }

    /// Unary: ( "-" | "+" ) unary | postfix
    ///
    /// Binds tighter than `^`, so `-2^2` is 4.
    fn unary(&mut self) -> Result<Expr, ParseError> {
        if let Some(op) = self.match_any_operator(&["-", "+"]) {
            let operand = self.unary()?;
            Ok(Expr::UnaryOp {
                op,
                operand: Box::new(operand),
            })
        } else {
            self.postfix()
        }
    }

    /// Postfix: primary "%"*
    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        while self.match_token(&Token::Percent) {
            expr = Expr::Percent(Box::new(expr));
        }
        Ok(expr)
    }

    /// Arguments: ( arg ( "," arg )* )?   where an arg may be omitted
    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();

        if let Some(Token::CloseParen) = self.peek() {
            return Ok(args);
        }

        loop {
            match self.peek() {
                Some(Token::Comma) | Some(Token::CloseParen) => args.push(Expr::Missing),
                _ => args.push(self.expression()?),
            }
            if !self.match_token(&Token::Comma) {
                break;
            }
        }

        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().cloned();

        match token {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Some(Token::Text(s)) => {
                self.advance();
                Ok(Expr::Text(s))
            }
            Some(Token::Boolean(b)) => {
                self.advance();
                Ok(Expr::Boolean(b))
            }
            Some(Token::Error(e)) => {
                self.advance();
                Ok(Expr::Error(e))
            }
            Some(Token::Reference(_)) => {
                self.advance();
                let slot = self.next_slot;
                self.next_slot += 1;
                Ok(Expr::Ref(slot))
            }
            Some(Token::Identifier(name)) => {
                self.advance();
                if !self.match_token(&Token::OpenParen) {
                    return Err(ParseError::new(
                        format!("Defined name '{}' is not supported", name),
                        self.position,
                    ));
                }
                let args = self.arguments()?;
                if !self.match_token(&Token::CloseParen) {
                    return Err(ParseError::new(
                        "Expected ')' after function arguments",
                        self.position,
                    ));
                }
                Ok(Expr::Call {
                    name: name.to_uppercase(),
                    args,
                })
            }
            Some(Token::OpenParen) => {
                self.advance();
                let expr = self.expression()?;
                if !self.match_token(&Token::CloseParen) {
                    return Err(ParseError::new(
                        "Expected ')' after expression",
                        self.position,
                    ));
                }
                Ok(expr)
            }
            Some(token) => Err(ParseError::new(
                format!("Unexpected token: {:?}", token),
                self.position,
            )),
            None => Err(ParseError::new(
                "Unexpected end of expression",
                self.position,
            )),
        }
    }
}

/// Convenience function to parse tokens into an expression tree
pub fn parse(tokens: Vec<Token>) -> Result<Expr, ParseError> {
    Parser::new(tokens).parse()
}
