//! Expression translator
//!
//! Renders a parsed formula into a Python expression over the store `c`.
//! Operators go through runtime helpers (`_add`, `_eq`, `_concat`, ...) because
//! spreadsheet coercion, comparison and division-by-zero rules differ from
//! Python's. Inside a group loop, relative axes along the loop direction
//! render as offsets from the loop variable (`_r` for rows, `_c` for columns).

pub mod functions;

use std::fmt;

use super::formula::{Expr, FormulaCell};
use super::grouping::Direction;
use crate::types::{Axis, CellAddress, Coord, RefTarget, Reference};
use functions::{Form, FunctionSpec};

/// Loop variable for vertical groups
pub const ROW_VAR: &str = "_r";
/// Loop variable for horizontal groups
pub const COLUMN_VAR: &str = "_c";

#[derive(Debug, Clone, PartialEq)]
pub enum TranslateError {
    UnsupportedFunction(String),
    Arity {
        function: String,
        expected: String,
        got: usize,
    },
    Invalid(String),
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateError::UnsupportedFunction(name) => {
                write!(f, "function {} is not supported", name)
            }
            TranslateError::Arity {
                function,
                expected,
                got,
            } => write!(
                f,
                "{} takes {} argument(s), got {}",
                function, expected, got
            ),
            TranslateError::Invalid(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for TranslateError {}

/// Python string literal
pub fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Python numeric literal
pub fn py_number(n: f64) -> String {
    if n.is_nan() {
        "float(\"nan\")".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "float(\"inf\")".to_string()
        } else {
            "float(\"-inf\")".to_string()
        }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{:?}", n)
    }
}

/// `base`, `base + 3` or `base - 2`
fn offset_expr(base: &str, delta: i64) -> String {
    match delta {
        0 => base.to_string(),
        d if d > 0 => format!("{} + {}", base, d),
        d => format!("{} - {}", base, -d),
    }
}

/// Renders expressions for one formula, optionally inside a group loop
///
/// `owner` is the formula's own cell; for groups it is the anchor, and the
/// loop variable stands for the member's index along `direction`.
pub struct Translator<'a> {
    owner: &'a CellAddress,
    references: &'a [Reference],
    direction: Option<Direction>,
}

impl<'a> Translator<'a> {
    pub fn new(cell: &'a FormulaCell, direction: Option<Direction>) -> Self {
        Self {
            owner: &cell.address,
            references: &cell.references,
            direction,
        }
    }

    /// Translate the whole formula
    pub fn translate(&self, expr: &Expr) -> Result<String, TranslateError> {
        self.render(expr)
    }

    /// Column expression for a coordinate
    fn column_expr(&self, coord: &Coord) -> String {
        match (self.direction, coord.column_axis) {
            (Some(Direction::Horizontal), Axis::Relative) => offset_expr(
                COLUMN_VAR,
                coord.column as i64 - self.owner.column as i64,
            ),
            _ => coord.column.to_string(),
        }
    }

    /// Row expression for a coordinate
    fn row_expr(&self, coord: &Coord) -> String {
        match (self.direction, coord.row_axis) {
            (Some(Direction::Vertical), Axis::Relative) => {
                offset_expr(ROW_VAR, coord.row as i64 - self.owner.row as i64)
            }
            _ => coord.row.to_string(),
        }
    }

    /// Store key of the owner cell: `("Sheet1", 4, _r)`
    pub fn owner_key(&self) -> String {
        let coord = Coord::relative(self.owner.column, self.owner.row);
        format!(
            "({}, {}, {})",
            py_str(&self.owner.sheet),
            self.column_expr(&coord),
            self.row_expr(&coord)
        )
    }

    fn reference(&self, slot: usize) -> Result<&'a Reference, TranslateError> {
        self.references.get(slot).ok_or_else(|| {
            TranslateError::Invalid(format!("reference slot @{} out of range", slot))
        })
    }

    fn render_reference(&self, slot: usize) -> Result<String, TranslateError> {
        let reference = self.reference(slot)?;
        let sheet = py_str(&reference.sheet_key());
        Ok(match &reference.target {
            RefTarget::Cell(coord) => format!(
                "c.get(({}, {}, {}))",
                sheet,
                self.column_expr(coord),
                self.row_expr(coord)
            ),
            RefTarget::Range { start, end } => format!(
                "_rng(c, {}, {}, {}, {}, {})",
                sheet,
                self.column_expr(start),
                self.row_expr(start),
                self.column_expr(end),
                self.row_expr(end)
            ),
        })
    }

    fn render(&self, expr: &Expr) -> Result<String, TranslateError> {
        Ok(match expr {
            Expr::Number(n) => py_number(*n),
            Expr::Text(s) => py_str(s),
            Expr::Boolean(true) => "True".to_string(),
            Expr::Boolean(false) => "False".to_string(),
            Expr::Error(e) => format!("XlError({})", py_str(e)),
            Expr::Missing => "None".to_string(),
            Expr::Ref(slot) => self.render_reference(*slot)?,
            Expr::Percent(inner) => format!("_percent({})", self.render(inner)?),
            Expr::UnaryOp { op, operand } => {
                let inner = self.render(operand)?;
                match op.as_str() {
                    "-" => format!("_neg({})", inner),
                    _ => format!("_pos({})", inner),
                }
            }
            Expr::BinaryOp { .. } => self.render_binary(expr)?,
            Expr::Call { name, args } => self.render_call(name, args)?,
        })
    }

    /// `a + b` renders as `_add(a, b)`; longer left-associated chains such as
    /// `a + b - c + d` render flat as `_chain(a, _add, b, _sub, c, _add, d)`
    /// so the nesting depth of the Python source stays constant.
    fn render_binary(&self, expr: &Expr) -> Result<String, TranslateError> {
        let mut steps = Vec::new();
        let mut head = expr;
        while let Expr::BinaryOp { op, left, right } = head {
            steps.push((operator_helper(op)?, right.as_ref()));
            head = left.as_ref();
        }
        steps.reverse();

        let first = self.render(head)?;
        if let [(helper, right)] = steps.as_slice() {
            return Ok(format!("{}({}, {})", helper, first, self.render(right)?));
        }
        let mut parts = vec![first];
        for (helper, right) in steps {
            parts.push(helper.to_string());
            parts.push(self.render(right)?);
        }
        Ok(format!("_chain({})", parts.join(", ")))
    }

    /// Aggregate argument: a single-cell reference becomes a 1x1 range so the
    /// runtime skips text and booleans in it, as it does for any range
    fn render_aggregate_arg(&self, arg: &Expr) -> Result<String, TranslateError> {
        if let Expr::Ref(slot) = arg {
            let reference = self.reference(*slot)?;
            if let RefTarget::Cell(coord) = &reference.target {
                let column = self.column_expr(coord);
                let row = self.row_expr(coord);
                return Ok(format!(
                    "_rng(c, {}, {}, {}, {}, {})",
                    py_str(&reference.sheet_key()),
                    column,
                    row,
                    column,
                    row
                ));
            }
        }
        self.render(arg)
    }

    fn render_call(&self, name: &str, args: &[Expr]) -> Result<String, TranslateError> {
        let spec = functions::lookup(name)
            .ok_or_else(|| TranslateError::UnsupportedFunction(name.to_string()))?;
        if !spec.accepts(args.len()) {
            return Err(TranslateError::Arity {
                function: name.to_string(),
                expected: spec.arity_text(),
                got: args.len(),
            });
        }

        match spec.form {
            Form::Constant => Ok(spec.helper.to_string()),
            Form::Position => self.render_position(spec, args),
            Form::Call => {
                let rendered = args
                    .iter()
                    .map(|a| self.render(a))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("{}({})", spec.helper, rendered.join(", ")))
            }
            Form::Aggregate => {
                let rendered = args
                    .iter()
                    .map(|a| self.render_aggregate_arg(a))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("{}({})", spec.helper, rendered.join(", ")))
            }
            Form::Lazy(from) => {
                let mut rendered = args
                    .iter()
                    .enumerate()
                    .map(|(i, a)| {
                        if i < from {
                            return self.render(a);
                        }
                        // An empty branch evaluates to 0
                        let body = match a {
                            Expr::Missing => "0".to_string(),
                            other => self.render(other)?,
                        };
                        Ok(format!("lambda: {}", body))
                    })
                    .collect::<Result<Vec<_>, TranslateError>>()?;
                if spec.name == "IF" && args.len() == 2 {
                    rendered.push("lambda: False".to_string());
                }
                Ok(format!("{}({})", spec.helper, rendered.join(", ")))
            }
        }
    }

    /// ROW() / COLUMN(), with or without a reference argument
    fn render_position(&self, spec: &FunctionSpec, args: &[Expr]) -> Result<String, TranslateError> {
        let coord = match args.first() {
            None => Coord::relative(self.owner.column, self.owner.row),
            Some(Expr::Ref(slot)) => self.reference(*slot)?.target.corners().0,
            Some(_) => {
                return Err(TranslateError::Invalid(format!(
                    "{} expects a cell reference",
                    spec.name
                )))
            }
        };
        Ok(if spec.name == "ROW" {
            self.row_expr(&coord)
        } else {
            self.column_expr(&coord)
        })
    }
}

fn operator_helper(op: &str) -> Result<&'static str, TranslateError> {
    Ok(match op {
        "+" => "_add",
        "-" => "_sub",
        "*" => "_mul",
        "/" => "_div",
        "^" => "_pow",
        "&" => "_concat",
        "=" => "_eq",
        "<>" => "_ne",
        "<" => "_lt",
        ">" => "_gt",
        "<=" => "_le",
        ">=" => "_ge",
        other => {
            return Err(TranslateError::Invalid(format!(
                "unknown operator '{}'",
                other
            )))
        }
    })
}

/// Translate a formula cell, outside any loop
pub fn translate(cell: &FormulaCell) -> Result<String, TranslateError> {
    Translator::new(cell, None).translate(&cell.expr)
}
