//! Closed function table
//!
//! Every spreadsheet function the compiler accepts, with its arity and the
//! runtime helper that implements it. Anything not listed here is rejected.

/// How a call is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    /// `helper(arg, ...)`
    Call,
    /// `helper(arg, ...)` where single-cell references are passed as ranges
    Aggregate,
    /// `helper(...)` with every argument from this index on wrapped in `lambda:`
    Lazy(usize),
    /// Fixed expression, no arguments
    Constant,
    /// ROW / COLUMN: rendered from the owner or the referenced coordinate
    Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: &'static str,
    /// Runtime helper name (or the literal expression for `Form::Constant`)
    pub helper: &'static str,
    pub min_args: usize,
    /// None: variadic
    pub max_args: Option<usize>,
    pub form: Form,
}

impl FunctionSpec {
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }

    pub fn arity_text(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => format!("{}", max),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }
}

const fn f(
    name: &'static str,
    helper: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    form: Form,
) -> FunctionSpec {
    FunctionSpec {
        name,
        helper,
        min_args,
        max_args,
        form,
    }
}

use Form::*;

pub const FUNCTIONS: &[FunctionSpec] = &[
    // Aggregates
    f("SUM", "xl_sum", 1, None, Aggregate),
    f("AVERAGE", "xl_average", 1, None, Aggregate),
    f("COUNT", "xl_count", 1, None, Aggregate),
    f("COUNTA", "xl_counta", 1, None, Aggregate),
    f("COUNTBLANK", "xl_countblank", 1, Some(1), Call),
    f("MIN", "xl_min", 1, None, Aggregate),
    f("MAX", "xl_max", 1, None, Aggregate),
    f("PRODUCT", "xl_product", 1, None, Aggregate),
    f("MEDIAN", "xl_median", 1, None, Aggregate),
    f("LARGE", "xl_large", 2, Some(2), Aggregate),
    f("SMALL", "xl_small", 2, Some(2), Aggregate),
    f("SUMPRODUCT", "xl_sumproduct", 1, None, Aggregate),
    // Conditional aggregates
    f("SUMIF", "xl_sumif", 2, Some(3), Call),
    f("SUMIFS", "xl_sumifs", 3, None, Call),
    f("COUNTIF", "xl_countif", 2, Some(2), Call),
    f("COUNTIFS", "xl_countifs", 2, None, Call),
    f("AVERAGEIF", "xl_averageif", 2, Some(3), Call),
    f("AVERAGEIFS", "xl_averageifs", 3, None, Call),
    f("MAXIFS", "xl_maxifs", 3, None, Call),
    f("MINIFS", "xl_minifs", 3, None, Call),
    // Logic and information
    f("IF", "xl_if", 2, Some(3), Lazy(1)),
    f("IFERROR", "xl_iferror", 2, Some(2), Lazy(0)),
    f("IFNA", "xl_ifna", 2, Some(2), Lazy(0)),
    f("AND", "xl_and", 1, None, Aggregate),
    f("OR", "xl_or", 1, None, Aggregate),
    f("NOT", "xl_not", 1, Some(1), Call),
    f("TRUE", "True", 0, Some(0), Constant),
    f("FALSE", "False", 0, Some(0), Constant),
    f("ISBLANK", "xl_isblank", 1, Some(1), Call),
    f("ISERROR", "xl_iserror", 1, Some(1), Lazy(0)),
    f("ISNA", "xl_isna", 1, Some(1), Lazy(0)),
    f("ISNUMBER", "xl_isnumber", 1, Some(1), Call),
    f("ISTEXT", "xl_istext", 1, Some(1), Call),
    f("NA", "XlError(\"#N/A\")", 0, Some(0), Constant),
    // Math
    f("ABS", "xl_abs", 1, Some(1), Call),
    f("ROUND", "xl_round", 2, Some(2), Call),
    f("ROUNDUP", "xl_roundup", 2, Some(2), Call),
    f("ROUNDDOWN", "xl_rounddown", 2, Some(2), Call),
    f("INT", "xl_int", 1, Some(1), Call),
    f("MOD", "xl_mod", 2, Some(2), Call),
    f("POWER", "xl_power", 2, Some(2), Call),
    f("SQRT", "xl_sqrt", 1, Some(1), Call),
    f("EXP", "xl_exp", 1, Some(1), Call),
    f("LN", "xl_ln", 1, Some(1), Call),
    f("LOG", "xl_log", 1, Some(2), Call),
    f("LOG10", "xl_log10", 1, Some(1), Call),
    f("CEILING", "xl_ceiling", 1, Some(2), Call),
    f("FLOOR", "xl_floor", 1, Some(2), Call),
    f("SIGN", "xl_sign", 1, Some(1), Call),
    f("PI", "math.pi", 0, Some(0), Constant),
    // Text
    f("LEN", "xl_len", 1, Some(1), Call),
    f("LEFT", "xl_left", 1, Some(2), Call),
    f("RIGHT", "xl_right", 1, Some(2), Call),
    f("MID", "xl_mid", 3, Some(3), Call),
    f("UPPER", "xl_upper", 1, Some(1), Call),
    f("LOWER", "xl_lower", 1, Some(1), Call),
    f("TRIM", "xl_trim", 1, Some(1), Call),
    f("CONCATENATE", "xl_concat", 1, None, Call),
    f("CONCAT", "xl_concat", 1, None, Call),
    f("VALUE", "xl_value", 1, Some(1), Call),
    f("FIND", "xl_find", 2, Some(3), Call),
    f("SEARCH", "xl_search", 2, Some(3), Call),
    f("SUBSTITUTE", "xl_substitute", 3, Some(4), Call),
    f("REPT", "xl_rept", 2, Some(2), Call),
    f("TEXT", "xl_text", 2, Some(2), Call),
    // Lookup and reference
    f("VLOOKUP", "xl_vlookup", 3, Some(4), Call),
    f("HLOOKUP", "xl_hlookup", 3, Some(4), Call),
    f("INDEX", "xl_index", 2, Some(3), Call),
    f("MATCH", "xl_match", 2, Some(3), Call),
    f("CHOOSE", "xl_choose", 2, None, Lazy(1)),
    f("ROWS", "xl_rows", 1, Some(1), Call),
    f("COLUMNS", "xl_columns", 1, Some(1), Call),
    f("ROW", "row", 0, Some(1), Position),
    f("COLUMN", "column", 0, Some(1), Position),
    // Dates
    f("DATE", "xl_date", 3, Some(3), Call),
    f("YEAR", "xl_year", 1, Some(1), Call),
    f("MONTH", "xl_month", 1, Some(1), Call),
    f("DAY", "xl_day", 1, Some(1), Call),
    f("EDATE", "xl_edate", 2, Some(2), Call),
    f("EOMONTH", "xl_eomonth", 2, Some(2), Call),
    f("TODAY", "xl_today", 0, Some(0), Call),
    f("NOW", "xl_now", 0, Some(0), Call),
    f("DATEDIF", "xl_datedif", 3, Some(3), Call),
    // Finance
    f("PMT", "xl_pmt", 3, Some(5), Call),
    f("NPV", "xl_npv", 2, None, Aggregate),
];

/// Look up a function by its upper-cased name
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.iter().find(|spec| spec.name == name)
}

/// Whether the name has a translation
pub fn is_supported(name: &str) -> bool {
    lookup(name).is_some()
}
