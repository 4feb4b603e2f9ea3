//! Numeric round-trip: run the generated program and compare its results
//!
//! Needs a `python3` on PATH; each test returns early when none is found.

use royalbit_xl2py::core::Converter;
use royalbit_xl2py::types::{RawValue, WorkbookModel};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn python_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Values and diagnostics after running the program, keyed by "Sheet!col!row"
struct Outcome {
    values: BTreeMap<String, Value>,
    diagnostics: BTreeMap<String, Value>,
}

impl Outcome {
    fn get(&self, sheet: &str, col: u32, row: u32) -> &Value {
        self.values
            .get(&format!("{}!{}!{}", sheet, col, row))
            .unwrap_or(&Value::Null)
    }

    fn number(&self, sheet: &str, col: u32, row: u32) -> f64 {
        self.get(sheet, col, row)
            .as_f64()
            .unwrap_or_else(|| panic!("{}!{}!{} is not a number", sheet, col, row))
    }
}

const DRIVER: &str = r#"
import json, runpy, sys
ns = runpy.run_path(sys.argv[1])
c, diag = ns["run"]()
key = lambda k: "%s!%d!%d" % k
print(json.dumps({
    "values": {key(k): ns["_to_workbook"](v) for k, v in c.items()},
    "diagnostics": {key(k): v for k, v in diag.items()},
}))
"#;

fn run_program(model: &WorkbookModel) -> Option<Outcome> {
    if !python_available() {
        eprintln!("python3 not found, skipping");
        return None;
    }
    let conversion = Converter::default().convert(model).unwrap();
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("calculate.py");
    fs::write(&script, &conversion.program).unwrap();

    let output = Command::new("python3")
        .arg("-c")
        .arg(DRIVER)
        .arg(&script)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "program failed:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let parsed: Value = serde_json::from_slice(&output.stdout).unwrap();
    let to_map = |v: &Value| -> BTreeMap<String, Value> {
        v.as_object()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    };
    Some(Outcome {
        values: to_map(&parsed["values"]),
        diagnostics: to_map(&parsed["diagnostics"]),
    })
}

#[test]
fn test_vectorised_difference_matches_elementwise() {
    let mut model = WorkbookModel::new("difference.xlsx");
    let inputs = [(10.0, 4.0), (25.0, 5.5), (7.0, 9.0), (100.0, 0.25), (3.0, 3.0)];
    for (i, (b, c)) in inputs.iter().enumerate() {
        let r = i + 2;
        model.set_number("Sheet1", &format!("B{}", r), *b);
        model.set_number("Sheet1", &format!("C{}", r), *c);
        model.set_formula("Sheet1", &format!("D{}", r), &format!("=B{}-C{}", r, r));
    }
    let Some(outcome) = run_program(&model) else {
        return;
    };
    for (i, (b, c)) in inputs.iter().enumerate() {
        let row = i as u32 + 2;
        assert!((outcome.number("Sheet1", 4, row) - (b - c)).abs() < 1e-9);
    }
    assert!(outcome.diagnostics.is_empty());
}

#[test]
fn test_running_total_and_cross_sheet_aggregate() {
    let mut model = WorkbookModel::new("totals.xlsx");
    for r in 1..=5 {
        model.set_number("Data", &format!("A{}", r), r as f64);
    }
    model.set_formula("Data", "B1", "=A1");
    for r in 2..=5 {
        model.set_formula("Data", &format!("B{}", r), &format!("=B{}+A{}", r - 1, r));
    }
    model.set_formula("Summary", "A1", "=SUM(Data!A1:A5)");
    model.set_formula("Summary", "A2", "=Data!B5=Summary!A1");
    model.set_formula("Summary", "A3", "=ROUND(AVERAGE(Data!B1:B5),2)");

    let Some(outcome) = run_program(&model) else {
        return;
    };
    let running: Vec<f64> = (1..=5).map(|r| outcome.number("Data", 2, r)).collect();
    assert_eq!(running, vec![1.0, 3.0, 6.0, 10.0, 15.0]);
    assert_eq!(outcome.number("Summary", 1, 1), 15.0);
    assert_eq!(outcome.get("Summary", 1, 2), &Value::Bool(true));
    assert_eq!(outcome.number("Summary", 1, 3), 7.0);
}

#[test]
fn test_spreadsheet_semantics_survive() {
    let mut model = WorkbookModel::new("semantics.xlsx");
    model.set_number("Sheet1", "A1", 0.0);
    model.set_value("Sheet1", "A2", RawValue::Text("x".into()));
    model.set_number("Sheet1", "A3", 4.0);
    model.set_formula("Sheet1", "B1", "=10/A1");
    model.set_formula("Sheet1", "B2", "=IFERROR(10/A1,-1)");
    model.set_formula("Sheet1", "B3", "=SUM(A1:A3)");
    model.set_formula("Sheet1", "B4", "=\"n=\"&A3");
    model.set_formula("Sheet1", "B5", "=IF(A3>3,\"big\",\"small\")");
    model.set_formula("Sheet1", "B6", "=COUNTA(A1:A3)");

    let Some(outcome) = run_program(&model) else {
        return;
    };
    assert_eq!(outcome.get("Sheet1", 2, 1), &Value::String("#DIV/0!".into()));
    assert_eq!(outcome.number("Sheet1", 2, 2), -1.0);
    assert_eq!(outcome.number("Sheet1", 2, 3), 4.0);
    assert_eq!(outcome.get("Sheet1", 2, 4), &Value::String("n=4".into()));
    assert_eq!(outcome.get("Sheet1", 2, 5), &Value::String("big".into()));
    assert_eq!(outcome.number("Sheet1", 2, 6), 3.0);
}

#[test]
fn test_lookup_over_table_of_rates() {
    let mut model = WorkbookModel::new("lookup.xlsx");
    let rates = [("EUR", 1.1), ("GBP", 1.3), ("JPY", 0.007)];
    for (i, (code, rate)) in rates.iter().enumerate() {
        let r = i + 1;
        model.set_value("Rates", &format!("A{}", r), RawValue::Text(code.to_string()));
        model.set_number("Rates", &format!("B{}", r), *rate);
    }
    model.set_value("Sheet1", "A1", RawValue::Text("GBP".into()));
    model.set_value("Sheet1", "A2", RawValue::Text("CHF".into()));
    for r in 1..=2 {
        model.set_formula(
            "Sheet1",
            &format!("B{}", r),
            &format!("=VLOOKUP(A{},Rates!$A$1:$B$3,2,FALSE)", r),
        );
        model.set_formula(
            "Sheet1",
            &format!("C{}", r),
            &format!("=IFNA(INDEX(Rates!$B$1:$B$3,MATCH(A{},Rates!$A$1:$A$3,0)),0)", r),
        );
    }

    let Some(outcome) = run_program(&model) else {
        return;
    };
    assert_eq!(outcome.number("Sheet1", 2, 1), 1.3);
    assert_eq!(outcome.get("Sheet1", 2, 2), &Value::String("#N/A".into()));
    assert_eq!(outcome.number("Sheet1", 3, 1), 1.3);
    assert_eq!(outcome.number("Sheet1", 3, 2), 0.0);
}

#[test]
fn test_aggregates_skip_text_and_booleans_in_referenced_cells() {
    let mut model = WorkbookModel::new("aggregates.xlsx");
    model.set_value("Sheet1", "A1", RawValue::Text("5".into()));
    model.set_value("Sheet1", "A2", RawValue::Boolean(true));
    model.set_number("Sheet1", "A3", 4.0);
    model.set_formula("Sheet1", "B1", "=SUM(A1,A2,A3)");
    model.set_formula("Sheet1", "B2", "=AVERAGE(A1,A3)");
    model.set_formula("Sheet1", "B3", "=MAX(A1,A3)");
    model.set_formula("Sheet1", "B4", "=SUM(A1:A3)");
    model.set_formula("Sheet1", "B5", "=SUMPRODUCT(A1:A3,A1:A3)");
    // Literals are still coerced
    model.set_formula("Sheet1", "B6", "=SUM(TRUE,\"2\",A3)");
    model.set_formula("Sheet1", "B7", "=COUNT(A1,A2,A3)");

    let Some(outcome) = run_program(&model) else {
        return;
    };
    assert_eq!(outcome.number("Sheet1", 2, 1), 4.0);
    assert_eq!(outcome.number("Sheet1", 2, 2), 4.0);
    assert_eq!(outcome.number("Sheet1", 2, 3), 4.0);
    assert_eq!(outcome.number("Sheet1", 2, 4), 4.0);
    assert_eq!(outcome.number("Sheet1", 2, 5), 16.0);
    assert_eq!(outcome.number("Sheet1", 2, 6), 7.0);
    assert_eq!(outcome.number("Sheet1", 2, 7), 1.0);
}

#[test]
fn test_long_addition_chain_compiles_and_runs() {
    let mut model = WorkbookModel::new("chain.xlsx");
    for r in 1..=250 {
        model.set_number("Sheet1", &format!("A{}", r), r as f64);
    }
    let terms: Vec<String> = (1..=250).map(|r| format!("A{}", r)).collect();
    model.set_formula("Sheet1", "B1", &format!("={}", terms.join("+")));
    model.set_formula("Sheet1", "C1", "=A1*2-A2+A3*A4");

    let Some(outcome) = run_program(&model) else {
        return;
    };
    assert_eq!(outcome.number("Sheet1", 2, 1), 31375.0);
    assert_eq!(outcome.number("Sheet1", 3, 1), 12.0);
}

#[test]
fn test_text_now_and_datedif() {
    let mut model = WorkbookModel::new("dates.xlsx");
    model.set_formula("Sheet1", "A1", "=DATE(2020,1,15)");
    model.set_formula("Sheet1", "A2", "=DATE(2024,3,10)");
    model.set_formula("Sheet1", "B1", r##"=TEXT(1234.567,"#,##0.00")"##);
    model.set_formula("Sheet1", "B2", r#"=TEXT(0.256,"0.0%")"#);
    model.set_formula("Sheet1", "B3", r#"=TEXT(A2,"yyyy-mm-dd")"#);
    model.set_formula("Sheet1", "B4", r#"=TEXT(A2+0.75,"dd mmm yyyy h:mm AM/PM")"#);
    model.set_formula("Sheet1", "B5", r#"=TEXT(-1234.5,"$#,##0")"#);
    model.set_formula("Sheet1", "C1", r#"=DATEDIF(A1,A2,"Y")"#);
    model.set_formula("Sheet1", "C2", r#"=DATEDIF(A1,A2,"M")"#);
    model.set_formula("Sheet1", "C3", r#"=DATEDIF(A1,A2,"D")"#);
    model.set_formula("Sheet1", "C4", r#"=DATEDIF(A1,A2,"YM")"#);
    model.set_formula("Sheet1", "C5", r#"=DATEDIF(A1,A2,"YD")"#);
    model.set_formula("Sheet1", "C6", r#"=DATEDIF(A1,A2,"MD")"#);
    model.set_formula("Sheet1", "C7", r#"=DATEDIF(A2,A1,"D")"#);
    model.set_formula("Sheet1", "D1", "=NOW()-TODAY()");

    let Some(outcome) = run_program(&model) else {
        return;
    };
    let text = |row| outcome.get("Sheet1", 2, row).clone();
    assert_eq!(text(1), Value::String("1,234.57".into()));
    assert_eq!(text(2), Value::String("25.6%".into()));
    assert_eq!(text(3), Value::String("2024-03-10".into()));
    assert_eq!(text(4), Value::String("10 Mar 2024 6:00 PM".into()));
    assert_eq!(text(5), Value::String("-$1,235".into()));

    let spans: Vec<f64> = (1..=6).map(|r| outcome.number("Sheet1", 3, r)).collect();
    assert_eq!(spans, vec![4.0, 49.0, 1516.0, 1.0, 55.0, 24.0]);
    assert_eq!(outcome.get("Sheet1", 3, 7), &Value::String("#NUM!".into()));

    let fraction = outcome.number("Sheet1", 4, 1);
    assert!((0.0..1.0).contains(&fraction));
}

#[test]
fn test_if_without_else_branch() {
    let mut model = WorkbookModel::new("if.xlsx");
    model.set_number("Sheet1", "A1", 1.0);
    model.set_formula("Sheet1", "B1", "=IF(A1>5,\"big\")");
    model.set_formula("Sheet1", "B2", "=IF(A1>5,\"big\",)");
    model.set_formula("Sheet1", "B3", "=IF(A1<5,,\"small\")");

    let Some(outcome) = run_program(&model) else {
        return;
    };
    assert_eq!(outcome.get("Sheet1", 2, 1), &Value::Bool(false));
    assert_eq!(outcome.number("Sheet1", 2, 2), 0.0);
    assert_eq!(outcome.number("Sheet1", 2, 3), 0.0);
}
