use crate::config::ConvertConfig;
use crate::core::report::AnalysisReport;
use crate::core::Converter;
use crate::error::{ConvertError, ConvertResult};
use crate::excel::WorkbookReader;
use crate::writer;
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Options of the convert command
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub input: PathBuf,
    pub config: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub no_report_xlsx: bool,
    pub verbose: bool,
}

/// Output directory: the one given, or the workbook's own directory
fn resolve_out_dir(input: &Path, out_dir: Option<PathBuf>) -> PathBuf {
    out_dir.unwrap_or_else(|| {
        input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Execute the convert command
pub fn convert(options: ConvertOptions) -> ConvertResult<()> {
    println!("{}", "🐍 xl2py - Compiling workbook".bold().green());
    println!("   Input: {}", options.input.display());

    let mut config = ConvertConfig::load(options.config.as_deref())?;
    if options.no_report_xlsx {
        config.write_report_xlsx = false;
    }
    let out_dir = resolve_out_dir(&options.input, options.out_dir);
    println!("   Output: {}\n", out_dir.display());

    if options.verbose {
        println!("{}", "📖 Reading workbook...".cyan());
    }
    let model = WorkbookReader::new(&options.input).read()?;
    if options.verbose {
        println!(
            "   Found {} sheets, {} cells, {} tables\n",
            model.sheets.len(),
            model.cells.len(),
            model.tables.len()
        );
        println!("{}", "🧮 Grouping, scheduling and translating...".cyan());
    }

    let converter = Converter::new(config.clone());
    let conversion = match converter.convert(&model) {
        Ok(conversion) => conversion,
        Err(e) => {
            print_failure(&e);
            // Leave the analysis behind so the failing cells can be inspected
            let analysis = converter.analyze(&model);
            if let Ok((json, _)) = writer::write_report(&out_dir, &analysis.report, &config) {
                println!("   Analysis report: {}\n", json.display());
            }
            return Err(e);
        }
    };

    let artifacts = writer::write_artifacts(&out_dir, &conversion, &config)?;
    print_summary(&conversion.report);

    println!("{}", "✅ Conversion Complete!".bold().green());
    println!("   Program:  {}", artifacts.script.display());
    if let Some(manifest) = &artifacts.manifest {
        println!("   Manifest: {}", manifest.display());
        println!(
            "{}",
            format!(
                "   ⚠️  Fill in paths for {} external workbook(s) before running",
                conversion.manifest.len()
            )
            .yellow()
        );
    }
    println!("   Report:   {}", artifacts.report_json.display());
    if let Some(xlsx) = &artifacts.report_xlsx {
        println!("   Report:   {}", xlsx.display());
    }
    println!();
    Ok(())
}

/// Execute the analyze command
pub fn analyze(input: PathBuf, json: bool) -> ConvertResult<()> {
    let model = WorkbookReader::new(&input).read()?;
    let analysis = Converter::default().analyze(&model);

    if json {
        println!("{}", analysis.report.to_json()?);
        return Ok(());
    }

    println!("{}", "🔍 xl2py - Workbook analysis".bold().green());
    println!("   File: {}\n", input.display());
    print_summary(&analysis.report);

    if !analysis.report.unsupported.is_empty() {
        println!("{}", "❌ Unsupported formulas:".bold().red());
        for diagnostic in &analysis.report.unsupported {
            println!(
                "   {} {}  {}",
                diagnostic.address.to_string().bright_blue(),
                diagnostic.formula,
                diagnostic.message.red()
            );
        }
        println!();
    }
    if let Some(cycle) = &analysis.cycle {
        println!("{}", "❌ Circular dependency:".bold().red());
        println!("   {}\n", cycle.join(" → "));
    }
    if analysis.report.unsupported.is_empty() && analysis.cycle.is_none() {
        println!("{}", "✅ Workbook can be converted".bold().green());
    }
    Ok(())
}

fn print_summary(report: &AnalysisReport) {
    let s = &report.summary;
    println!("{}", "📊 Summary:".bold());
    println!(
        "   {} formula cells, {} hardcoded cells across {} sheets",
        s.formula_cells, s.hardcoded_cells, s.sheets
    );
    println!(
        "   {} work items: {} groups covering {} cells, {} singletons, {} levels",
        s.work_items, s.groups, s.grouped_cells, s.singletons, s.levels
    );
    if s.cross_sheet_references > 0 {
        println!("   {} cross-sheet references", s.cross_sheet_references);
    }
    if s.external_references > 0 {
        println!(
            "   {} external references into {} file(s)",
            s.external_references, s.external_files
        );
    }
    if s.serialization_warnings > 0 {
        println!(
            "{}",
            format!(
                "   ⚠️  {} value(s) with no literal form written as empty",
                s.serialization_warnings
            )
            .yellow()
        );
    }
    if s.removed_hardcoded_cells > 0 {
        println!(
            "   {} unreferenced hardcoded cells dropped",
            s.removed_hardcoded_cells
        );
    }
    println!();
}

fn print_failure(error: &ConvertError) {
    match error {
        ConvertError::Parse(diagnostics) => {
            println!(
                "{}",
                format!("❌ {} formula(s) could not be parsed:", diagnostics.len())
                    .bold()
                    .red()
            );
            for d in diagnostics {
                println!(
                    "   {} {}  {}",
                    d.address.to_string().bright_blue(),
                    d.formula,
                    d.message.red()
                );
            }
        }
        ConvertError::CircularDependency(members) => {
            println!("{}", "❌ Circular dependency:".bold().red());
            println!("   {}", members.join(" → "));
        }
        other => println!("{}", format!("❌ {}", other).bold().red()),
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_dir_defaults_to_workbook_directory() {
        assert_eq!(
            resolve_out_dir(Path::new("models/book.xlsx"), None),
            PathBuf::from("models")
        );
        assert_eq!(
            resolve_out_dir(Path::new("book.xlsx"), None),
            PathBuf::from(".")
        );
        assert_eq!(
            resolve_out_dir(Path::new("models/book.xlsx"), Some(PathBuf::from("out"))),
            PathBuf::from("out")
        );
    }
}
