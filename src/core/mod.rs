//! Compilation pipeline: parse, group, schedule, translate, emit

pub mod cells;
pub mod converter;
pub mod emitter;
pub mod formula;
pub mod grouping;
pub mod pattern;
pub mod report;
pub mod scheduler;
pub mod translator;

pub use cells::{CellCatalog, HardcodedCell, SerializationWarning};
pub use converter::{Analysis, Conversion, Converter};
pub use grouping::{build_groups, Direction, Group, Grouping};
pub use pattern::Pattern;
pub use report::AnalysisReport;
pub use scheduler::{schedule, Schedule, WorkItem, WorkItemKind};
