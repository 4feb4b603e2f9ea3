//! Group builder
//!
//! Collapses same-pattern formulas into maximal contiguous vertical or
//! horizontal runs. Selection is greedy over the cells of a bucket that are
//! still unassigned: the longest run wins, vertical wins ties of equal length,
//! then the run with the smaller anchor address. Runs shorter than two cells
//! stay singletons.

use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use tracing::debug;

use super::formula::FormulaCell;
use super::pattern::Pattern;
use crate::types::CellAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Direction {
    /// Same column, consecutive rows
    Vertical,
    /// Same row, consecutive columns
    Horizontal,
}

impl Direction {
    /// Cell `step` positions after `anchor` along this direction
    fn step(self, anchor: &CellAddress, step: u32) -> CellAddress {
        match self {
            Direction::Vertical => anchor.offset(0, step as i64),
            Direction::Horizontal => anchor.offset(step as i64, 0),
        }
    }

    /// Position of `cell` along the direction
    fn index_of(self, cell: &CellAddress) -> u32 {
        match self {
            Direction::Vertical => cell.row,
            Direction::Horizontal => cell.column,
        }
    }
}

/// A run of at least two same-pattern cells emitted as one loop
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub direction: Direction,
    pub anchor: CellAddress,
    pub extent: u32,
    pub pattern: Pattern,
    /// Members in iteration order, anchor first
    pub members: Vec<CellAddress>,
}

impl Group {
    pub fn last(&self) -> &CellAddress {
        self.members.last().unwrap_or(&self.anchor)
    }

    /// First and last loop index (rows for vertical groups, columns otherwise)
    pub fn index_range(&self) -> (u32, u32) {
        (
            self.direction.index_of(&self.anchor),
            self.direction.index_of(self.last()),
        )
    }

    /// `D2:D6`
    pub fn range_a1(&self) -> String {
        format!("{}:{}", self.anchor.a1(), self.last().a1())
    }
}

/// Output of the group builder
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    pub groups: Vec<Group>,
    pub singletons: Vec<CellAddress>,
}

/// Heap entry: (length, vertical-first, smallest anchor)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    len: u32,
    vertical: bool,
    anchor: Reverse<CellAddress>,
}

impl Candidate {
    fn direction(&self) -> Direction {
        if self.vertical {
            Direction::Vertical
        } else {
            Direction::Horizontal
        }
    }
}

/// Bucket formulas by (sheet, pattern) and carve each bucket into runs
pub fn build_groups(formulas: &BTreeMap<CellAddress, FormulaCell>) -> Grouping {
    let mut buckets: BTreeMap<(String, Pattern), BTreeSet<CellAddress>> = BTreeMap::new();
    for (address, cell) in formulas {
        buckets
            .entry((address.sheet.clone(), Pattern::of(cell)))
            .or_default()
            .insert(address.clone());
    }

    let mut grouping = Grouping::default();
    for ((_, pattern), members) in buckets {
        carve_bucket(&pattern, members, formulas, &mut grouping);
    }

    grouping.groups.sort_by(|a, b| a.anchor.cmp(&b.anchor));
    grouping.singletons.sort();
    debug!(
        groups = grouping.groups.len(),
        singletons = grouping.singletons.len(),
        "grouping complete"
    );
    grouping
}

fn carve_bucket(
    pattern: &Pattern,
    mut unassigned: BTreeSet<CellAddress>,
    formulas: &BTreeMap<CellAddress, FormulaCell>,
    grouping: &mut Grouping,
) {
    if unassigned.len() < 2 {
        grouping.singletons.extend(unassigned);
        return;
    }

    let mut heap = BinaryHeap::new();
    for cell in &unassigned {
        for direction in [Direction::Vertical, Direction::Horizontal] {
            // Only maximal runs: start where the previous cell is not a member
            let is_start = match direction {
                Direction::Vertical => cell.row == 1 || !unassigned.contains(&cell.offset(0, -1)),
                Direction::Horizontal => {
                    cell.column == 1 || !unassigned.contains(&cell.offset(-1, 0))
                }
            };
            if is_start {
                let len = run_length(&unassigned, cell, direction);
                push_candidate(&mut heap, cell.clone(), direction, len);
            }
        }
    }

    while let Some(candidate) = heap.pop() {
        let direction = candidate.direction();
        let anchor = candidate.anchor.0.clone();
        let cells: Vec<CellAddress> = (0..candidate.len)
            .map(|i| direction.step(&anchor, i))
            .collect();

        if cells.iter().all(|c| unassigned.contains(c)) {
            for cell in &cells {
                unassigned.remove(cell);
            }
            if let Some(target) = self_reference_violation(&cells, direction, formulas) {
                debug!(
                    run = %format!("{}:{}", anchor, cells[cells.len() - 1].a1()),
                    target = %target,
                    "run reads a cell it has not computed yet, keeping singletons"
                );
                grouping.singletons.extend(cells);
                continue;
            }
            debug!(anchor = %anchor, extent = cells.len(), ?direction, "group formed");
            grouping.groups.push(Group {
                direction,
                anchor,
                extent: candidate.len,
                pattern: pattern.clone(),
                members: cells,
            });
        } else {
            // Stale: re-queue the still-unassigned segments
            let mut segment_start: Option<&CellAddress> = None;
            let mut segment_len = 0;
            for cell in &cells {
                if unassigned.contains(cell) {
                    segment_start.get_or_insert(cell);
                    segment_len += 1;
                } else if let Some(start) = segment_start.take() {
                    push_candidate(&mut heap, start.clone(), direction, segment_len);
                    segment_len = 0;
                }
            }
            if let Some(start) = segment_start {
                push_candidate(&mut heap, start.clone(), direction, segment_len);
            }
        }
    }

    grouping.singletons.extend(unassigned);
}

fn push_candidate(
    heap: &mut BinaryHeap<Candidate>,
    anchor: CellAddress,
    direction: Direction,
    len: u32,
) {
    if len >= 2 {
        heap.push(Candidate {
            len,
            vertical: direction == Direction::Vertical,
            anchor: Reverse(anchor),
        });
    }
}

fn run_length(members: &BTreeSet<CellAddress>, start: &CellAddress, direction: Direction) -> u32 {
    let mut len = 1;
    while members.contains(&direction.step(start, len)) {
        len += 1;
    }
    len
}

/// A member that reads itself or a later member of the same run
///
/// Returns the offending target cell.
fn self_reference_violation(
    cells: &[CellAddress],
    direction: Direction,
    formulas: &BTreeMap<CellAddress, FormulaCell>,
) -> Option<CellAddress> {
    let anchor = &cells[0];
    let (lo_index, hi_index) = (
        direction.index_of(anchor),
        direction.index_of(&cells[cells.len() - 1]),
    );

    for (position, member) in cells.iter().enumerate() {
        let formula = formulas.get(member)?;
        let current = lo_index + position as u32;
        for reference in &formula.references {
            if reference.external_file.is_some() || reference.sheet != member.sheet {
                continue;
            }
            let (start, end) = reference.target.corners();
            // The run is a line; intersect the reference rectangle with it
            let (fixed, fixed_lo, fixed_hi, along_lo, along_hi) = match direction {
                Direction::Vertical => (anchor.column, start.column, end.column, start.row, end.row),
                Direction::Horizontal => (anchor.row, start.row, end.row, start.column, end.column),
            };
            if fixed < fixed_lo || fixed > fixed_hi {
                continue;
            }
            let lo = along_lo.max(lo_index);
            let hi = along_hi.min(hi_index);
            if lo <= hi && hi >= current {
                return Some(direction.step(anchor, hi - lo_index));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkbookModel;

    fn formulas(cells: &[(&str, &str)]) -> BTreeMap<CellAddress, FormulaCell> {
        let model = WorkbookModel::new("book.xlsx");
        cells
            .iter()
            .map(|(a1, text)| {
                let address = CellAddress::parse_a1("S", a1).unwrap();
                let cell = FormulaCell::parse(&address, text, &model).unwrap();
                (address, cell)
            })
            .collect()
    }

    #[test]
    fn test_contiguous_run_is_one_group() {
        let cells: Vec<(String, String)> = (2..=6)
            .map(|r| (format!("D{}", r), format!("=B{}-C{}", r, r)))
            .collect();
        let refs: Vec<(&str, &str)> = cells.iter().map(|(a, f)| (a.as_str(), f.as_str())).collect();
        let grouping = build_groups(&formulas(&refs));

        assert_eq!(grouping.groups.len(), 1);
        assert!(grouping.singletons.is_empty());
        let group = &grouping.groups[0];
        assert_eq!(group.direction, Direction::Vertical);
        assert_eq!(group.extent, 5);
        assert_eq!(group.range_a1(), "D2:D6");
        assert_eq!(group.index_range(), (2, 6));
    }

    #[test]
    fn test_gap_splits_and_stray_cell_stays_out() {
        let grouping = build_groups(&formulas(&[
            ("D2", "=B2*2"),
            ("D3", "=B3*2"),
            ("D5", "=B5*2"),
            ("D6", "=B6*2"),
            ("D7", "=B7*2"),
            ("F9", "=D9*2"),
        ]));
        let ranges: Vec<String> = grouping.groups.iter().map(|g| g.range_a1()).collect();
        assert_eq!(ranges, vec!["D2:D3", "D5:D7"]);
        assert_eq!(grouping.singletons.len(), 1);
        assert_eq!(grouping.singletons[0].a1(), "F9");
    }

    #[test]
    fn test_longer_horizontal_run_wins() {
        // A 4-wide row through B2 and a 2-tall column through B2
        let grouping = build_groups(&formulas(&[
            ("B2", "=1+2"),
            ("C2", "=1+2"),
            ("D2", "=1+2"),
            ("E2", "=1+2"),
            ("B3", "=1+2"),
        ]));
        assert_eq!(grouping.groups.len(), 1);
        assert_eq!(grouping.groups[0].direction, Direction::Horizontal);
        assert_eq!(grouping.groups[0].range_a1(), "B2:E2");
        assert_eq!(grouping.singletons[0].a1(), "B3");
    }

    #[test]
    fn test_equal_length_prefers_vertical() {
        let grouping = build_groups(&formulas(&[
            ("B2", "=7"),
            ("C2", "=7"),
            ("B3", "=7"),
        ]));
        assert_eq!(grouping.groups.len(), 1);
        assert_eq!(grouping.groups[0].direction, Direction::Vertical);
        assert_eq!(grouping.groups[0].range_a1(), "B2:B3");
        assert_eq!(grouping.singletons[0].a1(), "C2");
    }

    #[test]
    fn test_running_total_groups() {
        let grouping = build_groups(&formulas(&[
            ("C3", "=C2+B3"),
            ("C4", "=C3+B4"),
            ("C5", "=C4+B5"),
        ]));
        assert_eq!(grouping.groups.len(), 1);
        assert_eq!(grouping.groups[0].extent, 3);
    }

    #[test]
    fn test_forward_reference_falls_back_to_singletons() {
        let grouping = build_groups(&formulas(&[
            ("C2", "=C3+1"),
            ("C3", "=C4+1"),
            ("C4", "=C5+1"),
        ]));
        assert!(grouping.groups.is_empty());
        assert_eq!(grouping.singletons.len(), 3);
    }

    #[test]
    fn test_range_covering_own_run_is_rejected() {
        let grouping = build_groups(&formulas(&[
            ("C2", "=SUM($C$2:$C$4)"),
            ("C3", "=SUM($C$2:$C$4)"),
            ("C4", "=SUM($C$2:$C$4)"),
        ]));
        assert!(grouping.groups.is_empty());
    }
}
