//! Dependency scheduler
//!
//! Work items (groups and singleton formulas) become graph nodes with an edge
//! from each consumer to every producer it reads. Ordering is Kahn's
//! algorithm run level by level; each level is sorted by anchor address so
//! the order is stable across runs. Whatever cannot be released is a cycle.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction as EdgeDirection;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

use super::formula::FormulaCell;
use super::grouping::{Group, Grouping};
use crate::error::{ConvertError, ConvertResult};
use crate::types::CellAddress;

/// Unit of scheduling and emission
#[derive(Debug, Clone, PartialEq)]
pub enum WorkItem {
    Singleton(CellAddress),
    Group(Group),
}

impl WorkItem {
    pub fn anchor(&self) -> &CellAddress {
        match self {
            WorkItem::Singleton(address) => address,
            WorkItem::Group(group) => &group.anchor,
        }
    }

    /// Every cell the item writes
    pub fn addresses(&self) -> &[CellAddress] {
        match self {
            WorkItem::Singleton(address) => std::slice::from_ref(address),
            WorkItem::Group(group) => &group.members,
        }
    }

    /// `Sheet1!D2:D6` or `Sheet1!A1`
    pub fn label(&self) -> String {
        match self {
            WorkItem::Singleton(address) => address.to_string(),
            WorkItem::Group(group) => format!("{}!{}", group.anchor.sheet, group.range_a1()),
        }
    }

    pub fn kind(&self) -> WorkItemKind {
        match self {
            WorkItem::Singleton(_) => WorkItemKind::Singleton,
            WorkItem::Group(_) => WorkItemKind::Group,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemKind {
    Singleton,
    Group,
}

/// Total order over work items
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    /// Items in emission order
    pub items: Vec<WorkItem>,
    /// Kahn levels as positions into `items`
    pub levels: Vec<Vec<usize>>,
    /// Producers of each item, as positions into `items`
    pub dependencies: Vec<BTreeSet<usize>>,
}

impl Schedule {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Which item writes which cell: sheet → column → row → item
#[derive(Default)]
struct ProducerIndex {
    by_column: HashMap<(String, u32), BTreeMap<u32, usize>>,
}

impl ProducerIndex {
    fn insert(&mut self, address: &CellAddress, item: usize) {
        self.by_column
            .entry((address.sheet.clone(), address.column))
            .or_default()
            .insert(address.row, item);
    }

    /// Items writing any cell of the rectangle
    fn producers(
        &self,
        sheet: &str,
        columns: (u32, u32),
        rows: (u32, u32),
        found: &mut BTreeSet<usize>,
    ) {
        for column in columns.0..=columns.1 {
            if let Some(rows_map) = self.by_column.get(&(sheet.to_string(), column)) {
                found.extend(rows_map.range(rows.0..=rows.1).map(|(_, &item)| item));
            }
        }
    }
}

/// Order the work items so every producer precedes its consumers
pub fn schedule(
    grouping: Grouping,
    formulas: &BTreeMap<CellAddress, FormulaCell>,
) -> ConvertResult<Schedule> {
    let mut items: Vec<WorkItem> = grouping
        .groups
        .into_iter()
        .map(WorkItem::Group)
        .chain(grouping.singletons.into_iter().map(WorkItem::Singleton))
        .collect();
    items.sort_by(|a, b| a.anchor().cmp(b.anchor()));

    let mut index = ProducerIndex::default();
    for (i, item) in items.iter().enumerate() {
        for address in item.addresses() {
            index.insert(address, i);
        }
    }

    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(items.len(), items.len());
    let nodes: Vec<NodeIndex> = (0..items.len()).map(|i| graph.add_node(i)).collect();

    for (i, item) in items.iter().enumerate() {
        let producers = producers_of(item, i, formulas, &index);
        for producer in producers {
            graph.add_edge(nodes[i], nodes[producer], ());
        }
    }

    let (order, levels) = kahn_levels(&graph, &items)?;

    // Re-number everything by emission position
    let mut position = vec![0; items.len()];
    for (pos, &item) in order.iter().enumerate() {
        position[item] = pos;
    }
    let dependencies = order
        .iter()
        .map(|&item| {
            graph
                .neighbors_directed(nodes[item], EdgeDirection::Outgoing)
                .map(|producer| position[graph[producer]])
                .collect()
        })
        .collect();
    let levels = levels
        .into_iter()
        .map(|level| level.into_iter().map(|item| position[item]).collect())
        .collect();

    let mut slots: Vec<Option<WorkItem>> = items.into_iter().map(Some).collect();
    let items = order
        .iter()
        .filter_map(|&item| slots[item].take())
        .collect();

    Ok(Schedule {
        items,
        levels,
        dependencies,
    })
}

/// Deduplicated producers an item reads; self-reads only count for singletons
fn producers_of(
    item: &WorkItem,
    item_index: usize,
    formulas: &BTreeMap<CellAddress, FormulaCell>,
    index: &ProducerIndex,
) -> BTreeSet<usize> {
    let mut found = BTreeSet::new();
    let mut queried: HashSet<(String, (u32, u32), (u32, u32))> = HashSet::new();

    for address in item.addresses() {
        let Some(formula) = formulas.get(address) else {
            continue;
        };
        for reference in &formula.references {
            if reference.external_file.is_some() {
                continue;
            }
            let (start, end) = reference.target.corners();
            let key = (
                reference.sheet.clone(),
                (start.column, end.column),
                (start.row, end.row),
            );
            if queried.insert(key.clone()) {
                index.producers(&key.0, key.1, key.2, &mut found);
            }
        }
    }

    if matches!(item, WorkItem::Group(_)) {
        found.remove(&item_index);
    }
    found
}

/// Level-wise Kahn over consumer → producer edges
fn kahn_levels(
    graph: &DiGraph<usize, ()>,
    items: &[WorkItem],
) -> ConvertResult<(Vec<usize>, Vec<Vec<usize>>)> {
    let mut pending: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors_directed(n, EdgeDirection::Outgoing).count())
        .collect();

    let by_anchor =
        |a: &NodeIndex, b: &NodeIndex| items[graph[*a]].anchor().cmp(items[graph[*b]].anchor());

    let mut ready: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|n| pending[n.index()] == 0)
        .collect();
    ready.sort_by(by_anchor);

    let mut order = Vec::with_capacity(items.len());
    let mut levels = Vec::new();

    while !ready.is_empty() {
        let mut next = Vec::new();
        for &node in &ready {
            order.push(graph[node]);
            // neighbors_directed yields one entry per edge, so counts stay exact
            for consumer in graph.neighbors_directed(node, EdgeDirection::Incoming) {
                pending[consumer.index()] -= 1;
                if pending[consumer.index()] == 0 {
                    next.push(consumer);
                }
            }
        }
        levels.push(ready.iter().map(|n| graph[*n]).collect());
        next.sort_by(by_anchor);
        ready = next;
    }

    if order.len() < items.len() {
        return Err(ConvertError::CircularDependency(minimal_cycle(
            graph, items, &pending,
        )));
    }

    debug!(items = order.len(), levels = levels.len(), "schedule complete");
    Ok((order, levels))
}

/// Labels of the smallest strongly connected component still blocked
fn minimal_cycle(graph: &DiGraph<usize, ()>, items: &[WorkItem], pending: &[usize]) -> Vec<String> {
    let mut cycles: Vec<Vec<NodeIndex>> = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| pending[scc[0].index()] > 0)
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .collect();

    for scc in &mut cycles {
        scc.sort_by(|a, b| items[graph[*a]].anchor().cmp(items[graph[*b]].anchor()));
    }
    cycles.sort_by(|a, b| {
        a.len()
            .cmp(&b.len())
            .then_with(|| items[graph[a[0]]].anchor().cmp(items[graph[b[0]]].anchor()))
    });

    cycles
        .first()
        .map(|scc| scc.iter().map(|n| items[graph[*n]].label()).collect())
        .unwrap_or_default()
}
