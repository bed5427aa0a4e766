//! Schema reconciliation across the members of a group

use crate::config::ColumnPolicy;
use crate::table::{CellValue, Row, Table};
use std::collections::{HashMap, HashSet};

/// Compute the unified column list for a group.
///
/// Union lists every column in first-seen order across members.
/// Intersection keeps the columns present in every member, in the first
/// member's order; it may come out empty, which is a valid degenerate merge.
pub fn reconcile(members: &[Table], policy: ColumnPolicy) -> Vec<String> {
    match policy {
        ColumnPolicy::Union => {
            let mut seen: HashSet<&str> = HashSet::new();
            let mut columns = Vec::new();
            for table in members {
                for col in &table.columns {
                    if seen.insert(col.as_str()) {
                        columns.push(col.clone());
                    }
                }
            }
            columns
        }
        ColumnPolicy::Intersection => {
            let Some((first, rest)) = members.split_first() else {
                return Vec::new();
            };
            let others: Vec<HashSet<&str>> = rest
                .iter()
                .map(|t| t.columns.iter().map(String::as_str).collect())
                .collect();
            first
                .columns
                .iter()
                .filter(|col| others.iter().all(|set| set.contains(col.as_str())))
                .cloned()
                .collect()
        }
    }
}

/// Maps one member's cell positions onto the unified column order
#[derive(Debug, Clone)]
pub struct Projection {
    sources: Vec<Option<usize>>,
}

impl Projection {
    pub fn new(table_columns: &[String], unified: &[String]) -> Self {
        let positions: HashMap<&str, usize> = table_columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let sources = unified
            .iter()
            .map(|c| positions.get(c.as_str()).copied())
            .collect();
        Self { sources }
    }

    /// Re-shape a row: absent cells become `Empty`, cells outside the
    /// unified columns are dropped
    pub fn apply(&self, row: Row) -> Row {
        let mut cells = row.cells;
        let projected = self
            .sources
            .iter()
            .map(|src| match *src {
                Some(i) if i < cells.len() => std::mem::replace(&mut cells[i], CellValue::Empty),
                _ => CellValue::Empty,
            })
            .collect();
        Row::new(projected)
    }
}
