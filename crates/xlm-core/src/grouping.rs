//! Partitioning of ingested tables into output groups

use crate::config::MergeMode;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Base sheet name used for the single stacked group
pub const STACK_SHEET_NAME: &str = "merged";

/// Identity of a group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKey {
    /// Stack mode: every table
    All,
    /// Per-sheet-name mode: tables whose source sheet has this name
    Sheet(String),
}

impl GroupKey {
    /// Name the group's output sheets are derived from
    pub fn base_sheet_name(&self) -> &str {
        match self {
            GroupKey::All => STACK_SHEET_NAME,
            GroupKey::Sheet(name) => name,
        }
    }
}

/// Tables that fold into one logical output table
#[derive(Debug, Clone)]
pub struct Group {
    pub key: GroupKey,
    /// Members in input order (file order, then sheet order)
    pub members: Vec<Table>,
}

impl Group {
    pub fn new(key: GroupKey) -> Self {
        Self {
            key,
            members: Vec::new(),
        }
    }

    /// Total rows across members, before cleaning
    pub fn row_count(&self) -> usize {
        self.members.iter().map(Table::row_count).sum()
    }
}

/// Partition `tables` (already in input order) into groups.
///
/// Group order is the order each key is first seen; member order within a
/// group follows table order.
pub fn group_tables(tables: Vec<Table>, mode: MergeMode) -> Vec<Group> {
    if tables.is_empty() {
        return Vec::new();
    }

    match mode {
        MergeMode::Stack => vec![Group {
            key: GroupKey::All,
            members: tables,
        }],
        MergeMode::PerSheetName => {
            let mut groups: Vec<Group> = Vec::new();
            let mut index: HashMap<String, usize> = HashMap::new();
            for table in tables {
                let slot = *index.entry(table.source_sheet.clone()).or_insert_with(|| {
                    groups.push(Group::new(GroupKey::Sheet(table.source_sheet.clone())));
                    groups.len() - 1
                });
                groups[slot].members.push(table);
            }
            groups
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn table(file: &str, sheet: &str) -> Table {
        Table::new(PathBuf::from(file), sheet)
    }

    #[test]
    fn test_stack_mode_single_group() {
        let groups = group_tables(
            vec![table("x", "Jan"), table("x", "Feb"), table("y", "Jan")],
            MergeMode::Stack,
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, GroupKey::All);
        assert_eq!(groups[0].members.len(), 3);
        assert_eq!(groups[0].key.base_sheet_name(), "merged");
    }

    #[test]
    fn test_per_sheet_name_first_seen_order() {
        let groups = group_tables(
            vec![table("x", "Jan"), table("x", "Feb"), table("y", "Jan")],
            MergeMode::PerSheetName,
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, GroupKey::Sheet("Jan".to_string()));
        assert_eq!(groups[0].members.len(), 2);
        assert_eq!(groups[0].members[0].source_file, PathBuf::from("x"));
        assert_eq!(groups[0].members[1].source_file, PathBuf::from("y"));
        assert_eq!(groups[1].key, GroupKey::Sheet("Feb".to_string()));
        assert_eq!(groups[1].members.len(), 1);
    }

    #[test]
    fn test_no_tables_no_groups() {
        assert!(group_tables(Vec::new(), MergeMode::Stack).is_empty());
        assert!(group_tables(Vec::new(), MergeMode::PerSheetName).is_empty());
    }
}
