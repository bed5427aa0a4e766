//! Run summary: files found and skipped, groups and shards written

use crate::ingest::SkippedFile;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// One physical output sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardReport {
    pub sheet_name: String,
    pub row_count: usize,
}

/// One logical output table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    /// Group base name (`merged` or the source sheet name)
    pub name: String,
    /// Number of tables folded into the group
    pub members: usize,
    pub columns: usize,
    pub row_count: usize,
    pub shards: Vec<ShardReport>,
}

/// Aggregate outcome of one merge run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeReport {
    pub files_found: usize,
    pub files_read: usize,
    pub skipped: Vec<SkippedFile>,
    pub groups: Vec<GroupReport>,
    /// `None` when there was nothing to merge and no file was written
    pub output_path: Option<PathBuf>,
    pub elapsed: Duration,
}

impl MergeReport {
    /// Total data rows written across every shard
    pub fn total_rows(&self) -> usize {
        self.groups.iter().map(|g| g.row_count).sum()
    }

    /// Total physical sheets written
    pub fn sheet_count(&self) -> usize {
        self.groups.iter().map(|g| g.shards.len()).sum()
    }

    pub fn nothing_to_merge(&self) -> bool {
        self.output_path.is_none()
    }

    /// Human-readable one-line summary
    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} found={} read={} skipped={} groups={} sheets={} rows={}",
            self.files_found,
            self.files_read,
            self.skipped.len(),
            self.groups.len(),
            self.sheet_count(),
            self.total_rows()
        )
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Files found: {}", self.files_found)?;
        writeln!(f, "Files read:  {}", self.files_read)?;
        if !self.skipped.is_empty() {
            writeln!(f, "Files skipped ({}):", self.skipped.len())?;
            for skip in &self.skipped {
                writeln!(f, "  {}: {}", skip.path.display(), skip.reason)?;
            }
        }
        writeln!(f, "Groups: {}", self.groups.len())?;
        for group in &self.groups {
            writeln!(
                f,
                "  {} ({} tables, {} columns, {} rows)",
                group.name, group.members, group.columns, group.row_count
            )?;
            for shard in &group.shards {
                writeln!(f, "    {}: {} rows", shard.sheet_name, shard.row_count)?;
            }
        }
        match &self.output_path {
            Some(path) => write!(f, "Output: {} ({:.2?})", path.display(), self.elapsed),
            None => write!(f, "Nothing to merge; no output written"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MergeReport {
        MergeReport {
            files_found: 3,
            files_read: 2,
            skipped: vec![SkippedFile {
                path: PathBuf::from("bad.xlsx"),
                reason: "not a zip".to_string(),
            }],
            groups: vec![GroupReport {
                name: "merged".to_string(),
                members: 2,
                columns: 4,
                row_count: 5,
                shards: vec![
                    ShardReport {
                        sheet_name: "merged".to_string(),
                        row_count: 3,
                    },
                    ShardReport {
                        sheet_name: "merged_2".to_string(),
                        row_count: 2,
                    },
                ],
            }],
            output_path: Some(PathBuf::from("out.xlsx")),
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_totals() {
        let report = sample();
        assert_eq!(report.total_rows(), 5);
        assert_eq!(report.sheet_count(), 2);
        assert_eq!(
            report.format("[MERGE]"),
            "[MERGE] found=3 read=2 skipped=1 groups=1 sheets=2 rows=5"
        );
    }

    #[test]
    fn test_display_names_skipped_files_and_shards() {
        let text = sample().to_string();
        assert!(text.contains("bad.xlsx: not a zip"));
        assert!(text.contains("merged_2: 2 rows"));
        assert!(text.contains("Output: out.xlsx"));
    }

    #[test]
    fn test_nothing_to_merge() {
        let report = MergeReport::default();
        assert!(report.nothing_to_merge());
        assert!(report.to_string().ends_with("no output written"));
    }
}
