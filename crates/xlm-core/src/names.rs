//! Name disambiguation against a growing set of claimed names
//!
//! Used for duplicate header columns (`a`, `a_1`, `a_2`, ...) and for output
//! sheet names (`merged`, `merged_2`, ...). Both append `_N` to the base
//! name until the candidate is free.

use std::collections::{HashMap, HashSet};

/// Excel's hard limit on worksheet name length
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Registry of names already handed out
#[derive(Debug, Clone, Default)]
pub struct UniqueNames {
    used: HashSet<String>,
    next_suffix: HashMap<String, usize>,
    fold_case: bool,
}

impl UniqueNames {
    /// Case-sensitive registry (column names)
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive registry (worksheet names)
    pub fn case_insensitive() -> Self {
        Self {
            fold_case: true,
            ..Self::default()
        }
    }

    /// Whether `name` has been claimed
    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(&self.fold(name))
    }

    /// Mark a name as taken without renaming it
    pub fn reserve(&mut self, name: &str) {
        let key = self.fold(name);
        self.used.insert(key);
    }

    /// Claim `base` or, if taken, the first free `base_N` with N counting
    /// up from `first_suffix`
    pub fn claim(&mut self, base: &str, first_suffix: usize) -> String {
        self.claim_with(base, first_suffix, |b, n| format!("{}_{}", b, n))
    }

    /// Like [`UniqueNames::claim`] with a custom candidate builder
    pub fn claim_with<F>(&mut self, base: &str, first_suffix: usize, compose: F) -> String
    where
        F: Fn(&str, usize) -> String,
    {
        let base_key = self.fold(base);
        if self.used.insert(base_key.clone()) {
            return base.to_string();
        }

        let mut n = self
            .next_suffix
            .get(&base_key)
            .copied()
            .unwrap_or(first_suffix);
        loop {
            let candidate = compose(base, n);
            n += 1;
            let key = self.fold(&candidate);
            if self.used.insert(key) {
                self.next_suffix.insert(base_key, n);
                return candidate;
            }
        }
    }

    fn fold(&self, name: &str) -> String {
        if self.fold_case {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }
}

/// Disambiguate a raw header row: first occurrence keeps its name, later
/// ones get `_1`, `_2`, ... scanned left to right
pub fn make_unique_columns<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut registry = UniqueNames::new();
    names
        .into_iter()
        .map(|name| registry.claim(name.as_ref(), 1))
        .collect()
}

/// Make a string usable as a worksheet name, leaving room for `suffix`
pub fn safe_sheet_title(base: &str, suffix: &str) -> String {
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    let cleaned = cleaned.trim_matches('\'');
    let cleaned = if cleaned.is_empty() { "Sheet" } else { cleaned };

    let suffix_len = suffix.chars().count();
    let room = MAX_SHEET_NAME_LEN.saturating_sub(suffix_len).max(1);
    let truncated: String = cleaned.chars().take(room).collect();
    // cutting can expose a quote or space that was interior before
    let truncated = truncated.trim_end().trim_end_matches('\'');
    let truncated = if truncated.is_empty() { "Sheet" } else { truncated };
    format!("{}{}", truncated, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_columns_get_numbered() {
        let cols = make_unique_columns(["id", "name", "id", "id", "name"]);
        assert_eq!(cols, vec!["id", "name", "id_1", "id_2", "name_1"]);
    }

    #[test]
    fn test_suffix_collision_with_existing_name() {
        let cols = make_unique_columns(["a", "a_1", "a"]);
        assert_eq!(cols, vec!["a", "a_1", "a_2"]);
    }

    #[test]
    fn test_sheet_registry_is_case_insensitive() {
        let mut names = UniqueNames::case_insensitive();
        assert_eq!(names.claim("Jan", 2), "Jan");
        assert_eq!(names.claim("JAN", 2), "JAN_2");
        assert!(names.contains("jan_2"));
    }

    #[test]
    fn test_safe_sheet_title() {
        assert_eq!(safe_sheet_title("a/b:c", ""), "a_b_c");
        assert_eq!(safe_sheet_title("  ", ""), "Sheet");
        assert_eq!(safe_sheet_title("'quoted'", ""), "quoted");
        let long = "x".repeat(40);
        assert_eq!(safe_sheet_title(&long, "").chars().count(), 31);
        let with_suffix = safe_sheet_title(&long, "_12");
        assert_eq!(with_suffix.chars().count(), 31);
        assert!(with_suffix.ends_with("_12"));

        let quote_at_cut = format!("{}'b", "a".repeat(30));
        assert_eq!(safe_sheet_title(&quote_at_cut, ""), "a".repeat(30));
        let quote_before_suffix = format!("{}'bbbb", "a".repeat(28));
        assert_eq!(
            safe_sheet_title(&quote_before_suffix, "_2"),
            format!("{}_2", "a".repeat(28))
        );
        let space_at_cut = format!("x{}y", " ".repeat(30));
        assert_eq!(safe_sheet_title(&space_at_cut, ""), "x");
    }

    #[test]
    fn test_truncation_collisions_resolved() {
        let mut names = UniqueNames::case_insensitive();
        let long_a = format!("{}A", "x".repeat(31));
        let long_b = format!("{}B", "x".repeat(31));
        let first = names.claim_with(&safe_sheet_title(&long_a, ""), 2, |b, n| {
            safe_sheet_title(b, &format!("_{}", n))
        });
        let second = names.claim_with(&safe_sheet_title(&long_b, ""), 2, |b, n| {
            safe_sheet_title(b, &format!("_{}", n))
        });
        assert_ne!(first, second);
        assert!(second.ends_with("_2"));
        assert!(second.chars().count() <= MAX_SHEET_NAME_LEN);
    }
}
