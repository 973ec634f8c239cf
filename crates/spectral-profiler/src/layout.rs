//! Class Directory Layout

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{ProfilerError, Result};

/// One label's time-series files
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassGroup {
    /// Directory name, used as the class identifier
    pub name: String,
    /// Data files, sorted by file name
    pub files: Vec<PathBuf>,
}

/// First run of ASCII digits in `name` with leading zeros stripped,
/// e.g. `class_012_b` -> `"12"`. Runs of any length are kept as text.
pub fn numeric_sort_key(name: &str) -> Option<&str> {
    let start = name.find(|c: char| c.is_ascii_digit())?;
    let digits = &name[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let run = &digits[..end];
    let trimmed = run.trim_start_matches('0');
    // All zeros keeps a single "0"
    Some(if trimmed.is_empty() { &run[end - 1..] } else { trimmed })
}

/// Order class names by their embedded number ("2" before "10"). Names
/// without a number follow all numbered names in lexicographic order.
pub fn sort_class_names(names: &mut [String]) {
    names.sort();
    names.sort_by(|a, b| class_order(a).cmp(&class_order(b)));
}

fn class_order(name: &str) -> (bool, Option<(usize, &str)>) {
    let key = numeric_sort_key(name);
    // Without leading zeros, a shorter run is a smaller number
    (key.is_none(), key.map(|k| (k.len(), k)))
}

/// Regular files in `dir` whose extension matches (case-insensitive),
/// sorted by file name
pub fn list_data_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| ProfilerError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ProfilerError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| ProfilerError::io(&path, e))?;
        if !file_type.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// One group per subdirectory of `root`, in numeric class order
pub fn discover_class_groups(root: &Path, extension: &str) -> Result<Vec<ClassGroup>> {
    let entries = fs::read_dir(root).map_err(|e| ProfilerError::io(root, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ProfilerError::io(root, e))?;
        let file_type = entry.file_type().map_err(|e| ProfilerError::io(entry.path(), e))?;
        if !file_type.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => {
                return Err(ProfilerError::Layout(format!(
                    "class directory name {:?} is not valid UTF-8",
                    raw
                )))
            }
        }
    }
    if names.is_empty() {
        return Err(ProfilerError::Layout(format!(
            "no class directories under {}",
            root.display()
        )));
    }
    sort_class_names(&mut names);

    names
        .into_iter()
        .map(|name| {
            let files = list_data_files(&root.join(&name), extension)?;
            debug!("Class {}: {} files", name, files.len());
            Ok(ClassGroup { name, files })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_numeric_sort_key() {
        assert_eq!(numeric_sort_key("10"), Some("10"));
        assert_eq!(numeric_sort_key("class_7"), Some("7"));
        assert_eq!(numeric_sort_key("a12b34"), Some("12"));
        assert_eq!(numeric_sort_key("class_007"), Some("7"));
        assert_eq!(numeric_sort_key("class_000"), Some("0"));
        assert_eq!(numeric_sort_key("none"), None);
    }

    #[test]
    fn test_numbers_beyond_u64_stay_numbered() {
        let mut names: Vec<String> = [
            "class_99999999999999999999999",
            "class_5",
            "alpha",
            "class_100000000000000000000",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        sort_class_names(&mut names);
        assert_eq!(
            names,
            vec![
                "class_5",
                "class_100000000000000000000",
                "class_99999999999999999999999",
                "alpha"
            ]
        );
    }

    #[test]
    fn test_leading_zeros_compare_by_value() {
        let mut names: Vec<String> = ["c010", "c9", "c0002"].iter().map(|s| s.to_string()).collect();
        sort_class_names(&mut names);
        assert_eq!(names, vec!["c0002", "c9", "c010"]);
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        let mut names: Vec<String> = ["10", "2", "1", "extra", "class_3", "alpha"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        sort_class_names(&mut names);
        assert_eq!(names, vec!["1", "2", "class_3", "10", "alpha", "extra"]);
    }

    #[test]
    fn test_discover_groups() {
        let dir = tempfile::tempdir().unwrap();
        for class in ["10", "2"] {
            let class_dir = dir.path().join(class);
            fs::create_dir(&class_dir).unwrap();
            fs::write(class_dir.join("b.csv"), "Time,v\n0,1\n").unwrap();
            fs::write(class_dir.join("a.CSV"), "Time,v\n0,1\n").unwrap();
            fs::write(class_dir.join("notes.txt"), "skip me").unwrap();
        }
        fs::write(dir.path().join("stray.csv"), "Time,v\n").unwrap();

        let groups = discover_class_groups(dir.path(), "csv").unwrap();
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["2", "10"]);

        let files: Vec<String> = groups[0]
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec!["a.CSV", "b.csv"]);
    }

    #[test]
    fn test_empty_root_is_layout_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_class_groups(dir.path(), "csv"),
            Err(ProfilerError::Layout(_))
        ));
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        assert!(matches!(
            discover_class_groups(&missing, "csv"),
            Err(ProfilerError::Io { .. })
        ));
    }

    proptest! {
        #[test]
        fn numbered_names_sort_ascending(mut numbers in proptest::collection::vec(0u32..100_000, 1..20)) {
            let mut names: Vec<String> = numbers.iter().map(|n| format!("class{}", n)).collect();
            sort_class_names(&mut names);
            numbers.sort();
            let keys: Vec<u64> = names
                .iter()
                .filter_map(|n| numeric_sort_key(n))
                .map(|k| k.parse().unwrap())
                .collect();
            let expected: Vec<u64> = numbers.iter().map(|&n| n as u64).collect();
            prop_assert_eq!(keys, expected);
        }
    }
}
