use crate::error::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Suffix marking a pattern fixture; the actual body sits next to it as `<name>.json`.
pub const PATTERN_SUFFIX: &str = ".pattern.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Case {
    pub name: String,
    pub actual: PathBuf,
    pub pattern: PathBuf,
}

impl Case {
    /// Builds a case from a pattern path; `None` unless it ends in [`PATTERN_SUFFIX`].
    pub fn from_pattern(pattern: PathBuf, base_dir: &Path) -> Option<Self> {
        let file_name = pattern.file_name()?.to_string_lossy().into_owned();
        let stem = file_name.strip_suffix(PATTERN_SUFFIX)?;
        if stem.is_empty() {
            return None;
        }
        let actual = pattern.with_file_name(format!("{}.json", stem));

        let rel = pattern.strip_prefix(base_dir).unwrap_or(&pattern);
        let rel = rel.to_string_lossy();
        let name = rel
            .strip_suffix(PATTERN_SUFFIX)
            .unwrap_or(&*rel)
            .replace('\\', "/");

        Some(Self {
            name,
            actual,
            pattern,
        })
    }
}

pub fn discover_cases(root: &Path) -> Result<Vec<Case>> {
    if root.is_file() {
        let base = root.parent().unwrap_or(root);
        return Ok(Case::from_pattern(root.to_path_buf(), base)
            .into_iter()
            .collect());
    }

    let mut cases: Vec<Case> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| Case::from_pattern(e.into_path(), root))
        .collect();

    cases.sort_by(|a, b| a.name.cmp(&b.name));
    log::debug!("discovered {} cases under {}", cases.len(), root.display());
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discover_pairs_pattern_with_actual() {
        let tmp = TempDir::new().unwrap();
        create_test_file(tmp.path(), "users.pattern.json", "{}");
        create_test_file(tmp.path(), "users.json", "{}");
        create_test_file(tmp.path(), "notes.txt", "ignored");

        let cases = discover_cases(tmp.path()).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].name, "users");
        assert_eq!(cases[0].actual, tmp.path().join("users.json"));
    }

    #[test]
    fn test_discover_nested_sorted() {
        let tmp = TempDir::new().unwrap();
        create_test_file(tmp.path(), "v2/orders.pattern.json", "{}");
        create_test_file(tmp.path(), "v1/users.pattern.json", "{}");
        create_test_file(tmp.path(), "v1/users.json", "{}");

        let cases = discover_cases(tmp.path()).unwrap();
        let names: Vec<_> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["v1/users", "v2/orders"]);
        assert!(!cases[1].actual.exists());
    }

    #[test]
    fn test_single_pattern_file_root() {
        let tmp = TempDir::new().unwrap();
        create_test_file(tmp.path(), "a.pattern.json", "{}");
        let cases = discover_cases(&tmp.path().join("a.pattern.json")).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].name, "a");
    }

    #[test]
    fn test_bare_suffix_is_not_a_case() {
        assert!(Case::from_pattern(PathBuf::from("/x/.pattern.json"), Path::new("/x")).is_none());
        assert!(Case::from_pattern(PathBuf::from("/x/a.json"), Path::new("/x")).is_none());
    }
}
