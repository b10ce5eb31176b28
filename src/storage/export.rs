//! CSV export collaborator.
//!
//! The pipeline works with canonical keys only; display formatting (spacing,
//! headers, provenance columns) lives here, at the edge.

use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::models::{Category, PhoneKey};

/// Write one category's keys as CSV, in the order given.
pub fn export_csv(path: &Path, category: Category, keys: &[PhoneKey]) -> Result<()> {
    let mut out = String::from("Category,Phone\n");
    for key in keys {
        out.push_str(category.as_str());
        out.push(',');
        out.push_str(&key.display());
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}

/// Write a merged set with its provenance record.
pub fn export_merged(
    path: &Path,
    keys: &[PhoneKey],
    provenance: &HashMap<PhoneKey, Vec<String>>,
) -> Result<()> {
    let mut out = String::from("Phone,Sources\n");
    for key in keys {
        let sources = provenance
            .get(key)
            .map(|s| s.join(";"))
            .unwrap_or_default();
        out.push_str(&format!("{},{sources}\n", key.display()));
    }
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::phone::normalize;
    use tempfile::TempDir;

    #[test]
    fn export_writes_display_format_with_category() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("agents.csv");
        let keys = vec![normalize("571233844").unwrap(), normalize("595111222").unwrap()];

        export_csv(&path, Category::Agent, &keys).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Category,Phone");
        assert_eq!(lines[1], "agents,+995 571 233 844");
        assert_eq!(lines[2], "agents,+995 595 111 222");
    }

    #[test]
    fn merged_export_includes_provenance() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("merged.csv");
        let key = normalize("571233844").unwrap();
        let provenance =
            HashMap::from([(key.clone(), vec!["run-a".to_string(), "run-b".to_string()])]);

        export_merged(&path, &[key], &provenance).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("+995 571 233 844,run-a;run-b"));
    }
}
