//! CSV export of the canonical triplet table

use std::path::Path;

use tracing::info;

use finkg_core::{CanonicalTriplet, FinkgError, Result};

/// Write triplets with a `head,relation,tail,confidence,head_type,tail_type` header
pub fn write_triplets_csv(path: &Path, triplets: &[CanonicalTriplet]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| FinkgError::Input(format!("Cannot create {}: {e}", parent.display())))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| FinkgError::Input(format!("Cannot write {}: {e}", path.display())))?;

    for triplet in triplets {
        writer
            .serialize(triplet)
            .map_err(|e| FinkgError::Input(format!("CSV write failed: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| FinkgError::Input(format!("CSV flush failed: {e}")))?;

    info!(path = %path.display(), rows = triplets.len(), "Exported canonical triplets");
    Ok(())
}

/// Read a table written by [`write_triplets_csv`]
pub fn read_triplets_csv(path: &Path) -> Result<Vec<CanonicalTriplet>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| FinkgError::Input(format!("Cannot read {}: {e}", path.display())))?;

    reader
        .deserialize()
        .collect::<std::result::Result<Vec<CanonicalTriplet>, _>>()
        .map_err(|e| FinkgError::Validation(format!("Malformed triplet table: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triplet(head: &str, confidence: Option<f64>) -> CanonicalTriplet {
        CanonicalTriplet {
            head: head.to_string(),
            relation: "ACQUIRED".to_string(),
            tail: "DarwinAI".to_string(),
            confidence,
            head_type: "ENTITY".to_string(),
            tail_type: "ENTITY".to_string(),
        }
    }

    #[test]
    fn test_write_creates_directories_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("cleaned_triplets.csv");

        write_triplets_csv(&path, &[triplet("Apple", Some(0.9))]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("head,relation,tail,confidence,head_type,tail_type")
        );
        assert_eq!(lines.next(), Some("Apple,ACQUIRED,DarwinAI,0.9,ENTITY,ENTITY"));
    }

    #[test]
    fn test_missing_confidence_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triplets.csv");
        let rows = vec![triplet("Apple", Some(0.9)), triplet("Tesla", None)];

        write_triplets_csv(&path, &rows).unwrap();
        let loaded = read_triplets_csv(&path).unwrap();

        assert_eq!(loaded[1].confidence, None);
        assert_eq!(loaded[1].head, "Tesla");
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_triplets_csv(Path::new("/nonexistent/triplets.csv"));
        assert!(matches!(result, Err(FinkgError::Input(_))));
    }
}
