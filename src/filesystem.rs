use crate::models::{EntityRef, PhotoType};
use std::io::{ErrorKind, Result};
use std::path::{Path, PathBuf};

const MAX_COMPONENT_LEN: usize = 40;

/// Directory holding the photos of one entity:
/// `<photo_dir>/<entity_type>/<entity_id>`
pub fn entity_dir(photo_dir: &Path, entity: EntityRef) -> PathBuf {
    photo_dir
        .join(entity.entity_type().as_str().to_lowercase())
        .join(entity.id().to_string())
}

/// Makes a user supplied name safe for use inside a file name
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .take(MAX_COMPONENT_LEN)
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Standardized photo name: `{prefix_1}_..._{prefix_n}_{TYPE}_{sequence}.jpg`
/// with every prefix part sanitized.
pub fn photo_file_name(prefix: &[String], photo_type: PhotoType, sequence: i64) -> String {
    let mut parts: Vec<String> = prefix.iter().map(|p| sanitize_component(p)).collect();
    parts.push(photo_type.as_str().to_string());
    parts.push(sequence.to_string());
    format!("{}.jpg", parts.join("_"))
}

/// Removes a photo file, returns whether it existed
pub async fn remove_photo_file(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("Harbour West"), "Harbour_West");
        assert_eq!(sanitize_component("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_component("  "), "unnamed");
        assert_eq!(sanitize_component("../"), "unnamed");
        assert_eq!(sanitize_component("Straße-7"), "Straße-7");
        assert_eq!(sanitize_component(&"x".repeat(80)).len(), MAX_COMPONENT_LEN);
    }

    #[test]
    fn test_photo_file_names() {
        assert_eq!(
            photo_file_name(&["Bridge A7".to_string()], PhotoType::Overview, 0),
            "Bridge_A7_OVERVIEW_0.jpg"
        );
        assert_eq!(
            photo_file_name(
                &["Demo".to_string(), "Van 1".to_string(), "Loop".to_string(), "P3".to_string()],
                PhotoType::MiddlePoint,
                2
            ),
            "Demo_Van_1_Loop_P3_MIDDLE_POINT_2.jpg"
        );
    }

    #[test]
    fn test_entity_dir() {
        let id = Uuid::new_v4();
        let dir = entity_dir(Path::new("/photos"), EntityRef::TrackPoint(id));
        assert_eq!(dir, PathBuf::from(format!("/photos/track_point/{}", id)));
    }

    #[tokio::test]
    async fn test_remove_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        assert!(!remove_photo_file(&path).await.unwrap());
        std::fs::write(&path, b"jpeg").unwrap();
        assert!(remove_photo_file(&path).await.unwrap());
        assert!(!path.exists());
    }
}
