//! Intermediate pipeline artifacts.
//!
//! Both stages between aggregation and population can persist their output
//! as a JSON object keyed by folder name, each value an ordered list of
//! chunk strings. Keys serialize in lexicographic order; in-memory
//! processing order is carried separately by the pipeline types.

use std::collections::BTreeMap;
use std::path::Path;

use tokio::fs;

use crate::aggregation::FolderChunks;
use crate::enrichment::FolderEnriched;
use crate::types::PipelineError;

/// `folder -> ordered chunk strings`, the on-disk artifact shape.
pub type FolderMap = BTreeMap<String, Vec<String>>;

/// Artifact view of aggregated chunk groups.
pub fn chunk_contents(groups: &[FolderChunks]) -> FolderMap {
    groups
        .iter()
        .map(|group| {
            let contents = group
                .chunks
                .iter()
                .map(|chunk| chunk.content.clone())
                .collect();
            (group.folder.clone(), contents)
        })
        .collect()
}

/// Artifact view of enriched chunks (context prepended to each chunk).
pub fn enriched_contents(folders: &[FolderEnriched]) -> FolderMap {
    folders
        .iter()
        .map(|folder| (folder.folder.clone(), folder.merged_contents()))
        .collect()
}

/// Writes a folder map as pretty-printed JSON, creating parent directories
/// as needed.
pub async fn save_folder_map(path: impl AsRef<Path>, map: &FolderMap) -> Result<(), PipelineError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let serialized = serde_json::to_string_pretty(map)?;
    fs::write(path, serialized).await?;
    Ok(())
}

/// Reads a folder map previously written by [`save_folder_map`].
pub async fn load_folder_map(path: impl AsRef<Path>) -> Result<FolderMap, PipelineError> {
    let data = fs::read_to_string(path.as_ref()).await?;
    Ok(serde_json::from_str(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn folder_map_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("artifacts").join("data_chunks.json");

        let mut map = FolderMap::new();
        map.insert("src".into(), vec!["chunk one".into(), "chunk two".into()]);
        map.insert("docs".into(), vec!["guide".into()]);

        save_folder_map(&path, &map).await.unwrap();
        let loaded = load_folder_map(&path).await.unwrap();
        assert_eq!(loaded, map);
    }

    #[tokio::test]
    async fn missing_artifact_surfaces_as_io_error() {
        let dir = tempdir().unwrap();
        let err = load_folder_map(dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
