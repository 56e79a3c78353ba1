//! Write-then-rename JSON persistence shared by settings, checkpoints and
//! retention records (spec §6.5: "All JSON files are written atomically").

use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Serialize `value` as pretty JSON and atomically replace `path`.
///
/// Writes to a sibling temp file first, then renames over the destination so a
/// reader never observes a partially written file.
pub async fn write_json_atomic<T: Serialize + Sync>(
    path: &Path,
    value: &T,
) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await?;

    let tmp_name = format!(
        ".{}.tmp-{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("state"),
        uuid::Uuid::new_v4()
    );
    let tmp_path = parent.join(tmp_name);

    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| std::io::Error::other(format!("serializing {}: {e}", path.display())))?;

    {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
    }

    tokio::fs::rename(&tmp_path, path).await
}

/// Read and deserialize JSON from `path`, or `None` if it does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> std::io::Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| std::io::Error::other(format!("parsing {}: {e}", path.display())))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
