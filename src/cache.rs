use anyhow::{anyhow, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Write `data` as pretty JSON.
///
/// The file is written next to its destination and renamed into place, so a
/// crash mid-write leaves the previous snapshot intact.
pub fn save_to_file<T: Serialize>(data: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let tmp = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp)
            .map_err(|e| anyhow!("Failed to create snapshot file {}: {}", tmp.display(), e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, data)
            .map_err(|e| anyhow!("Failed to write snapshot to {}: {}", tmp.display(), e))?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)
        .map_err(|e| anyhow!("Failed to move snapshot into {}: {}", path.display(), e))?;
    Ok(())
}

/// Read a JSON snapshot written by [`save_to_file`].
pub fn load_from_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| anyhow!("Failed to open snapshot file {}: {}", path.display(), e))?;
    let reader = BufReader::new(file);
    let data = serde_json::from_reader(reader)
        .map_err(|e| anyhow!("Failed to parse snapshot file {}: {}", path.display(), e))?;
    Ok(data)
}
