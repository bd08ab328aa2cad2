//! JSON lines export of stored crawl records

use crate::storage::Storage;
use crate::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes every stored record as one JSON object per line, ordered by URL
///
/// # Returns
///
/// Number of records written
pub fn export_json_lines(storage: &dyn Storage, path: &Path) -> Result<u64> {
    let datums = storage.load_all()?;
    let mut writer = BufWriter::new(File::create(path)?);

    for datum in &datums {
        serde_json::to_writer(&mut writer, datum)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    tracing::info!("Exported {} records to {}", datums.len(), path.display());
    Ok(datums.len() as u64)
}
