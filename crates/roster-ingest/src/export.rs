//! JSON export of stored students

use roster_common::Result;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::models::{CompactStudent, StudentRecord};

/// Write `records` as one JSON array of [`CompactStudent`]
///
/// Returns the number of records written.
pub fn write_compact<W: Write>(records: Vec<StudentRecord>, writer: W) -> Result<usize> {
    let count = records.len();
    let compact: Vec<CompactStudent> = records.into_iter().map(CompactStudent::from).collect();

    let mut writer = BufWriter::new(writer);
    serde_json::to_writer(&mut writer, &compact)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    Ok(count)
}

/// Export to `path`, or stdout when no path is given
pub fn export(records: Vec<StudentRecord>, path: Option<&Path>) -> Result<usize> {
    match path {
        Some(path) => {
            let count = write_compact(records, File::create(path)?)?;
            info!(count, path = %path.display(), "Exported students");
            Ok(count)
        },
        None => write_compact(records, io::stdout().lock()),
    }
}
