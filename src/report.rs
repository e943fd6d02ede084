//! Per-interval dump of every viable genome.

use crate::grid::Grid;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `<dir>/r<tick>.report.csv`
pub fn report_path<P: AsRef<Path>>(dir: P, tick: u64) -> PathBuf {
    dir.as_ref().join(format!("r{}.report.csv", tick))
}

/// Write one header line and one hex line for each viable cell with energy.
///
/// Returns the path written and the number of cells in it.
pub fn write_report<P: AsRef<Path>>(
    dir: P,
    tick: u64,
    grid: &Grid,
) -> Result<(PathBuf, usize), ReportError> {
    let path = report_path(dir, tick);
    let wrap = |source| ReportError::Io {
        path: path.clone(),
        source,
    };

    let file = File::create(&path).map_err(wrap)?;
    let mut out = BufWriter::new(file);
    let mut written = 0usize;
    let mut result = Ok(());

    grid.for_each(|_, cell| {
        if result.is_err() || !cell.is_reportable() {
            return;
        }
        result = writeln!(
            out,
            "ID: {}, parent ID: {}, lineage: {}, generation: {}\n{}",
            cell.id,
            cell.parent_id,
            cell.lineage,
            cell.generation,
            cell.genome.hex_dump()
        );
        written += 1;
    });

    result.and_then(|_| out.flush()).map_err(wrap)?;
    log::info!("[REPORT] {} viable cells -> {}", written, path.display());
    Ok((path, written))
}
