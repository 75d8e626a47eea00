//! CSV dump: one file per (metric, tenant), rows `<unix-nanos>,<value>`.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};

use super::Point;

pub(super) fn write_series(
    dir: &Path,
    series: &BTreeMap<(String, u32), Vec<Point>>,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("create stats dir: {}", dir.display()))?;
    let mut written = Vec::with_capacity(series.len());
    for ((name, tenant), points) in series {
        let path = dir.join(format!("{}.{}.csv", name, tenant));
        let file =
            fs::File::create(&path).with_context(|| format!("create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        for p in points {
            let nanos = p.at.duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
            writeln!(out, "{},{}", nanos, p.value)?;
        }
        out.flush()
            .with_context(|| format!("write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
