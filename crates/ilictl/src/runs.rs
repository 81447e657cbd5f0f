use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ili_core::Run;
use tracing::debug;

/// Reads one run file: `{ id, name, date?, units?, features: [...] }`.
pub fn load_run_file(path: &Path) -> Result<Run> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read run file {}", path.display()))?;
    let run: Run = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse run file {}", path.display()))?;
    debug!(
        path = %path.display(),
        run = %run.id,
        features = run.features.len(),
        "loaded run file"
    );
    Ok(run)
}

pub fn load_run_files(paths: &[PathBuf]) -> Result<Vec<Run>> {
    paths.iter().map(|path| load_run_file(path)).collect()
}
