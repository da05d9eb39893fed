use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{SynthError, SynthResult};
use crate::log_item_failure;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub error: String,
}

/// Outcome of a batch: how many items ran and which ones failed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<ItemFailure>,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty() && self.succeeded == self.total
    }

    pub fn log(&self, title: &str) {
        info!("====================================");
        info!("{} COMPLETE", title);
        info!("Successfully processed: {}", self.succeeded);
        info!("Failed: {}", self.failed());
        info!("Total: {}", self.total);
        for failure in &self.failures {
            warn!("  ✗ {}: {}", failure.item, failure.error);
        }
        info!("====================================");
    }
}

/// Run `process` for every item in order, logging and skipping failed items.
/// Returns the summary plus the outputs of the items that succeeded.
///
/// Only a non-recoverable error (bad configuration) stops the batch.
pub async fn run_batch<'a, T, R, D, F, Fut>(
    items: &'a [T],
    describe: D,
    mut process: F,
) -> SynthResult<(BatchSummary, Vec<R>)>
where
    D: Fn(&T) -> String,
    F: FnMut(usize, &'a T) -> Fut,
    Fut: Future<Output = SynthResult<R>>,
{
    let mut summary = BatchSummary {
        total: items.len(),
        ..BatchSummary::default()
    };
    let mut outputs = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let name = describe(item);
        info!("[{}/{}] Processing: {}", index + 1, items.len(), name);

        match process(index, item).await {
            Ok(output) => {
                summary.succeeded += 1;
                outputs.push(output);
            }
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => {
                log_item_failure!(e, name);
                summary.failures.push(ItemFailure {
                    item: name,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok((summary, outputs))
}

/// PDF files directly inside `dir`, sorted by name
pub fn discover_pdfs(dir: &Path) -> SynthResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SynthError::configuration(format!(
            "Batch directory does not exist: {}",
            dir.display()
        )));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| SynthError::file_io(dir.display().to_string(), e))?;
    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect();
    pdfs.sort();

    info!("Found {} PDF files in {:?}", pdfs.len(), dir);
    Ok(pdfs)
}
