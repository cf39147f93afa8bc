use std::path::{Path, PathBuf};

use tracing::info;

use crate::pipeline::ProgressReporter;
use crate::tools::MediaTools;
use crate::utils::fs::{exists, remove_file_logged};
use crate::{Error, Result};

/// Concatenate `inputs` (already in segment order) into `dest`.
///
/// Refuses to touch an existing `dest`. The inputs are deleted once the
/// concatenation succeeded; a failed deletion is only logged.
pub async fn merge_segments(
    tools: &dyn MediaTools,
    inputs: &[PathBuf],
    dest: &Path,
    progress: &ProgressReporter,
) -> Result<()> {
    if exists("checking merge destination", dest).await? {
        return Err(Error::assembly(format!(
            "{} already exists, refusing to overwrite it",
            dest.display()
        )));
    }
    if inputs.is_empty() {
        return Err(Error::assembly("nothing to merge"));
    }

    let total = tools
        .probe_total(inputs)
        .await
        .map_err(|e| Error::assembly(format!("probing merge inputs failed: {e}")))?;

    info!(inputs = inputs.len(), dest = %dest.display(), "Merging segments");
    tools
        .concat(inputs, dest, total, &|current, total| {
            progress.duration("merging", current, total)
        })
        .await
        .map_err(|e| Error::assembly(format!("merging into {} failed: {e}", dest.display())))?;

    for input in inputs {
        remove_file_logged(input).await;
    }
    info!(dest = %dest.display(), "Merge finished");
    Ok(())
}
