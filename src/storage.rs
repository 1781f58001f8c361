//! Sequential writer that persists drained results, one per line.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::PipelineError;
use crate::types::TaskResult;

#[cfg(windows)]
const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
const LINE_ENDING: &str = "\n";

fn persist_error(path: &Path, source: io::Error) -> PipelineError {
    PipelineError::Persist {
        path: path.to_path_buf(),
        source,
    }
}

/// Create (or truncate) `path` and write each result on its own line.
pub fn write_results(path: &Path, results: &[TaskResult]) -> Result<(), PipelineError> {
    let file = File::create(path).map_err(|err| persist_error(path, err))?;
    let mut writer = BufWriter::new(file);
    for result in results {
        write!(writer, "{result}{LINE_ENDING}").map_err(|err| persist_error(path, err))?;
    }
    writer.flush().map_err(|err| persist_error(path, err))
}
