//! Word list loading.
//!
//! Username and password lists are streamed line by line and materialized into an
//! ordered `Vec`, since both lists must be fully known before the size of the
//! cartesian product can be computed.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{Result, StomperError};

/// Load every non-empty line of `path`, preserving file order.
///
/// `\n` and `\r\n` line endings are treated identically. Bytes that are not valid
/// UTF-8 are replaced with U+FFFD. Any I/O failure aborts the whole load; no partial
/// list is returned.
#[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
pub async fn load_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let io_error = |source| StomperError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = tokio::fs::File::open(path).await.map_err(io_error)?;
    let mut segments = BufReader::new(file).split(b'\n');

    let mut entries = Vec::new();
    while let Some(segment) = segments.next_segment().await.map_err(io_error)? {
        let line = String::from_utf8_lossy(&segment);
        if let Some(entry) = normalize(&line) {
            entries.push(entry.to_string());
        }
    }

    tracing::debug!(entries = entries.len(), "Loaded word list");
    Ok(entries)
}

/// Like [`load_lines`], but rejects a list with no entries.
pub async fn load_required(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let entries = load_lines(path.as_ref()).await?;
    if entries.is_empty() {
        return Err(StomperError::EmptyWordList {
            path: path.as_ref().to_path_buf(),
        });
    }
    Ok(entries)
}

/// Split an in-memory word list with the same rules as [`load_lines`].
pub fn parse_lines(contents: &str) -> Vec<String> {
    contents
        .split('\n')
        .filter_map(normalize)
        .map(str::to_string)
        .collect()
}

fn normalize(line: &str) -> Option<&str> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    (!line.is_empty()).then_some(line)
}
