//! Master index payload parsing.
//!
//! A page payload is a zip archive containing `master.idx`: a preamble block
//! terminated by a dashed separator line, followed by one pipe-delimited row
//! per filing (`CIK|Company Name|Form Type|Date Filed|Filename`). The file
//! is latin-1 encoded; company names routinely contain bytes that are not
//! valid UTF-8.

use crate::error::{Error, Result};
use crate::types::DocumentDescriptor;
use std::io::Read;

/// Parse a `master.zip` payload into descriptors matching `form_types`
///
/// Malformed rows are logged and skipped rather than failing the page: one
/// bad line in a quarter with tens of thousands of filings should not block
/// the rest.
pub(super) fn parse_master_index(
    bytes: &[u8],
    form_types: &[String],
    archives_url: &str,
    year: i32,
) -> Result<Vec<DocumentDescriptor>> {
    let reader = std::io::Cursor::new(bytes);
    let mut archive =
        zip::ZipArchive::new(reader).map_err(|e| Error::IndexArchive(e.to_string()))?;
    let mut index_file = archive
        .by_name("master.idx")
        .map_err(|e| Error::IndexArchive(format!("master.idx missing: {e}")))?;

    let mut raw = Vec::new();
    index_file
        .read_to_end(&mut raw)
        .map_err(|e| Error::IndexArchive(format!("failed to read master.idx: {e}")))?;

    // latin-1: every byte maps directly to the code point of the same value
    let text: String = raw.iter().map(|&b| b as char).collect();

    let archives_url = archives_url.trim_end_matches('/');
    let mut descriptors = Vec::new();

    for line in rows_after_preamble(&text) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.splitn(5, '|');
        let (Some(_cik), Some(_company), Some(form), Some(_date), Some(path)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            tracing::warn!(row = line, "Skipping malformed index row");
            continue;
        };

        if !form_types.iter().any(|f| f == form) {
            continue;
        }

        let Some(identifier) = identifier_from_path(path) else {
            tracing::warn!(row = line, "Skipping index row without an accession number");
            continue;
        };

        descriptors.push(DocumentDescriptor {
            identifier,
            year,
            form_type: form.to_string(),
            source_url: format!("{archives_url}/{path}"),
        });
    }

    Ok(descriptors)
}

/// Iterate the data rows following the dashed separator line
///
/// Returns an empty iterator when no separator is present, which makes an
/// unexpected payload yield zero descriptors instead of garbage ones.
fn rows_after_preamble(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .skip_while(|line| !line.starts_with("--"))
        .skip(1)
}

/// The accession number is the file stem of the filing path's last segment,
/// e.g. `edgar/data/320193/0000320193-19-000010.txt`
fn identifier_from_path(path: &str) -> Option<String> {
    let file_name = path.trim().rsplit('/').next()?;
    let stem = file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _ext)| stem);
    if stem.is_empty() {
        return None;
    }
    Some(stem.to_string())
}
