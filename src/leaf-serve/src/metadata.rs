use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use indexmap::IndexMap;
use log::{debug, error};

use crate::{Error, Result};

/// Column joined against the predicted label
pub const KEY_COLUMN: &str = "Common Name";

/// One row of the reference table, keyed by column name in file order.
pub type Record = IndexMap<String, String>;

/// Looks up descriptive rows for a predicted label.
pub trait MetadataLookup: Send + Sync {
    /// All rows whose key column equals `label` exactly, or `None` when no
    /// row matches.
    fn resolve(&self, label: &str) -> Result<Option<Vec<Record>>>;
}

/// Linear scan over a CSV file, re-read on every lookup so edits to the
/// file apply without a restart.
#[derive(Clone, Debug)]
pub struct CsvLookup {
    path: PathBuf,
}

fn key_index(headers: &StringRecord) -> Option<usize> {
    headers.iter().position(|h| h == KEY_COLUMN)
}

impl CsvLookup {
    /// Open the table and check that it carries the key column.
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers = reader.headers()?;

        if key_index(headers).is_none() {
            return Err(Error::MissingColumn {
                path: path.to_path_buf(),
                column: KEY_COLUMN.to_owned(),
            });
        }

        debug!("{}: columns {:?}", path.display(), headers);

        Ok(CsvLookup {
            path: path.to_path_buf(),
        })
    }
}

impl MetadataLookup for CsvLookup {
    fn resolve(&self, label: &str) -> Result<Option<Vec<Record>>> {
        let mut reader = ReaderBuilder::new().flexible(true).from_path(&self.path)?;
        let headers = reader.headers()?.clone();

        let key = match key_index(&headers) {
            Some(key) => key,
            None => {
                error!(
                    "{}: '{}' column not found, no metadata available",
                    self.path.display(),
                    KEY_COLUMN
                );
                return Ok(None);
            }
        };

        let mut matches = Vec::new();

        for row in reader.records() {
            let row = row?;

            if row.get(key) != Some(label) {
                continue;
            }

            let record: Record = headers
                .iter()
                .enumerate()
                .map(|(i, column)| (column.to_owned(), row.get(i).unwrap_or("").to_owned()))
                .collect();

            matches.push(record);
        }

        debug!("'{}': {} matching rows", label, matches.len());

        if matches.is_empty() {
            Ok(None)
        } else {
            Ok(Some(matches))
        }
    }
}
