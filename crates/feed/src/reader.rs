use std::{
    fs::File,
    io::{self, BufRead, BufReader, Lines},
    path::{Path, PathBuf},
};

use log::debug;
use thiserror::Error;

use crate::{
    COL_BODY, COL_ENTITY_ID, COL_RECORD_ID,
    record::{Batch, Record},
    split_fields,
};

#[derive(Debug, Error)]
pub enum FeedError {
    /// The feed could not be opened at all. Fatal to the run and
    /// distinct from a feed that opens but holds no rows.
    #[error("feed {path} unavailable: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("feed {path} has no header row")]
    MissingHeader { path: PathBuf },

    #[error("feed {path} is missing required column {column}")]
    MissingColumn { path: PathBuf, column: &'static str },

    /// A row that cannot become a record. Fatal mid-stream; batches
    /// already produced stay valid.
    #[error("feed row {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("feed read error at row {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: io::Error,
    },
}

/// Header positions of the required columns. Extra columns are
/// tolerated and ignored; order does not matter.
#[derive(Debug)]
struct Columns {
    id: usize,
    entity: usize,
    body: usize,
    /// Minimum field count a data row must have.
    width: usize,
}

fn resolve_columns(path: &Path, header: &str) -> Result<Columns, FeedError> {
    let names = split_fields(header);

    let position = |column: &'static str| {
        names
            .iter()
            .position(|n| n == column)
            .ok_or(FeedError::MissingColumn {
                path: path.to_path_buf(),
                column,
            })
    };

    let id = position(COL_RECORD_ID)?;
    let entity = position(COL_ENTITY_ID)?;
    let body = position(COL_BODY)?;

    Ok(Columns {
        id,
        entity,
        body,
        width: id.max(entity).max(body) + 1,
    })
}

/// Lazy, finite, non-restartable batch source over a header-first
/// delimited feed file. Yields fixed-size batches in feed order; the
/// final batch may be short.
#[derive(Debug)]
pub struct BatchReader {
    lines: Lines<BufReader<File>>,
    columns: Columns,
    batch_size: usize,
    /// 1-based feed line most recently consumed (header is line 1).
    line: usize,
    done: bool,
}

impl BatchReader {
    pub fn open(path: &Path, batch_size: usize) -> Result<Self, FeedError> {
        let file = File::open(path).map_err(|source| FeedError::Unavailable {
            path: path.to_path_buf(),
            source,
        })?;

        let mut lines = BufReader::new(file).lines();
        let header = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(source)) => return Err(FeedError::Read { line: 1, source }),
            None => {
                return Err(FeedError::MissingHeader {
                    path: path.to_path_buf(),
                });
            }
        };

        let columns = resolve_columns(path, &header)?;

        debug!(
            "[feed] opened {} (batch size {batch_size})",
            path.display()
        );

        Ok(Self {
            lines,
            columns,
            batch_size,
            line: 1,
            done: false,
        })
    }

    fn parse_row(&self, line: &str) -> Result<Record, FeedError> {
        let mut fields = split_fields(line);
        if fields.len() < self.columns.width {
            return Err(FeedError::MalformedRow {
                line: self.line,
                reason: format!(
                    "expected at least {} fields, found {}",
                    self.columns.width,
                    fields.len()
                ),
            });
        }

        let id = std::mem::take(&mut fields[self.columns.id]);
        let entity_id = std::mem::take(&mut fields[self.columns.entity]);
        let body = std::mem::take(&mut fields[self.columns.body]);

        if id.is_empty() || entity_id.is_empty() || body.is_empty() {
            return Err(FeedError::MalformedRow {
                line: self.line,
                reason: "empty required field".to_string(),
            });
        }

        Ok(Record {
            id,
            entity_id,
            body,
        })
    }
}

impl Iterator for BatchReader {
    type Item = Result<Batch, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut batch = Vec::with_capacity(self.batch_size);

        while batch.len() < self.batch_size {
            match self.lines.next() {
                Some(Ok(line)) => {
                    self.line += 1;
                    // Trailing newline at EOF shows up as one empty line.
                    if line.is_empty() {
                        continue;
                    }
                    match self.parse_row(&line) {
                        Ok(record) => batch.push(record),
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
                Some(Err(source)) => {
                    self.done = true;
                    return Some(Err(FeedError::Read {
                        line: self.line + 1,
                        source,
                    }));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

/// Load the entity ids a directory should be seeded with, from a
/// header-first delimited file carrying an `ENTITY_ID` column.
pub fn read_entity_ids(path: &Path) -> Result<Vec<String>, FeedError> {
    let file = File::open(path).map_err(|source| FeedError::Unavailable {
        path: path.to_path_buf(),
        source,
    })?;

    let mut lines = BufReader::new(file).lines();
    let header = match lines.next() {
        Some(Ok(line)) => line,
        Some(Err(source)) => return Err(FeedError::Read { line: 1, source }),
        None => {
            return Err(FeedError::MissingHeader {
                path: path.to_path_buf(),
            });
        }
    };

    let names = split_fields(&header);
    let entity = names
        .iter()
        .position(|n| n == COL_ENTITY_ID)
        .ok_or(FeedError::MissingColumn {
            path: path.to_path_buf(),
            column: COL_ENTITY_ID,
        })?;

    let mut ids = Vec::new();
    for (offset, line) in lines.enumerate() {
        let line_no = offset + 2;
        let line = line.map_err(|source| FeedError::Read {
            line: line_no,
            source,
        })?;
        if line.is_empty() {
            continue;
        }

        let mut fields = split_fields(&line);
        if fields.len() <= entity || fields[entity].is_empty() {
            return Err(FeedError::MalformedRow {
                line: line_no,
                reason: "missing entity id".to_string(),
            });
        }
        ids.push(std::mem::take(&mut fields[entity]));
    }

    Ok(ids)
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod tests;
