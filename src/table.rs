//! In-memory table of string cells and its CSV representation.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use tokio::fs;

use crate::errors::{Error, TransformError};

/// Name of the column appended by [`Table::value_counts`].
pub const COUNT_COLUMN: &str = "count";

/// Rows added by each step of [`Table::page`].
pub const PAGE_SIZE: usize = 10;

/// Header plus rows of string cells. Every row has as many cells as the header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create table. Short rows are padded with empty cells, long rows are truncated.
    pub fn new<H, S>(header: H, rows: Vec<Vec<String>>) -> Self
    where
        H: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let header: Vec<String> = header.into_iter().map(Into::into).collect();
        let width = header.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { header, rows }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of `column` in row order.
    pub fn column(&self, column: &str) -> Result<Vec<&str>, TransformError> {
        let idx = self.column_index(column)?;
        Ok(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    fn column_index(&self, column: &str) -> Result<usize, TransformError> {
        self.header
            .iter()
            .position(|name| name == column)
            .ok_or_else(|| TransformError::MissingColumn(column.to_string()))
    }

    /// Keep only `columns`, in the given order.
    pub fn cut(&self, columns: &[&str]) -> Result<Self, TransformError> {
        let indices = columns
            .iter()
            .map(|column| self.column_index(column))
            .collect::<Result<Vec<_>, _>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Self {
            header: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    /// Rename columns. Names not present in the header are ignored.
    pub fn rename(mut self, renames: &[(&str, &str)]) -> Self {
        for name in self.header.iter_mut() {
            if let Some((_, to)) = renames.iter().find(|(from, _)| *from == name.as_str()) {
                *name = to.to_string();
            }
        }
        self
    }

    /// Replace every cell of `column` with `convert(cell)`.
    pub fn convert<F>(mut self, column: &str, mut convert: F) -> Result<Self, TransformError>
    where
        F: FnMut(&str) -> Result<String, TransformError>,
    {
        let idx = self.column_index(column)?;
        for row in self.rows.iter_mut() {
            row[idx] = convert(&row[idx])?;
        }
        Ok(self)
    }

    /// Inner join with `right` where `left_key` equals `right_key`.
    ///
    /// Result has all columns of `self` followed by the columns of `right`
    /// except `right_key`. Rows keep the order of `self`.
    pub fn join(&self, right: &Table, left_key: &str, right_key: &str) -> Result<Self, TransformError> {
        let left_idx = self.column_index(left_key)?;
        let right_idx = right.column_index(right_key)?;

        let mut index: HashMap<&str, Vec<&Vec<String>>> = HashMap::new();
        for row in &right.rows {
            index.entry(row[right_idx].as_str()).or_default().push(row);
        }

        let mut header = self.header.clone();
        header.extend(
            right
                .header
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != right_idx)
                .map(|(_, name)| name.clone()),
        );

        let mut rows = Vec::new();
        for row in &self.rows {
            let Some(matches) = index.get(row[left_idx].as_str()) else {
                continue;
            };
            for other in matches {
                let mut joined = row.clone();
                joined.extend(
                    other
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != right_idx)
                        .map(|(_, cell)| cell.clone()),
                );
                rows.push(joined);
            }
        }
        Ok(Self { header, rows })
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> Self {
        Self {
            header: self.header.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Rows shown after paging to `offset`: the first `offset + PAGE_SIZE`.
    pub fn page(&self, offset: usize) -> Self {
        self.head(offset.saturating_add(PAGE_SIZE))
    }

    /// Count rows per distinct combination of `columns`.
    ///
    /// Combinations keep first-seen order. The counts go to [`COUNT_COLUMN`].
    pub fn value_counts(&self, columns: &[&str]) -> Result<Self, TransformError> {
        let selected = self.cut(columns)?;
        let mut order: Vec<Vec<String>> = Vec::new();
        let mut counts: HashMap<Vec<String>, usize> = HashMap::new();
        for row in selected.rows {
            let count = counts.entry(row.clone()).or_insert(0);
            if *count == 0 {
                order.push(row);
            }
            *count += 1;
        }
        let rows = order
            .into_iter()
            .map(|mut row| {
                let count = counts[&row];
                row.push(count.to_string());
                row
            })
            .collect();
        let mut header = selected.header;
        header.push(COUNT_COLUMN.to_string());
        Ok(Self { header, rows })
    }

    /// Serialize as CSV: header row first, then one row per record.
    pub fn to_csv(&self) -> Result<Vec<u8>, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if !self.header.is_empty() {
            writer.write_record(&self.header)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
        }
        writer
            .into_inner()
            .map_err(|err| csv::Error::from(err.into_error()))
    }

    /// Parse CSV with a header row.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);
        let header = reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { header, rows })
    }

    /// Load CSV file from `path`.
    pub async fn read_csv(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = fs::read(path.as_ref()).await?;
        Ok(Self::from_csv(content.as_slice())?)
    }
}
