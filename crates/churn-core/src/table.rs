//! [`Table`]: the rectangular, CSV-shaped value every dataset is held in.
//!
//! Cells are kept as strings exactly as they were read; the empty string is
//! the missing value. Column kinds are inferred on demand rather than stored,
//! so a table round-trips through a CSV file without drifting.

use crate::{Error, Result};

// ─── Column kinds ────────────────────────────────────────────────────────────

/// The inferred kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
  /// Every non-empty cell parses as a number. An all-empty column counts as
  /// numeric, matching how CSV readers type a column of nothing but gaps.
  Numeric,
  Text,
}

impl ColumnKind {
  /// The value used to back-fill this kind of column when a schema grows.
  pub fn default_fill(self) -> &'static str {
    match self {
      Self::Numeric => "0",
      Self::Text => "",
    }
  }
}

/// Parse a cell as a number, treating blanks as missing.
pub fn parse_number(cell: &str) -> Option<f64> {
  let trimmed = cell.trim();
  if trimmed.is_empty() {
    return None;
  }
  trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a cell as an integer identifier. Integral floats (`2001.0`) are
/// accepted because identifier columns with gaps get written that way.
pub fn parse_id(cell: &str) -> Option<i64> {
  let trimmed = cell.trim();
  if let Ok(id) = trimmed.parse::<i64>() {
    return Some(id);
  }
  let value = parse_number(trimmed)?;
  if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
    Some(value as i64)
  } else {
    None
  }
}

/// Format a computed number for storage in a cell.
pub fn format_number(value: f64) -> String {
  if value.fract() == 0.0 && value.abs() < 1e15 {
    format!("{}", value as i64)
  } else {
    format!("{value}")
  }
}

// ─── Table ───────────────────────────────────────────────────────────────────

/// An ordered set of named columns and the rows beneath them.
///
/// Every row has exactly one cell per column; all constructors and mutators
/// keep that invariant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
  columns: Vec<String>,
  rows:    Vec<Vec<String>>,
}

/// A borrowed row with by-name cell lookup.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
  columns: &'a [String],
  cells:   &'a [String],
}

impl<'a> RowRef<'a> {
  pub fn get(&self, column: &str) -> Option<&'a str> {
    let idx = self.columns.iter().position(|c| c == column)?;
    self.cells.get(idx).map(String::as_str)
  }

  pub fn cells(&self) -> &'a [String] { self.cells }
}

impl Table {
  /// An empty table with the given header.
  pub fn new<I, S>(columns: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      columns: columns.into_iter().map(Into::into).collect(),
      rows:    Vec::new(),
    }
  }

  /// Build a table, rejecting rows whose width differs from the header.
  pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<String>>) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut table = Self::new(columns);
    for row in rows {
      table.push_row(row)?;
    }
    Ok(table)
  }

  pub fn columns(&self) -> &[String] { &self.columns }

  pub fn rows(&self) -> &[Vec<String>] { &self.rows }

  pub fn len(&self) -> usize { self.rows.len() }

  pub fn is_empty(&self) -> bool { self.rows.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> + '_ {
    self.rows.iter().map(|cells| RowRef {
      columns: &self.columns,
      cells,
    })
  }

  pub fn column_index(&self, name: &str) -> Option<usize> {
    self.columns.iter().position(|c| c == name)
  }

  pub fn has_column(&self, name: &str) -> bool {
    self.column_index(name).is_some()
  }

  pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
    if row.len() != self.columns.len() {
      return Err(Error::RaggedRow {
        row:      self.rows.len(),
        expected: self.columns.len(),
        found:    row.len(),
      });
    }
    self.rows.push(row);
    Ok(())
  }

  /// The cells of one column, top to bottom.
  pub fn column<'a>(
    &'a self,
    name: &str,
  ) -> Option<impl Iterator<Item = &'a str> + use<'a>> {
    let idx = self.column_index(name)?;
    Some(self.rows.iter().map(move |row| row[idx].as_str()))
  }

  pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
    let mut cells = self.column(name)?;
    let numeric = cells.all(|c| c.trim().is_empty() || parse_number(c).is_some());
    Some(if numeric { ColumnKind::Numeric } else { ColumnKind::Text })
  }

  /// Append a column filled with `fill`. Does nothing if it already exists.
  pub fn add_column(&mut self, name: &str, fill: &str) {
    if self.has_column(name) {
      return;
    }
    self.columns.push(name.to_owned());
    for row in &mut self.rows {
      row.push(fill.to_owned());
    }
  }

  /// Insert a column at `at` with one value per row.
  pub fn insert_column(
    &mut self,
    at: usize,
    name: &str,
    values: Vec<String>,
  ) -> Result<()> {
    if values.len() != self.rows.len() {
      return Err(Error::RaggedRow {
        row:      0,
        expected: self.rows.len(),
        found:    values.len(),
      });
    }
    let at = at.min(self.columns.len());
    self.columns.insert(at, name.to_owned());
    for (row, value) in self.rows.iter_mut().zip(values) {
      row.insert(at, value);
    }
    Ok(())
  }

  /// Remove a column; returns whether it existed.
  pub fn drop_column(&mut self, name: &str) -> bool {
    let Some(idx) = self.column_index(name) else {
      return false;
    };
    self.columns.remove(idx);
    for row in &mut self.rows {
      row.remove(idx);
    }
    true
  }

  /// Rearrange into `order`. Columns named in `order` that this table lacks
  /// come out empty; columns not named in `order` are dropped.
  pub fn reordered(&self, order: &[String]) -> Self {
    let sources: Vec<Option<usize>> =
      order.iter().map(|c| self.column_index(c)).collect();
    let rows = self
      .rows
      .iter()
      .map(|row| {
        sources
          .iter()
          .map(|src| src.map(|i| row[i].clone()).unwrap_or_default())
          .collect()
      })
      .collect();
    Self {
      columns: order.to_vec(),
      rows,
    }
  }

  /// Keep only the rows for which `keep` returns true.
  pub fn filtered(&self, mut keep: impl FnMut(RowRef<'_>) -> bool) -> Self {
    let rows = self
      .rows
      .iter()
      .filter(|cells| {
        keep(RowRef {
          columns: &self.columns,
          cells,
        })
      })
      .cloned()
      .collect();
    Self {
      columns: self.columns.clone(),
      rows,
    }
  }

  /// Rewrite the cells of one column. `f` returns `Some` to replace a cell.
  /// Returns how many cells changed, or `None` if the column is absent.
  pub fn map_column(
    &mut self,
    name: &str,
    mut f: impl FnMut(&str) -> Option<String>,
  ) -> Option<usize> {
    let idx = self.column_index(name)?;
    let mut changed = 0;
    for row in &mut self.rows {
      if let Some(next) = f(&row[idx])
        && next != row[idx]
      {
        row[idx] = next;
        changed += 1;
      }
    }
    Some(changed)
  }

  /// Append the rows of `other`, matching cells by column name. Columns of
  /// `other` that this table lacks are ignored; cells this table has but
  /// `other` lacks come out empty.
  pub fn extend_from(&mut self, other: &Self) {
    let aligned = other.reordered(&self.columns);
    self.rows.extend(aligned.rows);
  }

  /// Every parseable identifier in `key`, in row order.
  pub fn ids<'a>(&'a self, key: &str) -> impl Iterator<Item = i64> + use<'a> {
    self
      .column(key)
      .into_iter()
      .flatten()
      .filter_map(parse_id)
  }

  pub fn max_id(&self, key: &str) -> Option<i64> { self.ids(key).max() }
}
