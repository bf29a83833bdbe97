//! Append-or-merge of a batch into a keyed table.
//!
//! The policy is last-write-wins: rows are concatenated (existing first, batch
//! second) and for every key only the final occurrence survives. There is no
//! field-level merging and no conflict detection beyond "newer replaces older".

use std::collections::HashSet;

use crate::{
  Error, Result,
  table::{Table, parse_id},
};

/// Normalised key cell, so `2001` and `2001.0` collide.
#[derive(Debug, PartialEq, Eq, Hash)]
enum Key<'a> {
  Id(i64),
  Raw(&'a str),
}

fn key_of(cell: &str) -> Option<Key<'_>> {
  let trimmed = cell.trim();
  if trimmed.is_empty() {
    return None;
  }
  Some(parse_id(trimmed).map_or(Key::Raw(trimmed), Key::Id))
}

/// Add every column of `from` that `into` lacks, back-filled with the default
/// for the kind that column has in `from`.
fn adopt_columns(into: &mut Table, from: &Table) {
  for column in from.columns() {
    if into.has_column(column) {
      continue;
    }
    let fill = from
      .column_kind(column)
      .map(|k| k.default_fill())
      .unwrap_or_default();
    into.add_column(column, fill);
  }
}

/// Merge `batch` into `existing`, deduplicating on `key`.
///
/// - With no existing table, or one without rows, the batch is returned as is.
/// - Columns are unioned in both directions; the result lists the batch's
///   columns first, then the columns only the existing table had.
/// - Rows whose key cell is blank are kept; they identify nothing.
///
/// Fails with [`Error::MissingKeyColumn`] if neither side has `key`.
pub fn merge(existing: Option<&Table>, batch: &Table, key: &str) -> Result<Table> {
  let existing = match existing {
    Some(table) if !table.is_empty() => table,
    _ => return Ok(batch.clone()),
  };

  let mut old = existing.clone();
  let mut new = batch.clone();
  adopt_columns(&mut old, batch);
  adopt_columns(&mut new, existing);

  let order = new.columns().to_vec();
  let key_idx = new
    .column_index(key)
    .ok_or_else(|| Error::MissingKeyColumn(key.to_owned()))?;

  let mut combined = old.reordered(&order);
  combined.extend_from(&new);

  let rows = combined.rows();
  let mut seen = HashSet::new();
  let mut survivors: Vec<&Vec<String>> = rows
    .iter()
    .rev()
    .filter(|row| match key_of(&row[key_idx]) {
      Some(k) => seen.insert(k),
      None => true,
    })
    .collect();
  survivors.reverse();

  Table::from_rows(order, survivors.into_iter().cloned().collect())
}
