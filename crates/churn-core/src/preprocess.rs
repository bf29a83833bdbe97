//! Batch preprocessing and the per-model projections.

use crate::{
  dataset::columns,
  table::{ColumnKind, RowRef, Table, format_number, parse_number},
};

/// Upper bound applied to every `Day_*` usage column before training.
pub const DAY_USAGE_CAP: f64 = 300.0;

/// Fill blanks in each numeric feature column with that column's mean over
/// `batch`. Identifier, label and review columns are left alone, as are
/// columns with no values at all.
pub fn impute_means(batch: &Table) -> Table {
  let mut out = batch.clone();
  for column in batch.columns() {
    if columns::NOT_IMPUTED.contains(&column.as_str())
      || batch.column_kind(column) != Some(ColumnKind::Numeric)
    {
      continue;
    }
    let values: Vec<f64> = batch
      .column(column)
      .into_iter()
      .flatten()
      .filter_map(parse_number)
      .collect();
    if values.is_empty() {
      continue;
    }
    let mean = format_number(values.iter().sum::<f64>() / values.len() as f64);
    out.map_column(column, |cell| cell.trim().is_empty().then(|| mean.clone()));
  }
  out
}

/// Clip numeric cells in `Day_*` columns to `cap`.
pub fn clip_day_columns(batch: &mut Table, cap: f64) {
  let day_columns: Vec<String> = batch
    .columns()
    .iter()
    .filter(|c| c.starts_with(columns::DAY_PREFIX))
    .cloned()
    .collect();
  for column in day_columns {
    batch.map_column(&column, |cell| {
      parse_number(cell)
        .filter(|v| *v > cap)
        .map(|_| format_number(cap))
    });
  }
}

/// Whether a row carries a non-blank review.
pub fn has_review(row: RowRef<'_>) -> bool {
  row
    .get(columns::REVIEW)
    .is_some_and(|review| !review.trim().is_empty())
}

/// A batch projected for each model's training table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSplit {
  /// Every row, without the free-text review.
  pub model_a: Table,
  /// Only rows with a review, all columns kept.
  pub model_b: Table,
}

impl ModelSplit {
  pub fn total(&self) -> usize { self.model_a.len() }

  pub fn with_reviews(&self) -> usize { self.model_b.len() }
}

/// Project a preprocessed batch into the two training shapes.
pub fn split_for_models(batch: &Table) -> ModelSplit {
  let model_b = batch.filtered(has_review);
  let mut model_a = batch.clone();
  model_a.drop_column(columns::REVIEW);
  ModelSplit { model_a, model_b }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
    Table::from_rows(
      columns.iter().copied(),
      rows
        .iter()
        .map(|r| r.iter().map(|c| (*c).to_owned()).collect())
        .collect(),
    )
    .unwrap()
  }

  #[test]
  fn imputes_numeric_features_only() {
    let batch = table(
      &["userid", "screen", "is_churned", "review", "city"],
      &[
        &["1", "2", "", "", "x"],
        &["2", "", "1", "ok", ""],
        &["", "4", "0", "", "y"],
      ],
    );
    let out = impute_means(&batch);
    assert_eq!(out.column("screen").unwrap().collect::<Vec<_>>(), vec![
      "2", "3", "4"
    ]);
    // excluded and text columns keep their gaps
    assert_eq!(out.rows()[0][2], "");
    assert_eq!(out.rows()[2][0], "");
    assert_eq!(out.rows()[1][4], "");
  }

  #[test]
  fn all_blank_numeric_column_stays_blank() {
    let batch = table(&["userid", "z"], &[&["1", ""]]);
    assert_eq!(impute_means(&batch), batch);
  }

  #[test]
  fn fractional_means_keep_precision() {
    let batch = table(&["f"], &[&["1"], &["2"], &[""]]);
    assert_eq!(impute_means(&batch).rows()[2][0], "1.5");
  }

  #[test]
  fn day_columns_are_capped() {
    let mut batch = table(&["Day_1", "Day_2", "other"], &[
      &["450", "12", "999"],
      &["", "300.5", "1"],
    ]);
    clip_day_columns(&mut batch, DAY_USAGE_CAP);
    assert_eq!(batch.rows()[0], vec!["300", "12", "999"]);
    assert_eq!(batch.rows()[1], vec!["", "300", "1"]);
  }

  #[test]
  fn split_projects_each_model() {
    let batch = table(&["userid", "review", "x"], &[
      &["1", "love it", "a"],
      &["2", "   ", "b"],
      &["3", "", "c"],
    ]);
    let split = split_for_models(&batch);
    assert_eq!(split.total(), 3);
    assert_eq!(split.with_reviews(), 1);
    assert!(!split.model_a.has_column("review"));
    assert!(split.model_b.has_column("review"));
    assert_eq!(split.model_b.rows()[0][0], "1");
  }
}
