//! CSV encoding of [`Table`]s and the atomic/unique file writers.

use std::{
  fs::{self, OpenOptions},
  io::{self, Write as _},
  path::{Path, PathBuf},
};

use churn_core::{Error as CoreError, table::Table};

use crate::Result;

/// Decode CSV bytes. Zero-sized input is "no table"; a header alone is an
/// empty table. Short rows are padded with blanks; cells past the header
/// are dropped when blank and rejected otherwise.
/// Blank header cells become `Unnamed: <position>`, so an exported row index
/// shows up as `Unnamed: 0`.
pub(crate) fn decode_table(bytes: &[u8]) -> Result<Option<Table>> {
  if bytes.iter().all(u8::is_ascii_whitespace) {
    return Ok(None);
  }
  let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

  let mut reader = csv::ReaderBuilder::new()
    .flexible(true)
    .from_reader(bytes);
  let header: Vec<String> = reader
    .headers()?
    .iter()
    .enumerate()
    .map(|(i, name)| {
      if name.trim().is_empty() {
        format!("Unnamed: {i}")
      } else {
        name.to_owned()
      }
    })
    .collect();
  let width = header.len();

  let mut table = Table::new(header);
  for record in reader.records() {
    let record = record?;
    let mut row: Vec<String> = record.iter().map(str::to_owned).collect();
    if row.iter().skip(width).any(|cell| !cell.trim().is_empty()) {
      return Err(
        CoreError::RaggedRow {
          row:      table.len(),
          expected: width,
          found:    row.len(),
        }
        .into(),
      );
    }
    row.resize(width, String::new());
    table.push_row(row)?;
  }
  Ok(Some(table))
}

pub(crate) fn encode_table(table: &Table) -> Result<Vec<u8>> {
  if table.columns().is_empty() {
    return Ok(Vec::new());
  }
  let mut writer = csv::WriterBuilder::new()
    .terminator(csv::Terminator::Any(b'\n'))
    .from_writer(Vec::new());
  writer.write_record(table.columns())?;
  for row in table.rows() {
    writer.write_record(row)?;
  }
  writer
    .into_inner()
    .map_err(|e| io::Error::other(e.to_string()).into())
}

/// Replace `path` with `bytes` via a temporary file in the same directory.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
  let dir = path.parent().unwrap_or_else(|| Path::new("."));
  fs::create_dir_all(dir)?;
  let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
  tmp.write_all(bytes)?;
  tmp.as_file().sync_all()?;
  tmp.persist(path)?;
  Ok(())
}

/// Create a file that did not exist before, named `<stem><ext>` or, on
/// collision, `<stem>_<n><ext>`. Returns the open file and its path.
pub(crate) fn create_unique(
  dir: &Path,
  stem: &str,
  ext: &str,
) -> Result<(fs::File, PathBuf)> {
  fs::create_dir_all(dir)?;
  let mut n = 0u32;
  loop {
    let name = if n == 0 {
      format!("{stem}{ext}")
    } else {
      format!("{stem}_{n}{ext}")
    };
    let path = dir.join(name);
    match OpenOptions::new().write(true).create_new(true).open(&path) {
      Ok(file) => return Ok((file, path)),
      Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
      Err(e) => return Err(e.into()),
    }
  }
}

/// Create a directory that did not exist before, suffixing `_<n>` on
/// collision.
pub(crate) fn create_unique_dir(parent: &Path, name: &str) -> Result<PathBuf> {
  fs::create_dir_all(parent)?;
  let mut n = 0u32;
  loop {
    let path = if n == 0 {
      parent.join(name)
    } else {
      parent.join(format!("{name}_{n}"))
    };
    match fs::create_dir(&path) {
      Ok(()) => return Ok(path),
      Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
      Err(e) => return Err(e.into()),
    }
  }
}
