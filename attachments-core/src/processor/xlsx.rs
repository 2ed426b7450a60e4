use crate::artifact::Artifact;
use crate::contract::{Capability, Processor};
use crate::error::ProcessError;
use crate::options::ProcessOptions;

pub const DEFAULT_MAX_ROWS: usize = 200;

/// Spreadsheet reader: renders one sheet as CSV text.
///
/// Options: `sheet` (name or zero-based index, defaults to the first sheet)
/// and `max_rows` (data rows after the header, default 200).
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxProcessor;

const FEATURE: &str = "xlsx";
const HINT: &str = "the `xlsx` cargo feature (calamine)";

impl Processor for XlsxProcessor {
    fn capability(&self) -> Capability {
        if cfg!(feature = "xlsx") {
            Capability::Available
        } else {
            Capability::Missing {
                feature: FEATURE.to_string(),
                hint: HINT.to_string(),
            }
        }
    }

    fn process(
        &self,
        data: &[u8],
        _filename: &str,
        options: &ProcessOptions,
    ) -> Result<Artifact, ProcessError> {
        render(data, options)
    }
}

#[cfg_attr(not(feature = "xlsx"), allow(dead_code))]
fn csv_escape(value: &str) -> String {
    if value.contains([',', '\n', '"']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg_attr(not(feature = "xlsx"), allow(dead_code))]
fn choose_sheet(names: &[String], options: &ProcessOptions) -> Option<String> {
    if let Some(name) = options.get_str("sheet") {
        if names.iter().any(|n| n == name) {
            return Some(name.to_string());
        }
    }
    if let Some(index) = options
        .get_i64("sheet")
        .and_then(|i| usize::try_from(i).ok())
    {
        if let Some(name) = names.get(index) {
            return Some(name.clone());
        }
    }
    names.first().cloned()
}

#[cfg(feature = "xlsx")]
fn parse_failed(e: impl std::fmt::Display) -> ProcessError {
    ProcessError::Failed(format!("xlsx parse failed: {e}"))
}

#[cfg(feature = "xlsx")]
fn render(data: &[u8], options: &ProcessOptions) -> Result<Artifact, ProcessError> {
    use calamine::{Reader, Xlsx};
    use std::io::Cursor;

    let max_rows = options
        .get_i64("max_rows")
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(DEFAULT_MAX_ROWS);

    let mut workbook = Xlsx::new(Cursor::new(data.to_vec())).map_err(parse_failed)?;
    let names = workbook.sheet_names();
    let chosen = choose_sheet(&names, options)
        .ok_or_else(|| parse_failed("workbook has no sheets"))?;
    let range = workbook
        .worksheet_range(&chosen)
        .map_err(parse_failed)?;

    let (rows, cols) = range.get_size();
    let text = range
        .rows()
        .take(max_rows.saturating_add(1))
        .map(|row| {
            row.iter()
                .map(|cell| csv_escape(&cell.to_string()))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Artifact::with_text(text)
        .flag("kind", "table")
        .flag("rows", rows)
        .flag("cols", cols)
        .flag("sheets", names)
        .flag("sheet_used", chosen)
        .flag("engine", "calamine"))
}

#[cfg(not(feature = "xlsx"))]
fn render(_data: &[u8], _options: &ProcessOptions) -> Result<Artifact, ProcessError> {
    Err(ProcessError::MissingCapability {
        feature: FEATURE.to_string(),
        hint: HINT.to_string(),
    })
}
