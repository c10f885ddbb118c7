//! Problem catalog loading.
//!
//! The catalog is a hand-authored JSON file, so parse errors are expected
//! during content iteration. Policy is fail-soft: any problem yields an empty
//! catalog plus a diagnostic (with line/column and the offending line) aimed
//! at the content author, never a fatal error for the process.
//!
//! The result is cached process-wide; re-invocation returns the same
//! in-memory value without re-reading the source.

use std::path::Path;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::domain::ProblemRecord;
use crate::util::normalize_nbsp;

pub const DEFAULT_CATALOG_PATH: &str = "./calculus_problems.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
  MissingFile,
  Malformed,
}

/// Content-author-facing parse diagnostic. Not shown to students.
#[derive(Clone, Debug, Serialize)]
pub struct CatalogDiagnostic {
  pub kind: DiagnosticKind,
  pub message: String,
  pub line: Option<usize>,
  pub column: Option<usize>,
  /// Raw text of the offending line, when the source was readable.
  pub source_line: Option<String>,
}

/// The loaded catalog: either the full problem list, or empty plus the
/// diagnostic explaining why.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
  pub problems: Vec<ProblemRecord>,
  pub diagnostic: Option<CatalogDiagnostic>,
}

static CATALOG: OnceCell<Catalog> = OnceCell::new();

/// Load the catalog from CATALOG_PATH (or the default path), at most once per
/// process.
pub fn load_catalog() -> &'static Catalog {
  CATALOG.get_or_init(|| {
    let path =
      std::env::var("CATALOG_PATH").unwrap_or_else(|_| DEFAULT_CATALOG_PATH.to_string());
    load_catalog_from(Path::new(&path))
  })
}

/// Uncached load, used directly by tests and by the cached wrapper above.
#[instrument(level = "info", fields(path = %path.display()))]
pub fn load_catalog_from(path: &Path) -> Catalog {
  let raw = match std::fs::read_to_string(path) {
    Ok(s) => s,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      let diag = CatalogDiagnostic {
        kind: DiagnosticKind::MissingFile,
        message: format!("catalog file not found: {}", path.display()),
        line: None,
        column: None,
        source_line: None,
      };
      error!(target: "catalog", path = %path.display(), "Catalog file not found");
      return Catalog { problems: vec![], diagnostic: Some(diag) };
    }
    Err(e) => {
      let diag = CatalogDiagnostic {
        kind: DiagnosticKind::Malformed,
        message: format!("catalog file unreadable: {e}"),
        line: None,
        column: None,
        source_line: None,
      };
      error!(target: "catalog", path = %path.display(), error = %e, "Catalog file unreadable");
      return Catalog { problems: vec![], diagnostic: Some(diag) };
    }
  };

  // Invisible non-breaking spaces sneak in from copy-pasted math content and
  // break authors' expectations; normalize before parsing.
  let content = normalize_nbsp(&raw);

  match serde_json::from_str::<Vec<ProblemRecord>>(&content) {
    Ok(problems) => {
      info!(target: "catalog", count = problems.len(), "Catalog loaded");
      Catalog { problems, diagnostic: None }
    }
    Err(e) => {
      let line = e.line();
      let column = e.column();
      let source_line = content.lines().nth(line.saturating_sub(1)).map(str::to_string);
      error!(
        target: "catalog",
        %line,
        %column,
        source_line = source_line.as_deref().unwrap_or("<n/a>"),
        error = %e,
        "Catalog JSON is malformed; serving an empty catalog"
      );
      let diag = CatalogDiagnostic {
        kind: DiagnosticKind::Malformed,
        message: e.to_string(),
        line: Some(line),
        column: Some(column),
        source_line,
      };
      Catalog { problems: vec![], diagnostic: Some(diag) }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("temp file");
    f.write_all(content.as_bytes()).expect("write");
    f
  }

  #[test]
  fn valid_catalog_parses_with_targets() {
    let f = write_temp(
      r#"[
  {"id": "CAL_1_01", "category": "Limits", "statement": "s", "targets": {"limit": 6.0}}
]"#,
    );
    let cat = load_catalog_from(f.path());
    assert!(cat.diagnostic.is_none());
    assert_eq!(cat.problems.len(), 1);
    assert_eq!(cat.problems[0].targets["limit"], 6.0);
  }

  #[test]
  fn bad_bracket_yields_empty_catalog_with_line_number() {
    // Missing closing brace on the record (line 2).
    let f = write_temp("[\n  {\"id\": \"CAL_1_01\", \"category\": \"Limits\"\n]");
    let cat = load_catalog_from(f.path());
    assert!(cat.problems.is_empty());
    let diag = cat.diagnostic.expect("diagnostic");
    assert_eq!(diag.kind, DiagnosticKind::Malformed);
    assert_eq!(diag.line, Some(3));
    assert!(diag.source_line.is_some());
  }

  #[test]
  fn missing_file_yields_distinct_diagnostic() {
    let cat = load_catalog_from(Path::new("/nonexistent/problems.json"));
    assert!(cat.problems.is_empty());
    assert_eq!(cat.diagnostic.expect("diagnostic").kind, DiagnosticKind::MissingFile);
  }

  #[test]
  fn nonbreaking_spaces_are_tolerated() {
    let f = write_temp(
      "[\n  {\"id\":\u{00A0}\"CAL_1_01\", \"category\": \"Limits\", \"statement\": \"s\", \"targets\": {}}\n]",
    );
    let cat = load_catalog_from(f.path());
    assert!(cat.diagnostic.is_none());
    assert_eq!(cat.problems.len(), 1);
  }
}
