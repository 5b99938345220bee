//! POSIX-like path normalization and glob-to-LIKE translation.
//!
//! Paths are `/`-separated keys scoped to `(tenant, agent)`. Globs are
//! translated to SQL LIKE patterns with `\` as the escape character; `*`
//! matches `%`, which crosses `/` boundaries. Strict per-segment glob
//! semantics are deliberately not implemented.

use std::collections::BTreeMap;

use crate::{
  Error, Result,
  entry::{ListItem, ListingKind},
};

/// Maximum length of a path or glob pattern, in bytes.
pub const MAX_PATH_BYTES: usize = 512;

/// Maximum number of `/`-separated segments in a path.
pub const MAX_PATH_SEGMENTS: usize = 64;

/// Client writes under this namespace are rejected.
pub const RESERVED_PREFIX: &str = "/sys";

// ─── Normalization ───────────────────────────────────────────────────────────

/// Normalize a raw client path.
///
/// Requires a leading `/`; collapses consecutive separators; strips the
/// trailing `/` except for the root; rejects `.` and `..` segments and paths
/// exceeding [`MAX_PATH_BYTES`] or [`MAX_PATH_SEGMENTS`].
pub fn normalize_path(raw: &str) -> Result<String> {
  if !raw.starts_with('/') {
    return Err(Error::InvalidPath("path must start with '/'".into()));
  }
  if raw.len() > MAX_PATH_BYTES {
    return Err(Error::InvalidPath(format!(
      "path exceeds {MAX_PATH_BYTES} bytes"
    )));
  }

  let mut segments: Vec<&str> = Vec::new();
  for segment in raw.split('/') {
    if segment.is_empty() {
      continue; // collapse consecutive '/' and the trailing '/'
    }
    if segment == "." || segment == ".." {
      return Err(Error::InvalidPath(format!(
        "path segment {segment:?} is not allowed"
      )));
    }
    segments.push(segment);
  }

  if segments.len() > MAX_PATH_SEGMENTS {
    return Err(Error::InvalidPath(format!(
      "path exceeds {MAX_PATH_SEGMENTS} segments"
    )));
  }

  if segments.is_empty() {
    return Ok("/".to_owned());
  }
  Ok(format!("/{}", segments.join("/")))
}

/// Whether `path` falls inside the read-only `/sys` namespace.
///
/// Expects an already-normalized path.
pub fn is_reserved(path: &str) -> bool {
  path == RESERVED_PREFIX || path.starts_with("/sys/")
}

// ─── LIKE escaping ───────────────────────────────────────────────────────────

/// Escape `%`, `_`, and `\` so `literal` matches itself under
/// `LIKE … ESCAPE '\'`.
pub fn escape_like(literal: &str) -> String {
  let mut out = String::with_capacity(literal.len());
  for c in literal.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

// ─── Glob ────────────────────────────────────────────────────────────────────

/// Validate a glob pattern: leading `/`, bounded length, and no empty, `.`,
/// or `..` segments. Glob metacharacters count as ordinary segment content.
pub fn validate_glob(pattern: &str) -> Result<()> {
  if !pattern.starts_with('/') {
    return Err(Error::InvalidGlob("pattern must start with '/'".into()));
  }
  if pattern.len() > MAX_PATH_BYTES {
    return Err(Error::InvalidGlob(format!(
      "pattern exceeds {MAX_PATH_BYTES} bytes"
    )));
  }
  let rest = &pattern[1..];
  if rest.is_empty() {
    return Ok(()); // the root pattern "/"
  }
  for segment in rest.split('/') {
    if segment.is_empty() {
      return Err(Error::InvalidGlob("empty path segment".into()));
    }
    if segment == "." || segment == ".." {
      return Err(Error::InvalidGlob(format!(
        "segment {segment:?} is not allowed"
      )));
    }
  }
  Ok(())
}

/// Translate a validated glob into a LIKE pattern with `\` escapes.
///
/// `**` and `*` both become `%`, `?` becomes `_`, and literal `%`, `_`, `\`
/// are escaped. `%` crosses `/` boundaries; this approximation is documented
/// behavior, not a bug.
pub fn glob_to_like(pattern: &str) -> Result<String> {
  validate_glob(pattern)?;

  let mut out = String::with_capacity(pattern.len());
  let mut chars = pattern.chars().peekable();
  while let Some(c) = chars.next() {
    match c {
      '*' => {
        if chars.peek() == Some(&'*') {
          chars.next();
        }
        out.push('%');
      }
      '?' => out.push('_'),
      '%' | '_' | '\\' => {
        out.push('\\');
        out.push(c);
      }
      other => out.push(other),
    }
  }
  Ok(out)
}

// ─── Listing ─────────────────────────────────────────────────────────────────

/// Compute the direct children of `prefix` from raw matching paths.
///
/// A child whose suffix contains a further `/` is a directory, otherwise a
/// file. Children are deduplicated by path; a name that appears both as a
/// file and as a directory is reported as a directory.
pub fn direct_children(prefix: &str, paths: &[String]) -> Vec<ListItem> {
  let base = if prefix == "/" {
    "/".to_owned()
  } else {
    format!("{prefix}/")
  };

  let mut children: BTreeMap<String, ListingKind> = BTreeMap::new();
  for path in paths {
    let Some(suffix) = path.strip_prefix(&base) else {
      continue;
    };
    if suffix.is_empty() {
      continue;
    }
    let (name, kind) = match suffix.find('/') {
      Some(i) => (&suffix[..i], ListingKind::Dir),
      None => (suffix, ListingKind::File),
    };
    let child_path = format!("{base}{name}");
    children
      .entry(child_path)
      .and_modify(|existing| {
        if kind == ListingKind::Dir {
          *existing = ListingKind::Dir;
        }
      })
      .or_insert(kind);
  }

  children
    .into_iter()
    .map(|(path, kind)| ListItem { path, kind })
    .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
