// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Terminal handling for files that cannot complete the pipeline

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use crate::mover::{claim, MAX_COLLISIONS};
use crate::{Result, SmartParseError};

/// Renames failed files in place with a fixed prefix
#[derive(Debug, Clone)]
pub struct FailureHandler {
    marker: String,
}

impl FailureHandler {
    pub fn new(marker: &str) -> Self {
        Self { marker: marker.to_string() }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn is_marked(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&self.marker))
    }

    /// Marked form of `file_name`; attempt > 0 adds `-N` before the extension
    pub fn marked_name(&self, file_name: &str, attempt: u32) -> String {
        let base = if file_name.starts_with(&self.marker) {
            file_name.to_string()
        } else {
            format!("{}{}", self.marker, file_name)
        };
        if attempt == 0 {
            return base;
        }

        let suffix = format!("-{}", attempt + 1);
        match base.rfind('.') {
            Some(dot) if dot > self.marker.len() => {
                format!("{}{}{}", &base[..dot], suffix, &base[dot..])
            }
            _ => format!("{}{}", base, suffix),
        }
    }

    /// Prefix the file with the marker, leaving it in its directory.
    ///
    /// Already-marked files are left alone and their path returned.
    pub fn mark(&self, path: &Path) -> Result<PathBuf> {
        if self.is_marked(path) {
            return Ok(path.to_path_buf());
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SmartParseError::FatalIo(io::Error::new(
                ErrorKind::InvalidInput,
                format!("cannot mark {:?}: no UTF-8 file name", path),
            )))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        for attempt in 0..MAX_COLLISIONS {
            let candidate = dir.join(self.marked_name(file_name, attempt));
            match claim(path, &candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(SmartParseError::from_move_error(e)),
            }
        }

        Err(SmartParseError::FatalIo(io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free failure name for {:?}", path),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marked_names() {
        let handler = FailureHandler::new("failed_");
        assert_eq!(handler.marked_name("report.doc", 0), "failed_report.doc");
        assert_eq!(handler.marked_name("failed_report.doc", 0), "failed_report.doc");
        assert_eq!(handler.marked_name("report.doc", 1), "failed_report-2.doc");
        assert_eq!(handler.marked_name("README", 2), "failed_README-3");
    }

    #[test]
    fn test_marking_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.doc");
        std::fs::write(&path, b"legacy").unwrap();
        let handler = FailureHandler::new("failed_");

        let once = handler.mark(&path).unwrap();
        let twice = handler.mark(&once).unwrap();

        assert_eq!(once, dir.path().join("failed_report.doc"));
        assert_eq!(twice, once);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_existing_marked_file_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("failed_a.pdf"), b"older").unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"newer").unwrap();

        let marked = FailureHandler::new("failed_").mark(&path).unwrap();

        assert_eq!(marked, dir.path().join("failed_a-2.pdf"));
        assert_eq!(std::fs::read(dir.path().join("failed_a.pdf")).unwrap(), b"older");
    }
}
