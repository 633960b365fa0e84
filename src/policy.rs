//! Acceptance policy: which files the gateway will convert at all.
//!
//! Validation is a pure function of the filename, the declared size and the
//! immutable policy. It runs before anything touches the file system, so a
//! rejected request never leaves a trace in the workspace.

use crate::config::{normalize_extension, GatewayConfig};
use crate::error::GatewayError;
use std::collections::BTreeSet;
use std::path::Path;

/// Accepted extensions and the size ceiling.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    allowed_extensions: BTreeSet<String>,
    max_file_size: u64,
}

impl ValidationPolicy {
    pub fn new<I, S>(extensions: I, max_file_size: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_extensions: extensions
                .into_iter()
                .map(|e| normalize_extension(e.as_ref()))
                .filter(|e| !e.is_empty())
                .collect(),
            max_file_size,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            allowed_extensions: config.allowed_extensions.clone(),
            max_file_size: config.max_file_size,
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Accepted extensions, sorted, without dots.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.allowed_extensions.iter().map(String::as_str)
    }

    /// Check `filename` and `size` against the policy.
    ///
    /// Returns the normalised extension on acceptance.
    pub fn validate(&self, filename: &str, size: u64) -> Result<String, GatewayError> {
        let ext = match extension_of(filename) {
            Some(ext) if self.allowed_extensions.contains(&ext) => ext,
            _ => {
                return Err(GatewayError::UnsupportedType {
                    filename: filename.to_string(),
                    allowed: self.allowed_list(),
                })
            }
        };

        if size > self.max_file_size {
            return Err(GatewayError::TooLarge {
                size,
                limit: self.max_file_size,
            });
        }

        Ok(ext)
    }

    fn allowed_list(&self) -> String {
        self.allowed_extensions
            .iter()
            .map(|e| format!(".{e}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Lower-case extension of the last path component, if any.
///
/// Both `/` and `\` count as separators so a Windows-style name sent by a
/// client classifies the same way on every host.
pub fn extension_of(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    Path::new(base)
        .extension()
        .and_then(|e| e.to_str())
        .map(normalize_extension)
        .filter(|e| !e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ValidationPolicy {
        ValidationPolicy::new(["pdf", "docx", "txt"], 1024)
    }

    #[test]
    fn accepts_known_extension_case_insensitively() {
        assert_eq!(policy().validate("Report.PDF", 10).unwrap(), "pdf");
        assert_eq!(policy().validate("notes.txt", 0).unwrap(), "txt");
    }

    #[test]
    fn rejects_unknown_and_missing_extensions() {
        for name in ["setup.exe", "README", "archive.tar.gz", ".bashrc", "trailing."] {
            let err = policy().validate(name, 1).unwrap_err();
            assert!(
                err.to_string().contains("nsupported"),
                "{name}: {err}"
            );
        }
    }

    #[test]
    fn rejection_lists_allowed_types() {
        let err = policy().validate("a.exe", 1).unwrap_err();
        assert!(err.to_string().contains(".docx, .pdf, .txt"), "{err}");
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert!(policy().validate("a.pdf", 1024).is_ok());
        let err = policy().validate("a.pdf", 1025).unwrap_err();
        assert!(matches!(err, GatewayError::TooLarge { size: 1025, limit: 1024 }));
    }

    #[test]
    fn type_is_checked_before_size() {
        let err = policy().validate("a.exe", 1 << 40).unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedType { .. }));
    }

    #[test]
    fn extension_uses_basename_only() {
        assert_eq!(extension_of("dir.pdf/notes"), None);
        assert_eq!(extension_of(r"C:\docs\plan.DOCX"), Some("docx".into()));
        assert_eq!(extension_of("../../etc/passwd"), None);
    }
}
