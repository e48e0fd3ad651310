//! Validation of caller-supplied names before they touch the filesystem.
//!
//! User ids become directory names and uploaded file names become on-disk keys, so
//! both must be exactly one plain path component. Anything that could climb out of
//! the namespace (separators, `.`/`..`, NUL) is refused up front; resolved
//! namespace directories are additionally checked against the canonical root.

use crate::error::StorageError;
use std::borrow::Cow;
use std::fmt;
use std::path::Path;

const MAX_USER_ID_LEN: usize = 128;
pub(crate) const MAX_FILE_NAME_LEN: usize = 255;

/// Marker embedded in the names of in-flight transfers.
pub(crate) const TMP_MARKER: &str = ".amoratmp.";

/// A validated user identifier, used verbatim as the namespace directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceName(String);

impl TryFrom<&str> for NamespaceName {
    type Error = StorageError;

    fn try_from(value: &str) -> Result<Self, StorageError> {
        let invalid = |reason: &'static str| StorageError::InvalidName {
            message: value.to_owned().into(),
            context: Some(reason.into()),
        };

        if value.is_empty() {
            return Err(invalid("User id cannot be empty"));
        }
        if value.len() > MAX_USER_ID_LEN {
            return Err(invalid("User id is too long"));
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(invalid("User id contains illegal characters"));
        }

        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for NamespaceName {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, StorageError> {
        Self::try_from(value.as_str())
    }
}

impl AsRef<str> for NamespaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated stored-file name: a single normal path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileName(String);

impl FileName {
    /// Validates `name`, returning the reason on rejection.
    pub fn parse(name: &str) -> Result<Self, Cow<'static, str>> {
        if name.is_empty() {
            return Err("file name cannot be empty".into());
        }
        if name.len() > MAX_FILE_NAME_LEN {
            return Err(format!("file name exceeds {MAX_FILE_NAME_LEN} bytes").into());
        }
        if name.contains(['/', '\\', '\0']) {
            return Err("file name cannot contain path separators".into());
        }
        if name == "." || name == ".." {
            return Err("file name cannot be a directory reference".into());
        }
        // Leading dots are reserved for in-flight temporaries.
        if name.starts_with('.') {
            return Err("file name cannot start with '.'".into());
        }

        Ok(Self(name.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for FileName {
    type Error = StorageError;

    fn try_from(value: &str) -> Result<Self, StorageError> {
        Self::parse(value).map_err(|reason| StorageError::InvalidName {
            message: value.to_owned().into(),
            context: Some(reason),
        })
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<Path> for FileName {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `true` for names produced by the transfer engine for unfinished writes.
pub(crate) fn is_tmp_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(TMP_MARKER)
}

/// Ensures an existing namespace directory physically lives under `root`
/// (guards against a namespace directory replaced by a symlink).
pub(crate) fn validate_canonical(root: &Path, canonical: &Path) -> Result<(), StorageError> {
    if canonical.starts_with(root) {
        Ok(())
    } else {
        Err(StorageError::PathTraversalAttempt {
            message: canonical.display().to_string().into(),
            context: Some("Namespace directory resolves outside the storage root".into()),
        })
    }
}
