use crate::error::{Result, StorageError};
use std::str::FromStr;
use uuid::Uuid;

/// What a stored file holds. Each kind lives under its own root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Upload,
    Key,
    Recovered,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [Self::Upload, Self::Key, Self::Recovered];

    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Key => "key",
            Self::Recovered => "recovered",
        }
    }

    /// Extension of files of this kind. Uploads are sniffed by content, so
    /// their extension carries no meaning.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Upload => "bin",
            Self::Key => veilkey_core::keystore::KEY_EXTENSION,
            Self::Recovered => "png",
        }
    }

    /// Only generated artifacts are served back to callers.
    #[must_use]
    pub const fn is_downloadable(&self) -> bool {
        matches!(self, Self::Key | Self::Recovered)
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.prefix() == prefix)
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Opaque name for a stored artifact, rendered as `<kind>-<uuid>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    kind: ArtifactKind,
    id: Uuid,
}

impl Handle {
    pub(crate) fn generate(kind: ArtifactKind) -> Self {
        Self {
            kind,
            id: Uuid::new_v4(),
        }
    }

    #[inline]
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// File name under the kind's root, e.g. `0b6c…e1.npy`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id.hyphenated(), self.kind.extension())
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.kind.prefix(), self.id.hyphenated())
    }
}

impl FromStr for Handle {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || StorageError::InvalidHandle(s.escape_debug().to_string());

        let (prefix, id) = s.split_once('-').ok_or_else(invalid)?;
        let kind = ArtifactKind::from_prefix(prefix).ok_or_else(invalid)?;

        // Only the canonical hyphenated form is accepted.
        if id.len() != uuid::fmt::Hyphenated::LENGTH {
            return Err(invalid());
        }
        let id = Uuid::try_parse(id).map_err(|_| invalid())?;

        Ok(Self { kind, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_then_parse() {
        let handle = Handle::generate(ArtifactKind::Key);
        let text = handle.to_string();
        assert!(text.starts_with("key-"));
        assert_eq!(text.parse::<Handle>().unwrap(), handle);
    }

    #[test]
    fn test_file_name() {
        let handle: Handle = "recovered-67e55044-10b1-426f-9247-bb680e5fe0c8"
            .parse()
            .unwrap();
        assert_eq!(handle.kind(), ArtifactKind::Recovered);
        assert_eq!(handle.file_name(), "67e55044-10b1-426f-9247-bb680e5fe0c8.png");
    }

    #[test]
    fn test_rejects_paths_and_junk() {
        for text in [
            "",
            "key",
            "key-",
            "key-../../etc/passwd",
            "../keys/67e55044-10b1-426f-9247-bb680e5fe0c8",
            "secret-67e55044-10b1-426f-9247-bb680e5fe0c8",
            "key-67e5504410b1426f9247bb680e5fe0c8",
            "key-{67e55044-10b1-426f-9247-bb680e5fe0c8}",
            "key-67e55044-10b1-426f-9247-bb680e5fe0c/",
            "key-67e55044-10b1-426f-9247-bb680e5fe0c8/..",
        ] {
            assert!(
                matches!(text.parse::<Handle>(), Err(StorageError::InvalidHandle(_))),
                "{text} accepted"
            );
        }
    }

    #[test]
    fn test_downloadable_kinds() {
        assert!(!ArtifactKind::Upload.is_downloadable());
        assert!(ArtifactKind::Key.is_downloadable());
        assert!(ArtifactKind::Recovered.is_downloadable());
    }
}
