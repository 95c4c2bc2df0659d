//! Package directory scanning and manifest reading.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use super::REGISTRY_TARGET;
use crate::error::PackageError;
use crate::manifest::{MANIFEST_FILE, PackageManifest, validate_str};

/// A manifest read from disk and validated.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub(crate) dir: PathBuf,
    pub(crate) manifest: PackageManifest,
    pub(crate) manifest_hash: String,
}

/// Lists the immediate subdirectories of `root`, sorted by path.
///
/// A missing root yields no candidates.
pub(crate) async fn package_dirs(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            debug!(target: REGISTRY_TARGET, root = %root.display(), "package root does not exist");
            return Ok(Vec::new());
        }
        Err(error) => return Err(error),
    };
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Reads and validates `dir/manifest.json`.
pub(crate) async fn read_candidate(dir: &Path) -> Result<Candidate, PackageError> {
    let path = dir.join(MANIFEST_FILE);
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| PackageError::ManifestRead {
            path: path.clone(),
            source: Arc::new(source),
        })?;
    let manifest = validate_str(&text).map_err(|errors| PackageError::Manifest {
        path: dir.to_path_buf(),
        errors,
    })?;
    Ok(Candidate {
        dir: dir.to_path_buf(),
        manifest,
        manifest_hash: manifest_hash(&text),
    })
}

/// Hex-encoded SHA-256 of the raw manifest text.
pub(crate) fn manifest_hash(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            manifest_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(manifest_hash("{}"), manifest_hash("{ }"));
    }

    #[tokio::test]
    async fn missing_root_has_no_packages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dirs = package_dirs(&dir.path().join("absent")).await.expect("scan");
        assert!(dirs.is_empty());
    }

    #[tokio::test]
    async fn only_directories_are_candidates() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(root.path().join("beta")).expect("mkdir");
        std::fs::create_dir(root.path().join("alpha")).expect("mkdir");
        std::fs::write(root.path().join("README"), "not a package").expect("write");

        let dirs = package_dirs(root.path()).await.expect("scan");
        let names: Vec<_> = dirs
            .iter()
            .filter_map(|dir| dir.file_name().and_then(|name| name.to_str()))
            .collect();
        assert_eq!(names, ["alpha", "beta"]);
    }

    #[tokio::test]
    async fn unreadable_manifest_names_the_file() {
        let root = tempfile::tempdir().expect("tempdir");
        let error = read_candidate(root.path()).await.expect_err("no manifest");
        assert!(
            matches!(&error, PackageError::ManifestRead { path, .. } if path.ends_with(MANIFEST_FILE)),
            "{error}"
        );
    }
}
