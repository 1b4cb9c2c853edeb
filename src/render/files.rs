//! Static file collaborator.
//!
//! # Design Decisions
//! - Paths are joined under the request's working directory; absolute paths
//!   and `..` components are refused as not found
//! - The filesystem resolver does not guess MIME types; it only knows the
//!   extensions it was explicitly given

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::http::response::BodyStream;

/// A file opened for streaming.
#[derive(Debug)]
pub struct ResolvedFile {
    pub body: BodyStream,
    pub mimetype: Option<String>,
    pub len: Option<u64>,
}

/// Opens files served by file-mode routes.
pub trait FileResolver: Send + Sync {
    fn resolve(&self, dir: &Path, relative: &str) -> io::Result<ResolvedFile>;
}

/// Join `relative` under `base`, refusing anything that escapes it.
pub fn safe_join(base: &Path, relative: &str) -> io::Result<PathBuf> {
    let relative = Path::new(relative.trim_start_matches('/'));
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || relative.as_os_str().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("refusing to serve {}", relative.display()),
        ));
    }
    Ok(base.join(relative))
}

/// Serves files from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsResolver {
    mimetypes: HashMap<String, String>,
}

impl FsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `mimetype` for files ending in `.{extension}`.
    pub fn with_mimetype(mut self, extension: &str, mimetype: impl Into<String>) -> Self {
        self.mimetypes
            .insert(extension.trim_start_matches('.').to_ascii_lowercase(), mimetype.into());
        self
    }

    fn mimetype_for(&self, path: &Path) -> Option<String> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        self.mimetypes.get(&extension).cloned()
    }
}

impl FileResolver for FsResolver {
    fn resolve(&self, dir: &Path, relative: &str) -> io::Result<ResolvedFile> {
        let path = safe_join(dir, relative)?;
        let file = File::open(&path)?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a file", path.display()),
            ));
        }
        Ok(ResolvedFile {
            body: BodyStream::from_reader(file),
            mimetype: self.mimetype_for(&path),
            len: Some(metadata.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_join_refuses_traversal() {
        let base = Path::new("/srv/site");
        assert_eq!(
            safe_join(base, "/static/app.css").unwrap(),
            PathBuf::from("/srv/site/static/app.css")
        );
        for bad in ["../etc/passwd", "static/../../x", ""] {
            let err = safe_join(base, bad).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::NotFound);
        }
    }

    #[test]
    fn test_resolve_streams_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        let resolver = FsResolver::new().with_mimetype("TXT", "text/plain");

        let file = resolver.resolve(dir.path(), "notes.txt").unwrap();
        assert_eq!(file.mimetype.as_deref(), Some("text/plain"));
        assert_eq!(file.len, Some(5));
        let body: Vec<u8> = file.body.flat_map(|chunk| chunk.unwrap().to_vec()).collect();
        assert_eq!(body, b"hello");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsResolver::new().resolve(dir.path(), "nope.bin").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        let err = FsResolver::new().resolve(dir.path(), ".").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
