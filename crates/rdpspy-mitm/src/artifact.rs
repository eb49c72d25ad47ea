//! On-disk storage for stolen artifacts.

use std::io;
use std::path::{Path, PathBuf};

/// Turns a redirected Windows path into a safe relative path:
/// backslashes become separators, parent-directory components are removed,
/// and leading separators are stripped.
pub fn sanitize_remote_path(remote_path: &str) -> String {
    let unified = remote_path.trim_end_matches('\u{0}').replace('\\', "/").replace("..", "");

    let mut sanitized = unified
        .split('/')
        .filter(|component| !component.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    if sanitized.is_empty() {
        sanitized = "unnamed".to_owned();
    }

    sanitized
}

/// An offset-addressed buffer for files reconstructed out of order.
#[derive(Debug, Default)]
pub struct SparseFileBuffer {
    data: Vec<u8>,
}

impl SparseFileBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `bytes` at `offset`, growing the buffer with zeroes when the
    /// write lands past the current end.
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) {
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = offset.saturating_add(bytes.len());

        if self.data.len() < end {
            self.data.resize(end, 0);
        }

        self.data[offset..end].copy_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Writes reconstructed files below a root directory, never overwriting:
/// a colliding name gets a `-1`, `-2`, … suffix before the extension.
pub struct ArtifactVault {
    root: PathBuf,
}

impl ArtifactVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Saves `bytes` under the sanitized remote path, creating intermediate
    /// directories, and returns the path actually written.
    pub fn save(&self, remote_path: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let relative = sanitize_remote_path(remote_path);
        let target = self.root.join(relative);

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let target = disambiguate(target);
        std::fs::write(&target, bytes)?;

        Ok(target)
    }
}

fn disambiguate(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_owned());
    let extension = path.extension().map(|ext| ext.to_string_lossy().into_owned());

    for counter in 1u32.. {
        let file_name = match &extension {
            Some(ext) => format!("{stem}-{counter}.{ext}"),
            None => format!("{stem}-{counter}"),
        };

        let candidate = path.with_file_name(file_name);
        if !candidate.exists() {
            return candidate;
        }
    }

    unreachable!("the suffix search space is never exhausted")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("rdpspy-tests")
            .join(format!("{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn windows_paths_are_sanitized() {
        assert_eq!(sanitize_remote_path("\\\\tsclient\\C\\foo.txt"), "tsclient/C/foo.txt");
        assert_eq!(sanitize_remote_path("..\\..\\etc\\passwd"), "etc/passwd");
        assert_eq!(sanitize_remote_path("dir\\file\u{0}\u{0}"), "dir/file");
        assert_eq!(sanitize_remote_path(""), "unnamed");
    }

    #[test]
    fn sparse_buffer_accepts_out_of_order_writes() {
        let mut buffer = SparseFileBuffer::new();

        buffer.write_at(4096, &[3u8; 904]);
        buffer.write_at(0, &[1u8; 2048]);
        buffer.write_at(2048, &[2u8; 2048]);

        assert_eq!(buffer.len(), 5000);
        assert_eq!(buffer.as_bytes()[0], 1);
        assert_eq!(buffer.as_bytes()[2048], 2);
        assert_eq!(buffer.as_bytes()[4096], 3);
    }

    #[test]
    fn vault_creates_directories_and_refuses_to_overwrite() {
        let vault = ArtifactVault::new(scratch_dir("vault"));

        let first = vault.save("\\\\tsclient\\C\\foo.txt", b"first").unwrap();
        let second = vault.save("\\\\tsclient\\C\\foo.txt", b"second").unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read(&first).unwrap(), b"first");
        assert_eq!(std::fs::read(&second).unwrap(), b"second");
        assert!(second.to_string_lossy().ends_with("foo-1.txt"));
    }
}
