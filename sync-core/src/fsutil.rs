//! File metadata capture, content hashing, and conflict filenames.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, Utc};
use sha2::{Digest, Sha256};

/// Metadata captured for one file, as carried in file lists and baselines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Absolute path.
    pub path: PathBuf,
    /// Path relative to the folder root, `/`-separated.
    pub rel_path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub mod_time: DateTime<Utc>,
    /// Lowercase SHA-256 hex of the content; empty for directories and
    /// empty files.
    pub hash: String,
    /// Whether the path is a directory.
    pub is_dir: bool,
    /// Permission bits, see [`permission_bits`].
    pub permission: u32,
}

/// Compute the lowercase SHA-256 hex digest of a file's content.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_digest(hasher))
}

/// Compute the lowercase SHA-256 hex digest of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Capture [`FileMeta`] for a path under a folder root.
///
/// Regular non-empty files are hashed; directories and empty files carry
/// an empty hash.
pub fn file_meta(path: &Path, base: &Path) -> std::io::Result<FileMeta> {
    let metadata = std::fs::metadata(path)?;
    let rel_path = rel_path_string(path, base).unwrap_or_else(|| path.display().to_string());

    let mod_time = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    let is_dir = metadata.is_dir();
    let hash = if !is_dir && metadata.len() > 0 {
        hash_file(path)?
    } else {
        String::new()
    };

    Ok(FileMeta {
        path: path.to_path_buf(),
        rel_path,
        size: metadata.len(),
        mod_time,
        hash,
        is_dir,
        permission: permission_bits(&metadata),
    })
}

/// Render a path relative to `base` as a `/`-separated string.
///
/// Returns `None` for paths outside `base`, for `base` itself, and for
/// anything that would start with `.` after relativization.
pub fn rel_path_string(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let rendered = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if rendered.is_empty() || rendered.starts_with('.') {
        return None;
    }
    Some(rendered)
}

/// Extract permission bits from file metadata.
///
/// Unix: the low 9 bits of the mode. Other platforms: a constant `0o644`.
#[cfg(unix)]
pub fn permission_bits(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

/// Extract permission bits from file metadata.
///
/// Unix: the low 9 bits of the mode. Other platforms: a constant `0o644`.
#[cfg(not(unix))]
pub fn permission_bits(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

/// Apply permission bits received from a peer.
///
/// Unix: the low 9 bits are applied. Other platforms: ignored.
#[cfg(unix)]
pub fn apply_permission(path: &Path, bits: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(bits & 0o777))
}

/// Apply permission bits received from a peer.
///
/// Unix: the low 9 bits are applied. Other platforms: ignored.
#[cfg(not(unix))]
pub fn apply_permission(_path: &Path, _bits: u32) -> std::io::Result<()> {
    Ok(())
}

/// Restore a file's modification time.
pub fn set_mod_time(path: &Path, mod_time: DateTime<Utc>) -> std::io::Result<()> {
    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.set_modified(SystemTime::from(mod_time))
}

/// Create a directory and any missing parents.
///
/// Unix: every created component gets mode 0755 (subject to the umask,
/// as with `mkdir -p`). Other platforms: default directory creation.
#[cfg(unix)]
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(path)
}

/// Create a directory and any missing parents.
///
/// Unix: every created component gets mode 0755 (subject to the umask,
/// as with `mkdir -p`). Other platforms: default directory creation.
#[cfg(not(unix))]
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    std::fs::DirBuilder::new().recursive(true).create(path)
}

/// Build the rename target for a keep-both conflict resolution:
/// `stem_{device}_conflict_{YYYYMMDD_HHMMSS}.{ext}` next to the original.
///
/// The extension is preserved; a file without one gets a single trailing
/// dot.
pub fn conflict_file_name(path: &Path, device: &str, at: DateTime<Local>) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let timestamp = at.format("%Y%m%d_%H%M%S");

    let name = format!("{stem}_{device}_conflict_{timestamp}.{ext}");
    match path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}
