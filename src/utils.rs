//! Destination path handling and disk space checks

use crate::config::{DiskSpaceConfig, FileCollisionAction};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Resolve the path a download should be written to
///
/// `Overwrite` keeps `path`; `Skip` fails if it exists; `Rename` appends
/// ` (1)`, ` (2)`, ... before the extension until the name is free.
///
/// ```
/// use mirror_dl::utils::resolve_destination;
/// use mirror_dl::config::FileCollisionAction;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/mirror-dl-doc-never-exists.iso");
/// let resolved = resolve_destination(path, FileCollisionAction::Rename).unwrap();
/// assert_eq!(resolved, path);
/// ```
pub fn resolve_destination(path: &Path, action: FileCollisionAction) -> Result<PathBuf> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Err(Error::FileCollision {
                    path: path.to_path_buf(),
                    reason: "file already exists and collision action is skip".to_string(),
                });
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::FileCollision {
                    path: path.to_path_buf(),
                    reason: "cannot extract file stem".to_string(),
                })?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path.parent().unwrap_or_else(|| Path::new(""));

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let candidate = match extension {
                    Some(ext) => parent.join(format!("{stem} ({i}).{ext}")),
                    None => parent.join(format!("{stem} ({i})")),
                };
                if !candidate.exists() {
                    return Ok(candidate);
                }
            }

            Err(Error::FileCollision {
                path: path.to_path_buf(),
                reason: format!("no free name after {MAX_RENAME_ATTEMPTS} attempts"),
            })
        }
    }
}

/// Fail early when the destination's filesystem cannot hold `size_bytes`
///
/// The directory of `destination` (or its closest existing ancestor) is
/// queried; `min_free_space` must remain after the file is pre-sized.
pub fn ensure_disk_space(
    destination: &Path,
    size_bytes: u64,
    config: &DiskSpaceConfig,
) -> Result<()> {
    if !config.enabled || size_bytes == 0 {
        return Ok(());
    }

    let mut check_path = destination.parent().unwrap_or_else(|| Path::new("."));
    if check_path.as_os_str().is_empty() {
        check_path = Path::new(".");
    }
    while !check_path.exists() {
        check_path = check_path.parent().ok_or_else(|| {
            Error::DiskSpaceCheckFailed(format!(
                "no existing ancestor for '{}'",
                destination.display()
            ))
        })?;
    }

    let available = get_available_space(check_path).map_err(|e| {
        Error::DiskSpaceCheckFailed(format!(
            "failed to check disk space for '{}': {}",
            check_path.display(),
            e
        ))
    })?;

    let required = size_bytes.saturating_add(config.min_free_space);
    if available < required {
        return Err(Error::InsufficientSpace {
            required,
            available,
        });
    }
    Ok(())
}

/// Available disk space in bytes for the filesystem holding `path`
///
/// Uses `statvfs` on Unix and `GetDiskFreeSpaceExW` on Windows.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid NUL-terminated string, stat is zero-initialized
        // and only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            #[allow(clippy::unnecessary_cast)]
            Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is NUL-terminated and every out-pointer refers to a
        // live, aligned u64 that is only read after a successful call.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut total_bytes: u64 = 0;
            let mut total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut total_bytes as *mut u64 as *mut _,
                &mut total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = path;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "disk space checking is not supported on this platform",
        ))
    }
}
