//! Process image replacement.
//!
//! An [`ImageLauncher`] turns a record's byte range into something the
//! kernel can execute ([`Image`]) and then replaces the current process with
//! it. Two strategies exist:
//!
//! - [`MemfdLauncher`]: anonymous memory file + `fexecve`. No file ever
//!   appears on disk and nothing needs cleaning up afterwards.
//! - [`TempFileLauncher`]: private 0700 temporary file + `fork`/`execve`. The
//!   parent stays behind only to remove the file and forward the exit status.

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
mod memfd;
mod temp;

use std::ffi::CString;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use tempfile::TempPath;

use crate::error::{FatElfError, Result};
use crate::format::FatRecord;

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub use memfd::MemfdLauncher;
pub use temp::TempFileLauncher;

/// The byte range of one record inside an open container.
#[derive(Debug, Clone, Copy)]
pub struct ImageSource<'a> {
    pub container: &'a File,
    pub path: &'a Path,
    pub record: FatRecord,
}

/// An embedded image copied out into something executable.
#[derive(Debug)]
pub enum Image {
    /// Anonymous `memfd`, executed through its descriptor
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    Memory(File),
    /// Private temporary file, removed when dropped
    TempFile(TempPath),
}

impl Image {
    /// Read the materialized bytes back.
    pub fn contents(&self) -> io::Result<Vec<u8>> {
        match self {
            #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
            Image::Memory(file) => {
                let mut reader = file;
                reader.seek(SeekFrom::Start(0))?;
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(buf)
            }
            Image::TempFile(path) => std::fs::read(path),
        }
    }

    /// Replace the current process with this image.
    ///
    /// For a memory image this only returns on failure. For a temporary file
    /// the image runs in a child; the return value is its exit status, and
    /// the file is gone by the time this returns.
    pub fn exec(self, argv: &[CString], envp: &[CString]) -> Result<i32> {
        match self {
            #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
            Image::Memory(file) => memfd::exec(file, argv, envp),
            Image::TempFile(path) => temp::exec(path, argv, envp),
        }
    }
}

/// A way of running an embedded image in place of the current process.
pub trait ImageLauncher {
    fn name(&self) -> &'static str;

    /// Copy exactly the record's bytes into a fresh executable image.
    fn materialize(&self, source: &ImageSource<'_>) -> Result<Image>;

    /// Materialize and execute. See [`Image::exec`] for when this returns.
    fn launch(&self, source: &ImageSource<'_>, argv: &[CString], envp: &[CString]) -> Result<i32> {
        let image = self.materialize(source)?;
        log::debug!("launching {} via {}", source.path.display(), self.name());
        image.exec(argv, envp)
    }
}

/// Memory-backed execution when the kernel supports it, a temp file otherwise.
pub fn select_launcher() -> Box<dyn ImageLauncher> {
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    {
        if MemfdLauncher::is_available() {
            return Box::new(MemfdLauncher);
        }
        log::debug!("memfd_create unavailable, falling back to a temporary file");
    }
    Box::new(TempFileLauncher)
}

/// Copy `source`'s byte range into `dest`.
///
/// A container that ends before the record does is reported as a format error.
fn copy_range(source: &ImageSource<'_>, dest: &mut File, dest_name: &Path) -> Result<()> {
    let record = &source.record;
    let mut container = source.container;
    container
        .seek(SeekFrom::Start(record.offset))
        .map_err(|e| FatElfError::io("seek", source.path, e))?;
    let copied = io::copy(&mut container.take(record.size), dest)
        .map_err(|e| FatElfError::io("copy", dest_name, e))?;
    if copied != record.size {
        return Err(FatElfError::format(
            source.path,
            format!(
                "record at {:#x} is {} bytes but only {copied} are present",
                record.offset, record.size
            ),
        ));
    }
    Ok(())
}
