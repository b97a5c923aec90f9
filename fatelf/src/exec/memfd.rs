use std::ffi::{CStr, CString};
use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::Path;

use nix::sys::memfd::{memfd_create, MemFdCreateFlag};
use nix::unistd::fexecve;

use super::{copy_range, Image, ImageLauncher, ImageSource};
use crate::error::{FatElfError, Result};

const MEMFD_NAME: &CStr = c"fatelf";

/// How the memfd shows up in error messages (and in `/proc/<pid>/fd`).
const MEMFD_DISPLAY: &str = "memfd:fatelf";

/// Executes images from an anonymous memory file.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemfdLauncher;

impl MemfdLauncher {
    /// Whether the running kernel implements `memfd_create`.
    pub fn is_available() -> bool {
        memfd_create(MEMFD_NAME, MemFdCreateFlag::MFD_CLOEXEC).is_ok()
    }
}

impl ImageLauncher for MemfdLauncher {
    fn name(&self) -> &'static str {
        "memfd"
    }

    fn materialize(&self, source: &ImageSource<'_>) -> Result<Image> {
        let fd = memfd_create(MEMFD_NAME, MemFdCreateFlag::MFD_CLOEXEC)
            .map_err(|e| FatElfError::sys("memfd_create", MEMFD_DISPLAY, e))?;
        let mut file = File::from(fd);
        copy_range(source, &mut file, Path::new(MEMFD_DISPLAY))?;
        Ok(Image::Memory(file))
    }
}

/// `fexecve` the memfd. Returns only if the kernel refused the image.
pub(super) fn exec(file: File, argv: &[CString], envp: &[CString]) -> Result<i32> {
    let errno = match fexecve(file.as_raw_fd(), argv, envp) {
        Ok(never) => match never {},
        Err(errno) => errno,
    };
    // The descriptor closes here, releasing the image.
    drop(file);
    Err(FatElfError::sys("fexecve", MEMFD_DISPLAY, errno))
}
