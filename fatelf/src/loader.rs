//! Loader trampoline: pick the host's image out of a container and become it.

use std::ffi::{CString, OsStr, OsString};
use std::fs::File;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::error::{FatElfError, Result};
use crate::exec::{self, Image, ImageLauncher, ImageSource};
use crate::format::{FatHeader, FatRecord};
use crate::host;
use crate::matcher::find_matching_record;
use crate::target::TargetDescriptor;

/// An open container with the record chosen for a host.
#[derive(Debug)]
pub struct Selection {
    pub path: PathBuf,
    pub container: File,
    pub header: FatHeader,
    pub index: usize,
}

impl Selection {
    pub fn record(&self) -> &FatRecord {
        &self.header.records[self.index]
    }

    pub fn source(&self) -> ImageSource<'_> {
        ImageSource {
            container: &self.container,
            path: &self.path,
            record: *self.record(),
        }
    }
}

/// Open `path` read-only, validate its header, and find `host`'s record.
pub fn locate(path: &Path, host: &TargetDescriptor) -> Result<Selection> {
    let mut container = File::open(path).map_err(|e| FatElfError::io("open", path, e))?;
    let file_len = container
        .metadata()
        .map_err(|e| FatElfError::io("stat", path, e))?
        .len();
    let header = FatHeader::read_from(&mut container, path)?;
    header.validate(file_len, path)?;

    let (index, record) = find_matching_record(host, &header.records)?;
    log::debug!(
        "{}: host {host} matches record {index} ({:#x}, {} bytes)",
        path.display(),
        record.offset,
        record.size
    );
    Ok(Selection {
        path: path.to_path_buf(),
        container,
        header,
        index,
    })
}

/// Runs the host's image out of a container.
pub struct Trampoline {
    launcher: Box<dyn ImageLauncher>,
}

impl Default for Trampoline {
    fn default() -> Self {
        Self::new()
    }
}

impl Trampoline {
    /// Use the best strategy the platform supports.
    pub fn new() -> Self {
        Self::with_launcher(exec::select_launcher())
    }

    pub fn with_launcher(launcher: Box<dyn ImageLauncher>) -> Self {
        Self { launcher }
    }

    pub fn launcher_name(&self) -> &'static str {
        self.launcher.name()
    }

    /// Locate and materialize `host`'s image without running it.
    pub fn prepare(&self, path: &Path, host: &TargetDescriptor) -> Result<Image> {
        let selection = locate(path, host)?;
        self.launcher.materialize(&selection.source())
    }

    /// Replace this process with the container's image for this host.
    ///
    /// The image sees `argv = [path, args...]` and this process's environment.
    /// Returns only on error, or with the child's exit status when the image
    /// had to run from a temporary file.
    pub fn run(&self, path: &Path, args: &[OsString]) -> Result<i32> {
        let host = host::target()?;
        let selection = locate(path, &host)?;

        let argv = argv_for(path, args)?;
        let envp = inherited_env()?;
        self.launcher.launch(&selection.source(), &argv, &envp)
    }
}

fn c_string(value: &OsStr) -> Result<CString> {
    CString::new(value.as_bytes()).map_err(|_| {
        FatElfError::usage(format!(
            "argument contains a NUL byte: {}",
            value.to_string_lossy()
        ))
    })
}

/// `argv` for the embedded image: the container path, then the user's arguments.
pub fn argv_for(path: &Path, args: &[OsString]) -> Result<Vec<CString>> {
    std::iter::once(path.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(c_string)
        .collect()
}

/// `KEY=VALUE` strings for the current environment, unchanged.
pub fn inherited_env() -> Result<Vec<CString>> {
    env_strings(std::env::vars_os())
}

fn env_strings(vars: impl Iterator<Item = (OsString, OsString)>) -> Result<Vec<CString>> {
    vars.map(|(key, value)| {
        let mut entry = key;
        entry.push("=");
        entry.push(value);
        c_string(&entry)
    })
    .collect()
}
