use std::ffi::{c_char, CString};
use std::fs::Permissions;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::ptr;
use std::sync::{Mutex, PoisonError};

use nix::errno::Errno;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use tempfile::TempPath;

use super::{copy_range, Image, ImageLauncher, ImageSource};
use crate::error::{FatElfError, Result};

/// Exit status of a child whose `execve` failed (same as a shell's).
const EXEC_FAILED: i32 = 127;

/// Held from the first signal change until the child is reaped.
/// Dispositions are process-wide, so launches from several threads take turns.
static LAUNCH: Mutex<()> = Mutex::new(());

/// Executes images from a private temporary file in a forked child.
#[derive(Debug, Clone, Copy, Default)]
pub struct TempFileLauncher;

impl ImageLauncher for TempFileLauncher {
    fn name(&self) -> &'static str {
        "tempfile"
    }

    fn materialize(&self, source: &ImageSource<'_>) -> Result<Image> {
        let mut temp = tempfile::Builder::new()
            .prefix("fatelf-")
            .permissions(Permissions::from_mode(0o700))
            .tempfile()
            .map_err(|e| FatElfError::io("create", std::env::temp_dir(), e))?;
        let temp_name = temp.path().to_path_buf();
        copy_range(source, temp.as_file_mut(), &temp_name)?;
        // Drop the write handle; exec of a file open for writing fails with ETXTBSY.
        Ok(Image::TempFile(temp.into_temp_path()))
    }
}

/// Run the temp file in a child, wait, remove it, return the child's status.
pub(super) fn exec(path: TempPath, argv: &[CString], envp: &[CString]) -> Result<i32> {
    let status = run_child(&path, argv, envp);
    if let Err(e) = path.close() {
        log::warn!("failed to remove temporary image: {e}");
    }
    status
}

fn run_child(path: &Path, argv: &[CString], envp: &[CString]) -> Result<i32> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| FatElfError::usage(format!("{} contains a NUL byte", path.display())))?;
    // Built before fork: the child must not allocate.
    let argv_ptrs = null_terminated(argv);
    let envp_ptrs = null_terminated(envp);

    let _serial = LAUNCH.lock().unwrap_or_else(PoisonError::into_inner);
    // An ignored SIGCHLD makes the kernel reap the child before waitpid sees it.
    // The terminal delivers ^C to the whole process group; let the child decide.
    let dispositions = SignalDispositions::install(&[
        (Signal::SIGCHLD, SigHandler::SigDfl),
        (Signal::SIGINT, SigHandler::SigIgn),
        (Signal::SIGQUIT, SigHandler::SigIgn),
    ]);

    // SAFETY: the child only calls sigaction, execve, write and _exit, none of
    // which allocate or take locks.
    match unsafe { fork() }.map_err(|e| FatElfError::sys("fork", path, e))? {
        ForkResult::Child => {
            dispositions.restore();
            // SAFETY: all three pointers refer to NUL-terminated data that
            // outlives the call, and both tables end with a null pointer.
            unsafe { libc::execve(c_path.as_ptr(), argv_ptrs.as_ptr(), envp_ptrs.as_ptr()) };
            let _ = nix::unistd::write(std::io::stderr(), b"fatelf: failed to exec embedded image\n");
            // SAFETY: _exit skips atexit handlers and destructors that belong to the parent.
            unsafe { libc::_exit(EXEC_FAILED) }
        }
        ForkResult::Parent { child } => {
            log::debug!("started {} as pid {child}", path.display());
            wait_for(child, path)
        }
    }
}

fn null_terminated(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect()
}

fn wait_for(child: Pid, path: &Path) -> Result<i32> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(128 + signal as i32),
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(FatElfError::sys("waitpid", path, e)),
        }
    }
}

/// Replaces signal dispositions until dropped.
///
/// The previous actions are kept so the forked child can put them back
/// before `execve`; the embedded program then starts with exactly what this
/// process inherited.
struct SignalDispositions {
    saved: Vec<(Signal, SigAction)>,
}

impl SignalDispositions {
    fn install(wanted: &[(Signal, SigHandler)]) -> Self {
        let saved = wanted
            .iter()
            .filter_map(|&(signal, handler)| {
                let action = SigAction::new(handler, SaFlags::empty(), SigSet::empty());
                // SAFETY: SIG_DFL and SIG_IGN run no code in signal context.
                unsafe { sigaction(signal, &action) }
                    .ok()
                    .map(|previous| (signal, previous))
            })
            .collect();
        Self { saved }
    }

    /// Put the saved actions back. Async-signal-safe.
    fn restore(&self) {
        for (signal, previous) in &self.saved {
            // SAFETY: reinstalls an action this process already had.
            let _ = unsafe { sigaction(*signal, previous) };
        }
    }
}

impl Drop for SignalDispositions {
    fn drop(&mut self) {
        self.restore();
    }
}
