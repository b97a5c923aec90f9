//! Host detection.
//!
//! The host's target is read from the running executable's own ELF header, so
//! a `fatelf` built for i386 running on an x86_64 kernel picks the i386 image.

use std::fs::File;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::utsname::uname;
use nix::unistd::{sysconf, SysconfVar};

use crate::elf;
use crate::error::{FatElfError, Result};
use crate::osabi::{self, OsAbiInfo, OSABI_UNSPECIFIED};
use crate::target::TargetDescriptor;

/// Page size used when `sysconf` cannot tell.
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// `uname -s` of the running kernel.
pub fn sysname() -> Result<String> {
    let name = uname().map_err(uname_failed)?;
    Ok(name.sysname().to_string_lossy().into_owned())
}

fn uname_failed(errno: Errno) -> FatElfError {
    FatElfError::sys("uname", "host", errno)
}

/// The registry entry for the running kernel, if it is a known one.
pub fn osabi() -> Option<&'static OsAbiInfo> {
    sysname().ok().and_then(|name| osabi::lookup_by_uname(&name))
}

/// Host page size.
pub fn page_size() -> u64 {
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 && (size as u64).is_power_of_two() => size as u64,
        _ => DEFAULT_PAGE_SIZE,
    }
}

/// Replace an unspecified OS/ABI with the one `sysname` implies.
pub fn resolve_osabi(target: TargetDescriptor, sysname: &str) -> Result<TargetDescriptor> {
    if target.osabi != OSABI_UNSPECIFIED {
        return Ok(target);
    }
    let info = osabi::lookup_by_uname(sysname).ok_or_else(|| FatElfError::UnresolvableHostAbi {
        sysname: sysname.to_string(),
    })?;
    Ok(target.with_osabi(info.id))
}

fn self_exe() -> Result<(File, PathBuf)> {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        let proc_path = Path::new("/proc/self/exe");
        if let Ok(file) = File::open(proc_path) {
            return Ok((file, proc_path.to_path_buf()));
        }
    }

    let path = std::env::current_exe().map_err(|e| FatElfError::io("locate", "self", e))?;
    let file = File::open(&path).map_err(|e| FatElfError::io("open", &path, e))?;
    Ok((file, path))
}

/// Target of the running process, with its OS/ABI resolved.
pub fn target() -> Result<TargetDescriptor> {
    let (mut file, path) = self_exe()?;
    let own = elf::read_target(&mut file, &path)?;
    if own.osabi != OSABI_UNSPECIFIED {
        return Ok(own);
    }
    let resolved = resolve_osabi(own, &sysname()?)?;
    log::debug!("host image has unspecified OS/ABI, resolved to {resolved}");
    Ok(resolved)
}
