//! # FatELF
//!
//! A FatELF container bundles ELF images for several machines and OS ABIs
//! into one file. This crate builds such containers and, at run time, picks
//! the image that matches the host and executes it in place of the caller.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use fatelf::{osabi, ContainerBuilder, Trampoline};
//!
//! let mut builder = ContainerBuilder::new();
//! builder.push("hello.x86_64", osabi::lookup_by_name("linux"))?;
//! builder.push("hello.aarch64", osabi::lookup_by_name("linux"))?;
//! builder.build(Path::new("hello"))?;
//!
//! // Never returns on the memfd path.
//! let status = Trampoline::new().run(Path::new("hello"), &[])?;
//! std::process::exit(status);
//! # Ok::<(), fatelf::FatElfError>(())
//! ```

#![cfg(unix)]
#![warn(clippy::all)]

pub mod builder;
pub mod elf;
pub mod error;
pub mod exec;
pub mod format;
pub mod host;
pub mod loader;
pub mod matcher;
pub mod osabi;
pub mod target;

pub use builder::{BuildOptions, BuildReport, ContainerBuilder};
pub use error::{FatElfError, Result};
pub use format::{FatHeader, FatRecord};
pub use loader::Trampoline;
pub use osabi::OsAbiInfo;
pub use target::{ByteOrder, MatchKey, TargetDescriptor, WordSize};
