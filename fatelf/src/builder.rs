//! Container builder ("glue").
//!
//! The output starts with a zeroed placeholder the size of the final header.
//! Images are appended one by one at page-aligned offsets, and the real
//! header is written over the placeholder only once every input has been
//! copied. A failed build removes its output.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::elf;
use crate::error::{FatElfError, Result};
use crate::format::{align_to_page, header_size, FatHeader, FatRecord, MAX_RECORDS};
use crate::host;
use crate::osabi::{self, OsAbiInfo, OSABI_UNSPECIFIED};

/// One image to embed, with an optional `--osabi` override.
#[derive(Debug, Clone)]
pub struct BuildInput {
    pub path: PathBuf,
    pub osabi: Option<&'static OsAbiInfo>,
}

/// Knobs for a build.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Alignment of every embedded image (power of two)
    pub page_size: u64,
    /// Truncate an existing output instead of refusing to touch it
    pub overwrite: bool,
    /// ABI recorded for images whose header leaves it unspecified
    pub host_osabi: Option<&'static OsAbiInfo>,
}

impl BuildOptions {
    /// Page size and OS/ABI of the machine running the build.
    pub fn for_host() -> Self {
        Self {
            page_size: host::page_size(),
            overwrite: false,
            host_osabi: host::osabi(),
        }
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::for_host()
    }
}

/// Where one input ended up.
#[derive(Serialize, Debug, Clone)]
pub struct RecordReport {
    pub source: PathBuf,
    pub target: String,
    pub offset: u64,
    pub size: u64,
}

/// Summary of a finished build.
#[derive(Serialize, Debug, Clone)]
pub struct BuildReport {
    pub output: PathBuf,
    pub records: Vec<RecordReport>,
    pub warnings: Vec<String>,
    #[serde(skip)]
    pub header: FatHeader,
}

/// Removes the output file on drop unless the build committed.
struct OutputGuard<'a> {
    path: &'a Path,
    armed: bool,
}

impl Drop for OutputGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = fs::remove_file(self.path) {
                log::warn!("failed to remove partial output {}: {e}", self.path.display());
            }
        }
    }
}

/// Ordered, bounded list of inputs plus build options.
#[derive(Debug, Clone, Default)]
pub struct ContainerBuilder {
    inputs: Vec<BuildInput>,
    options: BuildOptions,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::with_options(BuildOptions::for_host())
    }

    pub fn with_options(options: BuildOptions) -> Self {
        Self {
            inputs: Vec::new(),
            options,
        }
    }

    /// Append an input. Fails once 255 inputs are queued.
    pub fn push(
        &mut self,
        path: impl Into<PathBuf>,
        osabi: Option<&'static OsAbiInfo>,
    ) -> Result<()> {
        if self.inputs.len() >= MAX_RECORDS {
            return Err(FatElfError::TooManyInputs { limit: MAX_RECORDS });
        }
        self.inputs.push(BuildInput {
            path: path.into(),
            osabi,
        });
        Ok(())
    }

    pub fn inputs(&self) -> &[BuildInput] {
        &self.inputs
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Write the container to `output`.
    pub fn build(&self, output: &Path) -> Result<BuildReport> {
        if self.inputs.is_empty() {
            return Err(FatElfError::NoInputs);
        }
        if !self.options.page_size.is_power_of_two() {
            return Err(FatElfError::usage(format!(
                "page size {} is not a power of two",
                self.options.page_size
            )));
        }

        let file = self.create_output(output)?;
        let mut guard = OutputGuard {
            path: output,
            armed: true,
        };
        let report = self.write_container(file, output)?;
        guard.armed = false;

        log::info!(
            "wrote {} ({} records)",
            output.display(),
            report.records.len()
        );
        Ok(report)
    }

    fn create_output(&self, output: &Path) -> Result<File> {
        let mut options = OpenOptions::new();
        options.write(true).mode(0o755);
        if self.options.overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        options
            .open(output)
            .map_err(|e| FatElfError::io("create", output, e))
    }

    fn write_container(&self, file: File, output: &Path) -> Result<BuildReport> {
        let header_len = header_size(self.inputs.len()) as u64;
        let mut out = BufWriter::new(file);
        write_zeros(&mut out, header_len, output)?;

        let mut records: Vec<FatRecord> = Vec::with_capacity(self.inputs.len());
        let mut reports = Vec::with_capacity(self.inputs.len());
        let mut warnings = Vec::new();
        let mut offset = header_len;

        for (i, input) in self.inputs.iter().enumerate() {
            let path = input.path.as_path();
            let mut image = File::open(path).map_err(|e| FatElfError::io("open", path, e))?;
            let mut target = elf::read_target(&mut image, path)?;

            if let Some(info) = input.osabi {
                target = target.with_osabi(info.id);
            } else if target.osabi == OSABI_UNSPECIFIED {
                let sysv = osabi::display_name(OSABI_UNSPECIFIED);
                let warning = match self.options.host_osabi {
                    Some(host) => {
                        target = target.with_osabi(host.id);
                        format!(
                            "{} has ABI {sysv}; recording it as {} (consider overriding with --osabi)",
                            path.display(),
                            host.name
                        )
                    }
                    None => format!(
                        "{} has ABI {sysv}. Consider overriding with --osabi",
                        path.display()
                    ),
                };
                log::warn!("{warning}");
                warnings.push(warning);
            }

            if let Some(j) = records.iter().position(|r| r.target.matches(&target)) {
                return Err(FatElfError::DuplicateTarget {
                    first: self.inputs[j].path.clone(),
                    second: input.path.clone(),
                    osabi: osabi::display_name(target.osabi),
                });
            }

            let image_offset = align_to_page(offset, self.options.page_size);
            write_zeros(&mut out, image_offset - offset, output)?;

            image
                .seek(SeekFrom::Start(0))
                .map_err(|e| FatElfError::io("seek", path, e))?;
            let size = io::copy(&mut image, &mut out).map_err(|e| FatElfError::io("copy", path, e))?;

            log::debug!(
                "record {i}: {} ({target}) at {image_offset:#x}, {size} bytes",
                path.display()
            );
            records.push(FatRecord {
                target,
                offset: image_offset,
                size,
            });
            reports.push(RecordReport {
                source: input.path.clone(),
                target: target.to_string(),
                offset: image_offset,
                size,
            });
            offset = image_offset + size;
        }

        let header = FatHeader::new(records);
        let mut file = out
            .into_inner()
            .map_err(|e| FatElfError::io("write", output, e.into_error()))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| FatElfError::io("seek", output, e))?;
        file.write_all(&header.to_bytes())
            .map_err(|e| FatElfError::io("write", output, e))?;
        file.flush().map_err(|e| FatElfError::io("write", output, e))?;

        Ok(BuildReport {
            output: output.to_path_buf(),
            records: reports,
            warnings,
            header,
        })
    }
}

fn write_zeros<W: Write>(out: &mut W, len: u64, path: &Path) -> Result<()> {
    io::copy(&mut io::repeat(0).take(len), out)
        .map(|_| ())
        .map_err(|e| FatElfError::io("write", path, e))
}
