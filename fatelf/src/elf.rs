//! ELF header reader
//!
//! Only the fields that identify a target are decoded: class, data encoding,
//! OS/ABI, ABI version and `e_machine`. Nothing past the fixed file header is
//! looked at.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{FatElfError, Result};
use crate::target::{ByteOrder, TargetDescriptor, WordSize};

/// ELF magic number: 0x7F 'E' 'L' 'F'
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// Size of `e_ident`
pub const EI_NIDENT: usize = 16;

/// `e_ident` index of the file class
pub const EI_CLASS: usize = 4;

/// `e_ident` index of the data encoding
pub const EI_DATA: usize = 5;

/// `e_ident` index of the OS/ABI identification
pub const EI_OSABI: usize = 7;

/// `e_ident` index of the ABI version
pub const EI_ABIVERSION: usize = 8;

/// Offset of `e_machine` (same for both classes)
const E_MACHINE: usize = 18;

/// ELF32 file header size
pub const ELF32_HEADER_SIZE: usize = 52;

/// ELF64 file header size
pub const ELF64_HEADER_SIZE: usize = 64;

/// Decode the target of an ELF image from its leading bytes.
///
/// `path` is only used in error messages.
pub fn parse_target(data: &[u8], path: &Path) -> Result<TargetDescriptor> {
    let magic_len = data.len().min(ELF_MAGIC.len());
    if data[..magic_len] != ELF_MAGIC[..magic_len] {
        return Err(FatElfError::NotAnElfImage {
            path: path.to_path_buf(),
            reason: "bad magic".to_string(),
        });
    }
    if data.len() < EI_NIDENT {
        return Err(FatElfError::TruncatedImage {
            path: path.to_path_buf(),
            len: data.len(),
        });
    }

    let word_size = WordSize::from_class(data[EI_CLASS]).ok_or_else(|| FatElfError::NotAnElfImage {
        path: path.to_path_buf(),
        reason: format!("invalid class {}", data[EI_CLASS]),
    })?;
    let byte_order = ByteOrder::from_data(data[EI_DATA]).ok_or_else(|| FatElfError::NotAnElfImage {
        path: path.to_path_buf(),
        reason: format!("invalid data encoding {}", data[EI_DATA]),
    })?;

    let header_size = match word_size {
        WordSize::Bits32 => ELF32_HEADER_SIZE,
        WordSize::Bits64 => ELF64_HEADER_SIZE,
    };
    if data.len() < header_size {
        return Err(FatElfError::TruncatedImage {
            path: path.to_path_buf(),
            len: data.len(),
        });
    }

    let machine_bytes = [data[E_MACHINE], data[E_MACHINE + 1]];
    let machine = match byte_order {
        ByteOrder::Little => u16::from_le_bytes(machine_bytes),
        ByteOrder::Big => u16::from_be_bytes(machine_bytes),
    };

    Ok(TargetDescriptor {
        machine,
        word_size,
        byte_order,
        osabi: data[EI_OSABI],
        osabi_version: data[EI_ABIVERSION],
    })
}

/// Read at most one ELF64 header's worth of bytes from `reader` and decode it.
pub fn read_target<R: Read>(reader: &mut R, path: &Path) -> Result<TargetDescriptor> {
    let mut buf = Vec::with_capacity(ELF64_HEADER_SIZE);
    reader
        .take(ELF64_HEADER_SIZE as u64)
        .read_to_end(&mut buf)
        .map_err(|e| FatElfError::io("read", path, e))?;
    parse_target(&buf, path)
}

/// Open `path` and decode its ELF target.
pub fn read_target_from_path(path: &Path) -> Result<TargetDescriptor> {
    let mut file = File::open(path).map_err(|e| FatElfError::io("open", path, e))?;
    read_target(&mut file, path)
}
