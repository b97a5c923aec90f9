//! Shared fixtures: synthetic ELF images and deterministic build options.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use fatelf::elf::{EI_ABIVERSION, EI_CLASS, EI_DATA, EI_OSABI, ELF_MAGIC};
use fatelf::{osabi, BuildOptions, ByteOrder, TargetDescriptor, WordSize};

pub const PAGE: u64 = 4096;

/// Build options independent of the machine running the tests.
pub fn options() -> BuildOptions {
    BuildOptions {
        page_size: PAGE,
        overwrite: false,
        host_osabi: osabi::lookup_by_name("linux"),
    }
}

pub fn target(machine: u16, word_size: WordSize, byte_order: ByteOrder, osabi: u8) -> TargetDescriptor {
    TargetDescriptor {
        machine,
        word_size,
        byte_order,
        osabi,
        osabi_version: 0,
    }
}

/// An ELF header for `target` followed by `body` bytes of a pattern seeded by `seed`.
pub fn fake_elf(target: &TargetDescriptor, body: usize, seed: u8) -> Vec<u8> {
    let header_len = match target.word_size {
        WordSize::Bits32 => 52,
        WordSize::Bits64 => 64,
    };
    let mut bytes = vec![0u8; header_len];
    bytes[..4].copy_from_slice(&ELF_MAGIC);
    bytes[EI_CLASS] = target.word_size.class();
    bytes[EI_DATA] = target.byte_order.data();
    bytes[6] = 1;
    bytes[EI_OSABI] = target.osabi;
    bytes[EI_ABIVERSION] = target.osabi_version;
    let machine = match target.byte_order {
        ByteOrder::Little => target.machine.to_le_bytes(),
        ByteOrder::Big => target.machine.to_be_bytes(),
    };
    bytes[18..20].copy_from_slice(&machine);
    bytes.extend((0..body).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)));
    bytes
}

pub fn write_elf(dir: &Path, name: &str, target: &TargetDescriptor, body: usize, seed: u8) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, fake_elf(target, body, seed)).unwrap();
    path
}

/// Distinct targets to draw test inputs from.
pub fn target_pool() -> Vec<TargetDescriptor> {
    let mut pool = Vec::new();
    for &(machine, word_size) in &[
        (3, WordSize::Bits32),
        (62, WordSize::Bits64),
        (183, WordSize::Bits64),
        (40, WordSize::Bits32),
        (20, WordSize::Bits32),
        (21, WordSize::Bits64),
    ] {
        for &osabi in &[3u8, 9, 12] {
            pool.push(target(machine, word_size, ByteOrder::Little, osabi));
        }
    }
    pool.push(target(20, WordSize::Bits32, ByteOrder::Big, 3));
    pool.push(target(21, WordSize::Bits64, ByteOrder::Big, 3));
    pool
}
