//! Target descriptors: the identity of an ELF image for matching purposes.

use core::fmt;

use crate::osabi;

/// ELF word size (`e_ident[EI_CLASS]`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordSize {
    /// ELFCLASS32
    Bits32 = 1,
    /// ELFCLASS64
    Bits64 = 2,
}

impl WordSize {
    /// Decode an `EI_CLASS` byte.
    pub fn from_class(class: u8) -> Option<Self> {
        match class {
            1 => Some(Self::Bits32),
            2 => Some(Self::Bits64),
            _ => None,
        }
    }

    pub fn class(self) -> u8 {
        self as u8
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::Bits32 => 32,
            Self::Bits64 => 64,
        }
    }
}

/// ELF data encoding (`e_ident[EI_DATA]`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// ELFDATA2LSB
    Little = 1,
    /// ELFDATA2MSB
    Big = 2,
}

impl ByteOrder {
    /// Decode an `EI_DATA` byte.
    pub fn from_data(data: u8) -> Option<Self> {
        match data {
            1 => Some(Self::Little),
            2 => Some(Self::Big),
            _ => None,
        }
    }

    pub fn data(self) -> u8 {
        self as u8
    }

    fn short(self) -> &'static str {
        match self {
            Self::Little => "le",
            Self::Big => "be",
        }
    }
}

/// The identifying fields of an ELF image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetDescriptor {
    /// `e_machine`
    pub machine: u16,
    pub word_size: WordSize,
    pub byte_order: ByteOrder,
    /// `e_ident[EI_OSABI]`
    pub osabi: u8,
    /// `e_ident[EI_ABIVERSION]`
    pub osabi_version: u8,
}

/// The fields two records must not share, and a host must equal to run an image.
///
/// OS/ABI version is informational and deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub machine: u16,
    pub word_size: WordSize,
    pub byte_order: ByteOrder,
    pub osabi: u8,
}

impl TargetDescriptor {
    pub fn match_key(&self) -> MatchKey {
        MatchKey {
            machine: self.machine,
            word_size: self.word_size,
            byte_order: self.byte_order,
            osabi: self.osabi,
        }
    }

    /// True when `other` could run where `self` runs.
    pub fn matches(&self, other: &TargetDescriptor) -> bool {
        self.match_key() == other.match_key()
    }

    /// Copy with the OS/ABI id replaced.
    pub fn with_osabi(self, osabi: u8) -> Self {
        Self { osabi, ..self }
    }
}

/// `machine:wordsize:byteorder:osabi:osabiver`, e.g. `x86_64:64bits:le:linux:osabiver0`
impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match machine_name(self.machine) {
            Some(name) => f.write_str(name)?,
            None => write!(f, "machine{}", self.machine)?,
        }
        write!(
            f,
            ":{}bits:{}:{}:osabiver{}",
            self.word_size.bits(),
            self.byte_order.short(),
            osabi::display_name(self.osabi),
            self.osabi_version
        )
    }
}

static MACHINES: &[(u16, &str)] = &[
    (1, "m32"),
    (2, "sparc"),
    (3, "i386"),
    (4, "m68k"),
    (5, "m88k"),
    (7, "i860"),
    (8, "mips"),
    (9, "s370"),
    (10, "mips_rs3_le"),
    (15, "parisc"),
    (18, "sparc32plus"),
    (20, "ppc"),
    (21, "ppc64"),
    (22, "s390"),
    (40, "arm"),
    (41, "alpha_std"),
    (42, "sh"),
    (43, "sparcv9"),
    (46, "h8_300h"),
    (50, "ia64"),
    (54, "mips_x"),
    (62, "x86_64"),
    (76, "cris"),
    (87, "v850"),
    (88, "m32r"),
    (94, "xtensa"),
    (106, "blackfin"),
    (164, "hexagon"),
    (183, "aarch64"),
    (188, "microblaze"),
    (243, "riscv"),
    (247, "bpf"),
    (258, "loongarch"),
    (0x9026, "alpha"),
];

/// Short name for an `e_machine` value.
pub fn machine_name(machine: u16) -> Option<&'static str> {
    MACHINES
        .iter()
        .find(|(id, _)| *id == machine)
        .map(|(_, name)| *name)
}
