//! FatELF container layout.
//!
//! ```text
//! +--------------------------------------+ 0
//! | magic u32 | version u16 | n u8 | pad |
//! +--------------------------------------+ 8
//! | record[0] (24 bytes)                 |
//! | ...                                  |
//! | record[n-1]                          |
//! +--------------------------------------+ 8 + 24n
//! | zero padding to page boundary        |
//! | image 0                              |
//! | zero padding to page boundary        |
//! | image 1 ...                          |
//! +--------------------------------------+
//! ```
//!
//! Header and record fields are little-endian regardless of host or image
//! byte order.

use std::io::Read;
use std::path::Path;

use crate::error::{FatElfError, Result};
use crate::target::{ByteOrder, TargetDescriptor, WordSize};

/// First four bytes of every container (stored little-endian: `FA 70 0E 1F`).
pub const FATELF_MAGIC: u32 = 0x1F0E_70FA;

/// Container format version written and accepted.
pub const FATELF_FORMAT_VERSION: u16 = 1;

/// Fixed prefix: magic, version, record count, reserved byte.
pub const HEADER_PREFIX_SIZE: usize = 8;

/// One on-disk record.
pub const RECORD_SIZE: usize = 24;

/// `num_records` is a single byte.
pub const MAX_RECORDS: usize = 255;

/// On-disk size of a header holding `num_records` records.
pub const fn header_size(num_records: usize) -> usize {
    HEADER_PREFIX_SIZE + RECORD_SIZE * num_records
}

/// One embedded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatRecord {
    pub target: TargetDescriptor,
    /// Bytes from the start of the container
    pub offset: u64,
    /// Length of the image in bytes
    pub size: u64,
}

impl FatRecord {
    /// One past the last byte of the image.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.target.machine.to_le_bytes());
        out.push(self.target.osabi);
        out.push(self.target.osabi_version);
        out.push(self.target.word_size.class());
        out.push(self.target.byte_order.data());
        out.push(0);
        out.push(0);
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
    }

    fn decode(raw: &[u8], index: usize, path: &Path) -> Result<Self> {
        let word_size = WordSize::from_class(raw[4]).ok_or_else(|| {
            FatElfError::format(path, format!("record {index}: invalid word size {}", raw[4]))
        })?;
        let byte_order = ByteOrder::from_data(raw[5]).ok_or_else(|| {
            FatElfError::format(path, format!("record {index}: invalid byte order {}", raw[5]))
        })?;
        Ok(FatRecord {
            target: TargetDescriptor {
                machine: u16::from_le_bytes([raw[0], raw[1]]),
                word_size,
                byte_order,
                osabi: raw[2],
                osabi_version: raw[3],
            },
            offset: read_u64(raw, 8),
            size: read_u64(raw, 16),
        })
    }
}

/// Container index: everything before the first embedded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatHeader {
    pub version: u16,
    pub records: Vec<FatRecord>,
}

impl FatHeader {
    pub fn new(records: Vec<FatRecord>) -> Self {
        Self {
            version: FATELF_FORMAT_VERSION,
            records,
        }
    }

    /// On-disk size of this header.
    pub fn disk_size(&self) -> usize {
        header_size(self.records.len())
    }

    /// Serialize to the exact on-disk bytes.
    ///
    /// Callers guarantee `records.len() <= MAX_RECORDS`; the builder enforces it on push.
    pub fn to_bytes(&self) -> Vec<u8> {
        debug_assert!(self.records.len() <= MAX_RECORDS);
        let mut out = Vec::with_capacity(self.disk_size());
        out.extend_from_slice(&FATELF_MAGIC.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(self.records.len() as u8);
        out.push(0);
        for record in &self.records {
            record.encode(&mut out);
        }
        out
    }

    /// Decode a header from the start of `data`.
    ///
    /// Trailing bytes past the record table are ignored.
    pub fn parse(data: &[u8], path: &Path) -> Result<Self> {
        if data.len() < HEADER_PREFIX_SIZE {
            return Err(FatElfError::format(path, "truncated header"));
        }
        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if magic != FATELF_MAGIC {
            return Err(FatElfError::format(path, format!("bad magic {magic:#010x}")));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != FATELF_FORMAT_VERSION {
            return Err(FatElfError::format(
                path,
                format!("unsupported format version {version}"),
            ));
        }
        let count = data[6] as usize;
        if data.len() < header_size(count) {
            return Err(FatElfError::format(path, "truncated record table"));
        }

        let records = data[HEADER_PREFIX_SIZE..header_size(count)]
            .chunks_exact(RECORD_SIZE)
            .enumerate()
            .map(|(i, raw)| FatRecord::decode(raw, i, path))
            .collect::<Result<Vec<_>>>()?;

        Ok(FatHeader { version, records })
    }

    /// Read and decode the header from the start of `reader`.
    pub fn read_from<R: Read>(reader: &mut R, path: &Path) -> Result<Self> {
        let mut prefix = [0u8; HEADER_PREFIX_SIZE];
        read_exact(reader, &mut prefix, path)?;
        // Validates magic/version before trusting the count.
        FatHeader::parse(&prefix_only(&prefix), path)?;

        let mut data = vec![0u8; header_size(prefix[6] as usize)];
        data[..HEADER_PREFIX_SIZE].copy_from_slice(&prefix);
        read_exact(reader, &mut data[HEADER_PREFIX_SIZE..], path)?;
        FatHeader::parse(&data, path)
    }

    /// Check the container invariants against a file of `file_len` bytes.
    pub fn validate(&self, file_len: u64, path: &Path) -> Result<()> {
        if self.records.is_empty() {
            return Err(FatElfError::format(path, "container has no records"));
        }
        if self.records.len() > MAX_RECORDS {
            return Err(FatElfError::format(path, "too many records"));
        }

        let mut previous_end = self.disk_size() as u64;
        for (i, record) in self.records.iter().enumerate() {
            let end = record
                .end()
                .ok_or_else(|| FatElfError::format(path, format!("record {i}: size overflows")))?;
            if record.offset < previous_end {
                return Err(FatElfError::format(
                    path,
                    format!("record {i}: offset {} overlaps previous data", record.offset),
                ));
            }
            if end > file_len {
                return Err(FatElfError::format(
                    path,
                    format!("record {i}: ends at {end}, past end of file ({file_len})"),
                ));
            }
            previous_end = end;

            if let Some(j) = self.records[..i]
                .iter()
                .position(|other| other.target.matches(&record.target))
            {
                return Err(FatElfError::format(
                    path,
                    format!("records {j} and {i} are for the same target {}", record.target),
                ));
            }
        }
        Ok(())
    }
}

/// A zero-record header built from a prefix, for early magic/version checks.
fn prefix_only(prefix: &[u8; HEADER_PREFIX_SIZE]) -> [u8; HEADER_PREFIX_SIZE] {
    let mut only = *prefix;
    only[6] = 0;
    only
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], path: &Path) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FatElfError::format(path, "truncated header")
        } else {
            FatElfError::io("read", path, e)
        }
    })
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Round `offset` up to a multiple of `page_size` (a power of two).
pub fn align_to_page(offset: u64, page_size: u64) -> u64 {
    debug_assert!(page_size.is_power_of_two());
    (offset + page_size - 1) & !(page_size - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn target(machine: u16, osabi: u8) -> TargetDescriptor {
        TargetDescriptor {
            machine,
            word_size: WordSize::Bits64,
            byte_order: ByteOrder::Little,
            osabi,
            osabi_version: 0,
        }
    }

    fn two_records() -> FatHeader {
        FatHeader::new(vec![
            FatRecord {
                target: target(62, 3),
                offset: 4096,
                size: 100,
            },
            FatRecord {
                target: TargetDescriptor {
                    machine: 20,
                    word_size: WordSize::Bits32,
                    byte_order: ByteOrder::Big,
                    osabi: 9,
                    osabi_version: 2,
                },
                offset: 8192,
                size: 0x0102_0304,
            },
        ])
    }

    #[test]
    fn header_size_depends_only_on_count() {
        assert_eq!(header_size(0), 8);
        assert_eq!(header_size(2), 56);
        assert_eq!(header_size(255), 8 + 24 * 255);
        assert_eq!(two_records().disk_size(), 56);
    }

    #[test]
    fn encodes_exact_layout() {
        let bytes = two_records().to_bytes();
        #[rustfmt::skip]
        let expected: Vec<u8> = vec![
            0xFA, 0x70, 0x0E, 0x1F, 0x01, 0x00, 0x02, 0x00,
            // record 0
            62, 0, 3, 0, 2, 1, 0, 0,
            0x00, 0x10, 0, 0, 0, 0, 0, 0,
            100, 0, 0, 0, 0, 0, 0, 0,
            // record 1
            20, 0, 9, 2, 1, 2, 0, 0,
            0x00, 0x20, 0, 0, 0, 0, 0, 0,
            0x04, 0x03, 0x02, 0x01, 0, 0, 0, 0,
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn parse_reads_back_encoded_header() {
        let header = two_records();
        let parsed = FatHeader::parse(&header.to_bytes(), Path::new("c")).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn parse_rejects_bad_magic_and_version() {
        let mut bytes = two_records().to_bytes();
        bytes[0] = 0x7F;
        let err = FatHeader::parse(&bytes, Path::new("c")).unwrap_err();
        assert!(err.to_string().contains("bad magic"));

        let mut bytes = two_records().to_bytes();
        bytes[4] = 2;
        let err = FatHeader::parse(&bytes, Path::new("c")).unwrap_err();
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn parse_rejects_truncation() {
        let bytes = two_records().to_bytes();
        assert!(matches!(
            FatHeader::parse(&bytes[..5], Path::new("c")),
            Err(FatElfError::Format { .. })
        ));
        assert!(matches!(
            FatHeader::parse(&bytes[..40], Path::new("c")),
            Err(FatElfError::Format { .. })
        ));
    }

    #[test]
    fn read_from_stops_after_record_table() {
        let mut bytes = two_records().to_bytes();
        bytes.extend_from_slice(&[0xEE; 64]);
        let mut cursor = Cursor::new(bytes);
        let header = FatHeader::read_from(&mut cursor, Path::new("c")).unwrap();
        assert_eq!(header.records.len(), 2);
        assert_eq!(cursor.position(), 56);
    }

    #[test]
    fn read_from_reports_truncation_as_format_error() {
        let bytes = two_records().to_bytes();
        let mut cursor = Cursor::new(bytes[..30].to_vec());
        let err = FatHeader::read_from(&mut cursor, Path::new("c")).unwrap_err();
        assert!(matches!(err, FatElfError::Format { .. }));

        let mut cursor = Cursor::new(b"\x7FELF\x02\x01\x01\x00".to_vec());
        let err = FatHeader::read_from(&mut cursor, Path::new("c")).unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn validate_accepts_packed_container() {
        let header = two_records();
        assert!(header.validate(8192 + 0x0102_0304, Path::new("c")).is_ok());
    }

    #[test]
    fn validate_rejects_record_past_eof() {
        let header = two_records();
        let err = header.validate(8192, Path::new("c")).unwrap_err();
        assert!(err.to_string().contains("past end of file"));
    }

    #[test]
    fn validate_rejects_overlap_and_header_overlap() {
        let mut header = two_records();
        header.records[1].offset = 4096 + 50;
        assert!(header.validate(u64::MAX, Path::new("c")).is_err());

        let mut header = two_records();
        header.records[0].offset = 16;
        assert!(header.validate(u64::MAX, Path::new("c")).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_targets_and_empty() {
        let mut header = two_records();
        header.records[1].target = target(62, 3).with_osabi(3);
        header.records[1].target.osabi_version = 5;
        assert!(header.validate(u64::MAX, Path::new("c")).is_err());

        assert!(FatHeader::new(vec![]).validate(8, Path::new("c")).is_err());
    }

    #[test]
    fn validate_rejects_overflowing_size() {
        let mut header = two_records();
        header.records[1].size = u64::MAX;
        assert!(header.validate(u64::MAX, Path::new("c")).is_err());
    }

    #[test]
    fn align_to_page_rounds_up() {
        assert_eq!(align_to_page(0, 4096), 0);
        assert_eq!(align_to_page(56, 4096), 4096);
        assert_eq!(align_to_page(4096, 4096), 4096);
        assert_eq!(align_to_page(4097, 4096), 8192);
        assert_eq!(align_to_page(56, 65536), 65536);
    }
}
