//! Record selection.

use crate::error::{FatElfError, Result};
use crate::format::FatRecord;
use crate::target::TargetDescriptor;

/// Find the first record whose match key equals `target`'s.
///
/// Containers hold at most 255 records, so a linear scan is all this needs.
pub fn find_matching_record<'a>(
    target: &TargetDescriptor,
    records: &'a [FatRecord],
) -> Result<(usize, &'a FatRecord)> {
    records
        .iter()
        .enumerate()
        .find(|(_, record)| record.target.matches(target))
        .ok_or_else(|| FatElfError::NoMatchingArchitecture {
            target: target.to_string(),
        })
}
