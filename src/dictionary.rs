//! Packed binary dictionary loading and hierarchical name/format lookup.
//!
//! Dictionaries are loaded once per decode and are read-only afterwards;
//! `child_pointer_offset`, an absolute byte offset on the wire, is converted
//! to a contiguous child-index range at load time so no raw offsets survive
//! into the lookup path (spec's "manual pointer graphs -> arenas + indices").

use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

use crate::error::{DecodeError, Result};
use crate::primitive::Format;

const HEADER_LEN: usize = 12;
const ENTRY_LEN: usize = 10;

#[derive(Debug)]
pub struct Entry {
    /// Raw format byte; only the high nibble is meaningful.
    pub format: u8,
    pub sequence_number: u16,
    pub child_count: u16,
    /// Index of the first child in `Dictionary::entries`, already converted
    /// from the wire's absolute `child_pointer_offset`. `None` if there are
    /// no children.
    pub child_start: Option<usize>,
    pub name: Option<Vec<u8>>,
}

impl Entry {
    pub fn expected_format(&self) -> u8 {
        self.format >> 4
    }

    fn children_range(&self) -> std::ops::Range<usize> {
        match self.child_start {
            Some(start) => start..start + self.child_count as usize,
            None => 0..0,
        }
    }
}

pub struct Dictionary {
    pub version_tag: u8,
    pub flags: u8,
    pub schema_version: u32,
    pub dictionary_size: u32,
    pub entries: Vec<Entry>,
}

impl Dictionary {
    pub fn load(path: &Path) -> Result<Dictionary> {
        let file = File::open(path)?;
        // mmap once; we immediately copy into an owned working buffer (see
        // `parse`) so the dictionary outlives the mapping and matches the
        // spec's "re-read the entire blob into a working buffer" step.
        let mmap = unsafe { Mmap::map(&file)? };
        Self::parse(&mmap)
    }

    /// Parses a dictionary from an in-memory blob. Exposed separately from
    /// `load` so tests can build blobs without touching the filesystem.
    pub fn parse(blob: &[u8]) -> Result<Dictionary> {
        if blob.len() < HEADER_LEN {
            return Err(DecodeError::UnexpectedEof {
                context: "dictionary header",
            });
        }

        let version_tag = blob[0];
        let flags = blob[1];
        let entry_count = u16::from_le_bytes([blob[2], blob[3]]);
        let schema_version = u32::from_le_bytes([blob[4], blob[5], blob[6], blob[7]]);
        let dictionary_size = u32::from_le_bytes([blob[8], blob[9], blob[10], blob[11]]);

        let mut entries = Vec::with_capacity(entry_count as usize);
        for i in 0..entry_count as usize {
            let base = HEADER_LEN + i * ENTRY_LEN;
            if base + ENTRY_LEN > blob.len() {
                return Err(DecodeError::UnexpectedEof {
                    context: "dictionary entry record",
                });
            }

            let format = blob[base];
            let sequence_number = u16::from_le_bytes([blob[base + 1], blob[base + 2]]);
            let child_pointer_offset = u16::from_le_bytes([blob[base + 3], blob[base + 4]]);
            let child_count = u16::from_le_bytes([blob[base + 5], blob[base + 6]]);
            let name_length = blob[base + 7];
            let name_offset = u16::from_le_bytes([blob[base + 8], blob[base + 9]]);

            let child_start = resolve_child_start(child_pointer_offset);

            let name = resolve_name(blob, name_length, name_offset, dictionary_size);

            entries.push(Entry {
                format,
                sequence_number,
                child_count,
                child_start,
                name,
            });
        }

        Ok(Dictionary {
            version_tag,
            flags,
            schema_version,
            dictionary_size,
            entries,
        })
    }

    /// Hierarchical lookup: `parent = None` searches every top-level entry
    /// (the dictionary's virtual root); `parent = Some(e)` restricts the
    /// search to `e`'s contiguous child range. `format = None` matches any
    /// format (the `-1` sentinel in the spec).
    pub fn find(&self, parent: Option<&Entry>, sequence: u32, format: Option<Format>) -> Option<&Entry> {
        let range = match parent {
            None => 0..self.entries.len(),
            Some(p) => p.children_range(),
        };

        self.entries.get(range)?.iter().find(|e| {
            e.sequence_number as u32 == sequence
                && format.map_or(true, |f| e.expected_format() == f.as_nibble())
        })
    }
}

/// Converts a wire `child_pointer_offset` to a child-start index, treating a
/// corrupt offset (below the header, or not aligned to an entry boundary) as
/// "no children" rather than underflowing the subtraction.
fn resolve_child_start(child_pointer_offset: u16) -> Option<usize> {
    if child_pointer_offset == 0 {
        return None;
    }
    let past_header = child_pointer_offset.checked_sub(HEADER_LEN as u16)?;
    if past_header % ENTRY_LEN as u16 != 0 {
        return None;
    }
    Some(past_header as usize / ENTRY_LEN)
}

fn resolve_name(blob: &[u8], name_length: u8, name_offset: u16, dictionary_size: u32) -> Option<Vec<u8>> {
    if name_length == 0 || name_length == 255 {
        return None;
    }
    let start = name_offset as usize;
    let end = start + name_length as usize;
    if end as u32 > dictionary_size || end > blob.len() {
        let reason = DecodeError::DictionaryOutOfRange {
            offset: start,
            length: name_length as usize,
            size: dictionary_size as usize,
        };
        tracing::warn!(%reason, "entry kept without a name");
        return None;
    }
    Some(blob[start..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a minimal dictionary blob: header + entries + name region.
    fn build_blob(entries: &[(u8, u16, u16, u16, &[u8])]) -> Vec<u8> {
        let header_len = HEADER_LEN;
        let entries_len = entries.len() * ENTRY_LEN;
        let mut names = Vec::new();
        let mut name_offsets = Vec::new();
        for (_, _, _, _, name) in entries {
            name_offsets.push(header_len + entries_len + names.len());
            names.extend_from_slice(name);
        }
        let total = header_len + entries_len + names.len();

        let mut blob = vec![0u8; total];
        blob[0] = 1; // version_tag
        blob[1] = 0; // flags
        blob[2..4].copy_from_slice(&(entries.len() as u16).to_le_bytes());
        blob[4..8].copy_from_slice(&1u32.to_le_bytes());
        blob[8..12].copy_from_slice(&(total as u32).to_le_bytes());

        for (i, (format, sequence, child_ptr, child_count, name)) in entries.iter().enumerate() {
            let base = header_len + i * ENTRY_LEN;
            blob[base] = *format;
            blob[base + 1..base + 3].copy_from_slice(&sequence.to_le_bytes());
            blob[base + 3..base + 5].copy_from_slice(&child_ptr.to_le_bytes());
            blob[base + 5..base + 7].copy_from_slice(&child_count.to_le_bytes());
            blob[base + 7] = name.len() as u8;
            blob[base + 8..base + 10].copy_from_slice(&(name_offsets[i] as u16).to_le_bytes());
        }

        blob
    }

    #[test]
    fn s8_child_range_from_pointer_offset() {
        // root at index 0 with child_pointer_offset=32, child_count=3 -> indices 2..5
        let blob = build_blob(&[
            (0x00, 0, 32, 3, b""),
            (0x30, 10, 0, 0, b"A"),
            (0x30, 11, 0, 0, b"B"),
            (0x30, 12, 0, 0, b"C"),
            (0x30, 13, 0, 0, b"D"),
            (0x30, 14, 0, 0, b"E"),
        ]);
        let dict = Dictionary::parse(&blob).unwrap();
        let root = &dict.entries[0];
        assert_eq!(root.child_start, Some(2));

        assert!(dict.find(Some(root), 10, None).is_none());
        let found = dict.find(Some(root), 12, None).unwrap();
        assert_eq!(found.name.as_deref(), Some(&b"C"[..]));
    }

    #[test]
    fn find_with_no_parent_searches_whole_table() {
        let blob = build_blob(&[(0x30, 1, 0, 0, b"Id"), (0x50, 2, 0, 0, b"Name")]);
        let dict = Dictionary::parse(&blob).unwrap();
        let found = dict.find(None, 2, None).unwrap();
        assert_eq!(found.name.as_deref(), Some(&b"Name"[..]));
    }

    #[test]
    fn find_respects_format_filter() {
        let blob = build_blob(&[(0x30, 5, 0, 0, b"AsInt"), (0x50, 5, 0, 0, b"AsString")]);
        let dict = Dictionary::parse(&blob).unwrap();
        let found = dict.find(None, 5, Some(Format::String)).unwrap();
        assert_eq!(found.name.as_deref(), Some(&b"AsString"[..]));
        assert!(dict.find(None, 5, Some(Format::Boolean)).is_none());
    }

    #[test]
    fn child_pointer_below_header_yields_no_children() {
        // child_pointer_offset=5 is below HEADER_LEN(12); must not underflow.
        let blob = build_blob(&[(0x00, 0, 5, 3, b"")]);
        let dict = Dictionary::parse(&blob).unwrap();
        assert_eq!(dict.entries[0].child_start, None);
        assert_eq!(dict.entries[0].children_range(), 0..0);
    }

    #[test]
    fn child_pointer_misaligned_yields_no_children() {
        // 12 + 10*1 + 3 = 25 is not a multiple of ENTRY_LEN past the header.
        let blob = build_blob(&[(0x00, 0, 25, 1, b""), (0x30, 1, 0, 0, b"A")]);
        let dict = Dictionary::parse(&blob).unwrap();
        assert_eq!(dict.entries[0].child_start, None);
    }

    #[test]
    fn name_out_of_range_yields_no_name() {
        let mut blob = build_blob(&[(0x30, 1, 0, 0, b"Id")]);
        // corrupt name_offset to point past the blob
        blob[HEADER_LEN + 8] = 0xFF;
        blob[HEADER_LEN + 9] = 0xFF;
        let dict = Dictionary::parse(&blob).unwrap();
        assert!(dict.entries[0].name.is_none());
    }

    #[test]
    fn zero_length_name_is_absent() {
        let blob = build_blob(&[(0x30, 1, 0, 0, b"")]);
        let dict = Dictionary::parse(&blob).unwrap();
        assert!(dict.entries[0].name.is_none());
    }
}
