//! Final `sfnt` assembly.
//!
//! Collects the rewritten tables, sorts the directory by tag, pads every
//! table to a four-byte boundary, computes the per-table checksums and
//! finalizes `head.checksumAdjustment`.

use std::collections::BTreeMap;

use font_types::Tag;

use crate::{
    emit::{patch_u32, push_u16, push_u32},
    error::{Error, Result},
};

const HEAD: Tag = Tag::new(b"head");
const CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;

/// Accumulates finished table buffers and assembles the output font.
#[derive(Default)]
pub struct FontBuilder {
    tables: BTreeMap<Tag, Vec<u8>>,
}

impl FontBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a table. Empty buffers are ignored; a dropped
    /// table never reaches the directory.
    pub fn add_table(&mut self, tag: Tag, data: Vec<u8>) -> &mut Self {
        if !data.is_empty() {
            self.tables.insert(tag, data);
        }
        self
    }

    pub fn remove_table(&mut self, tag: Tag) -> &mut Self {
        self.tables.remove(&tag);
        self
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.tables.contains_key(&tag)
    }

    /// Serialize the font. `sfnt_version` is mirrored from the source
    /// font so CFF-flavored fonts keep their `OTTO` signature.
    pub fn build(self, sfnt_version: u32) -> Result<Vec<u8>> {
        let num_tables = self.tables.len() as u16;
        if num_tables == 0 {
            return Err(Error::NoTables);
        }

        let entry_selector = 15 - num_tables.leading_zeros() as u16;
        let search_range = 16 * (1u16 << entry_selector);
        let range_shift = 16 * num_tables - search_range;

        let mut out = Vec::new();
        push_u32(&mut out, sfnt_version);
        push_u16(&mut out, num_tables);
        push_u16(&mut out, search_range);
        push_u16(&mut out, entry_selector);
        push_u16(&mut out, range_shift);

        // Directory records, sorted ascending by tag (BTreeMap order).
        let mut offset = 12 + 16 * num_tables as u32;
        let mut head_offset = None;
        for (tag, data) in &self.tables {
            if *tag == HEAD {
                head_offset = Some(offset);
            }
            out.extend_from_slice(&tag.to_be_bytes());
            push_u32(&mut out, table_checksum(data));
            push_u32(&mut out, offset);
            push_u32(&mut out, data.len() as u32);
            offset += padded_len(data.len()) as u32;
        }

        for data in self.tables.values() {
            out.extend_from_slice(data);
            out.resize(out.len() + padded_len(data.len()) - data.len(), 0);
        }

        // head carries a zeroed checksumAdjustment until now; fix it up
        // from the whole-file checksum.
        if let Some(head_offset) = head_offset {
            let adjustment = CHECKSUM_MAGIC.wrapping_sub(table_checksum(&out));
            patch_u32(&mut out, head_offset as usize + 8, adjustment);
        }
        Ok(out)
    }
}

fn padded_len(len: usize) -> usize {
    len.next_multiple_of(4)
}

/// Sum of big-endian u32 words; a short tail is high-byte-aligned.
fn table_checksum(data: &[u8]) -> u32 {
    let mut sum = 0u32;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        sum = sum.wrapping_add(u32::from_be_bytes(chunk.try_into().unwrap()));
    }
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut last = [0u8; 4];
        last[..tail.len()].copy_from_slice(tail);
        sum = sum.wrapping_add(u32::from_be_bytes(last));
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_pads_the_tail_high() {
        assert_eq!(table_checksum(&[0, 0, 0, 1]), 1);
        assert_eq!(table_checksum(&[0x80]), 0x8000_0000);
        assert_eq!(table_checksum(&[1, 0, 0, 0, 2]), 0x0100_0000 + 0x0200_0000);
    }

    #[test]
    fn checksum_wraps() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 2];
        assert_eq!(table_checksum(&data), 1);
    }

    #[test]
    fn empty_builder_is_an_error() {
        assert!(matches!(
            FontBuilder::new().build(0x0001_0000),
            Err(Error::NoTables)
        ));
    }

    #[test]
    fn records_are_sorted_and_padded() {
        let mut builder = FontBuilder::new();
        builder.add_table(Tag::new(b"zzzz"), vec![1, 2, 3]); // 3 bytes: padded to 4
        builder.add_table(Tag::new(b"aaaa"), vec![9; 5]);
        let font = builder.build(0x0001_0000).unwrap();

        assert_eq!(&font[0..4], &0x0001_0000u32.to_be_bytes());
        assert_eq!(u16::from_be_bytes([font[4], font[5]]), 2);
        // first record is "aaaa"
        assert_eq!(&font[12..16], b"aaaa");
        let offset_a = u32::from_be_bytes(font[20..24].try_into().unwrap());
        let len_a = u32::from_be_bytes(font[24..28].try_into().unwrap());
        assert_eq!(offset_a, 12 + 32);
        assert_eq!(len_a, 5);
        assert_eq!(&font[28..32], b"zzzz");
        let offset_z = u32::from_be_bytes(font[36..40].try_into().unwrap());
        assert_eq!(offset_z, offset_a + 8); // 5 bytes padded to 8
        assert_eq!(font.len() as u32, offset_z + 4);
        // every table starts on a 4-byte boundary
        assert_eq!(offset_a % 4, 0);
        assert_eq!(offset_z % 4, 0);
    }

    #[test]
    fn search_params_match_the_table_count() {
        let mut builder = FontBuilder::new();
        for i in 0..9u8 {
            builder.add_table(Tag::new(&[b'a' + i; 4]), vec![0, 0, 0, i]);
        }
        let font = builder.build(0x0001_0000).unwrap();
        // 9 tables: floor(log2(9)) = 3, searchRange = 16 * 8 = 128,
        // rangeShift = 144 - 128.
        assert_eq!(u16::from_be_bytes([font[6], font[7]]), 128);
        assert_eq!(u16::from_be_bytes([font[8], font[9]]), 3);
        assert_eq!(u16::from_be_bytes([font[10], font[11]]), 16);
    }

    #[test]
    fn checksum_adjustment_balances_the_file() {
        let mut builder = FontBuilder::new();
        // A minimal head-like table: 54 bytes, adjustment field zeroed.
        builder.add_table(HEAD, vec![0; 54]);
        builder.add_table(Tag::new(b"maxp"), vec![0, 0, 0x50, 0, 0, 4]);
        let font = builder.build(0x0001_0000).unwrap();

        // Re-zero the adjustment and verify the stored value satisfies
        // adjustment = magic - sum(file).
        let head_offset = {
            let mut found = None;
            for i in 0..2 {
                let record = 12 + i * 16;
                if &font[record..record + 4] == b"head" {
                    found = Some(u32::from_be_bytes(
                        font[record + 8..record + 12].try_into().unwrap(),
                    ));
                }
            }
            found.unwrap() as usize
        };
        let stored =
            u32::from_be_bytes(font[head_offset + 8..head_offset + 12].try_into().unwrap());
        let mut zeroed = font.clone();
        patch_u32(&mut zeroed, head_offset + 8, 0);
        assert_eq!(stored, CHECKSUM_MAGIC.wrapping_sub(table_checksum(&zeroed)));
    }
}
