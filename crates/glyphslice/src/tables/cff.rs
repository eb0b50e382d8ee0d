//! CFF table rewrite.
//!
//! The subset gathers the retained charstrings, closes over the local and
//! global subroutines they call, renumbers the survivors consecutively and
//! re-encodes every call site against the new biases, then emits a fresh
//! table: Name INDEX, Top DICT INDEX, empty String INDEX, Global Subrs
//! INDEX, charset, CharStrings INDEX, Private DICT, Local Subrs INDEX.
//!
//! The subroutine scan is conservative: only `callsubr`/`callgsubr` with a
//! directly preceding integer operand are tracked, and the stem count is
//! carried so that hintmask operand bytes are skipped correctly.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use font_types::Tag;
use log::debug;
use read_fonts::{
    FontData, FontRead,
    tables::postscript::{
        Index1,
        dict::{self, Entry},
    },
};

use crate::{
    emit::{build_cff_index, cff_offset_size, push_charstring_int, push_dict_int, push_dict_op},
    error::{Error, Result},
    plan::Plan,
    types::GlyphId,
};

pub const CFF: Tag = Tag::new(b"CFF ");

const ENDCHAR: u8 = 0x0E;
const CALLSUBR: u8 = 10;
const CALLGSUBR: u8 = 29;
const ESCAPE: u8 = 12;
const HINTMASK: u8 = 19;
const CNTRMASK: u8 = 20;

// Top and Private DICT operators.
const OP_BLUE_VALUES: u16 = 6;
const OP_OTHER_BLUES: u16 = 7;
const OP_FAMILY_BLUES: u16 = 8;
const OP_FAMILY_OTHER_BLUES: u16 = 9;
const OP_STD_HW: u16 = 10;
const OP_STD_VW: u16 = 11;
const OP_CHARSET: u16 = 15;
const OP_CHAR_STRINGS: u16 = 17;
const OP_PRIVATE: u16 = 18;
const OP_SUBRS: u16 = 19;
const OP_DEFAULT_WIDTH_X: u16 = 20;
const OP_NOMINAL_WIDTH_X: u16 = 21;
const OP_BLUE_SHIFT: u16 = 0x0C06;
const OP_BLUE_FUZZ: u16 = 0x0C07;
const OP_STEM_SNAP_H: u16 = 0x0C0C;
const OP_STEM_SNAP_V: u16 = 0x0C0D;
const OP_FORCE_BOLD: u16 = 0x0C0E;
const OP_LANGUAGE_GROUP: u16 = 0x0C11;

pub fn subset_cff(plan: &Plan) -> Result<Vec<u8>> {
    let cff = plan.cff().ok_or(Error::MissingRequiredTable(CFF))?;
    let table = plan
        .table_bytes(CFF)
        .ok_or(Error::MissingRequiredTable(CFF))?;

    let name = cff
        .names()
        .get(0)
        .map_err(|_| Error::MissingRequiredTable(CFF))?
        .to_vec();
    let top_dict = cff
        .top_dicts()
        .get(0)
        .map_err(|_| Error::MissingRequiredTable(CFF))?;

    let mut charstrings_offset = None;
    let mut private_range: Option<Range<usize>> = None;
    for entry in dict::entries(top_dict, None).flatten() {
        match entry {
            Entry::CharstringsOffset(offset) => charstrings_offset = Some(offset),
            Entry::PrivateDictRange(range) => private_range = Some(range),
            _ => {}
        }
    }
    let charstrings_offset = charstrings_offset.ok_or(Error::MissingRequiredTable(CFF))?;
    let charstrings_data = table
        .get(charstrings_offset..)
        .ok_or(Error::MissingRequiredTable(CFF))?;
    let charstrings = Index1::read(FontData::new(charstrings_data))?;

    let global_subrs = cff.global_subrs();

    // Private DICT fields and the local subr index it points at.
    let private_data = private_range
        .clone()
        .and_then(|r| table.get(r))
        .unwrap_or(&[]);
    let private_values = parse_private_dict(private_data);
    let mut local_subrs: Option<Index1> = None;
    if let (Some(range), Some(offset)) = (&private_range, private_values.subrs_offset) {
        match table
            .get(range.start + offset..)
            .map(|data| Index1::read(FontData::new(data)))
        {
            Some(Ok(index)) => local_subrs = Some(index),
            _ => debug!("local subr index unreadable; treating as absent"),
        }
    }

    let local_count = local_subrs.as_ref().map(|i| i.count() as u32).unwrap_or(0);
    let global_count = global_subrs.count() as u32;
    let old_local_bias = subr_bias(local_count);
    let old_global_bias = subr_bias(global_count);

    // 1. Gather the retained charstrings; empty slots get a bare endchar.
    let mut gathered: Vec<Vec<u8>> = Vec::with_capacity(plan.num_output_glyphs() as usize);
    for new_gid in 0..plan.num_output_glyphs() {
        match plan.old_gid_for(GlyphId::new(new_gid)) {
            Some(old) => {
                let charstring = charstrings
                    .get(old.to_u16() as usize)
                    .map_err(|_| Error::InvalidGlyphReference(old))?;
                gathered.push(charstring.to_vec());
            }
            None => gathered.push(vec![ENDCHAR]),
        }
    }

    // 2. Close over the subroutines the gathered charstrings reach.
    let mut used_locals: BTreeSet<i32> = BTreeSet::new();
    let mut used_globals: BTreeSet<i32> = BTreeSet::new();
    for charstring in &gathered {
        scan_charstring(
            charstring,
            old_local_bias,
            old_global_bias,
            &mut used_locals,
            &mut used_globals,
        );
    }
    loop {
        let before = (used_locals.len(), used_globals.len());
        for index in used_locals.clone() {
            if let Some(body) = subr_body(local_subrs.as_ref(), index, local_count) {
                scan_charstring(
                    body,
                    old_local_bias,
                    old_global_bias,
                    &mut used_locals,
                    &mut used_globals,
                );
            }
        }
        for index in used_globals.clone() {
            if let Some(body) = subr_body(Some(&global_subrs), index, global_count) {
                scan_charstring(
                    body,
                    old_local_bias,
                    old_global_bias,
                    &mut used_locals,
                    &mut used_globals,
                );
            }
        }
        if (used_locals.len(), used_globals.len()) == before {
            break;
        }
    }
    used_locals.retain(|&i| i >= 0 && (i as u32) < local_count);
    used_globals.retain(|&i| i >= 0 && (i as u32) < global_count);

    // 3. Renumber in ascending old order and recompute biases.
    let local_map: BTreeMap<i32, i32> = used_locals
        .iter()
        .enumerate()
        .map(|(new, &old)| (old, new as i32))
        .collect();
    let global_map: BTreeMap<i32, i32> = used_globals
        .iter()
        .enumerate()
        .map(|(new, &old)| (old, new as i32))
        .collect();
    let new_local_bias = subr_bias(local_map.len() as u32);
    let new_global_bias = subr_bias(global_map.len() as u32);

    let remap = CallRemap {
        old_local_bias,
        new_local_bias,
        old_global_bias,
        new_global_bias,
        local_map: &local_map,
        global_map: &global_map,
    };

    // 4. Re-encode every call site.
    let rewritten: Vec<Vec<u8>> = gathered
        .iter()
        .map(|cs| rewrite_charstring(cs, &remap))
        .collect();
    let new_locals: Vec<Vec<u8>> = local_map
        .keys()
        .map(|&old| {
            subr_body(local_subrs.as_ref(), old, local_count)
                .map(|body| rewrite_charstring(body, &remap))
                .unwrap_or_default()
        })
        .collect();
    let new_globals: Vec<Vec<u8>> = global_map
        .keys()
        .map(|&old| {
            subr_body(Some(&global_subrs), old, global_count)
                .map(|body| rewrite_charstring(body, &remap))
                .unwrap_or_default()
        })
        .collect();

    // 5. Emit.
    let name_index = build_cff_index(&[name]);
    let string_index = build_cff_index(&[]);
    let gsubr_index = build_cff_index(&new_globals);
    let charset = build_charset(plan.num_output_glyphs());
    let charstrings_index = build_cff_index(&rewritten);

    let private = build_private_dict_stable(&private_values, !new_locals.is_empty());
    let lsubr_index = if new_locals.is_empty() {
        Vec::new()
    } else {
        build_cff_index(&new_locals)
    };

    // 6. Top DICT layout: the offsets depend on the Top DICT's own encoded
    // length, so iterate until the estimate reproduces itself. Integer
    // encodings grow monotonically with magnitude, so this settles after
    // one correction.
    let mut estimate = 0usize;
    let (top_body, _) = loop {
        let top_index_len = single_index_len(estimate);
        let charset_offset =
            4 + name_index.len() + top_index_len + string_index.len() + gsubr_index.len();
        let charstrings_offset = charset_offset + charset.len();
        let private_offset = charstrings_offset + charstrings_index.len();
        let body = build_top_dict(charset_offset, charstrings_offset, private.len(), private_offset);
        if body.len() == estimate {
            break (body, charset_offset);
        }
        estimate = body.len();
    };

    let mut out = Vec::new();
    out.extend_from_slice(&[1, 0, 4, 0]); // header; offSize patched below
    out.extend_from_slice(&name_index);
    out.extend_from_slice(&build_cff_index(&[top_body]));
    out.extend_from_slice(&string_index);
    out.extend_from_slice(&gsubr_index);
    out.extend_from_slice(&charset);
    out.extend_from_slice(&charstrings_index);
    out.extend_from_slice(&private);
    out.extend_from_slice(&lsubr_index);
    out[3] = cff_offset_size(out.len());
    Ok(out)
}

/// Type 2 subroutine bias for an index of `count` entries.
fn subr_bias(count: u32) -> i32 {
    if count < 1240 {
        107
    } else if count < 33900 {
        1131
    } else {
        32768
    }
}

fn subr_body<'a>(index: Option<&Index1<'a>>, number: i32, count: u32) -> Option<&'a [u8]> {
    if number < 0 || number as u32 >= count {
        return None;
    }
    index?.get(number as usize).ok()
}

/// Encoded length of a single-element INDEX wrapping `body_len` bytes.
fn single_index_len(body_len: usize) -> usize {
    2 + 1 + 2 * cff_offset_size(body_len + 1) as usize + body_len
}

/// Charset format 0: SIDs 1..n-1 for every glyph after `.notdef`.
fn build_charset(num_glyphs: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + (num_glyphs as usize - 1) * 2);
    out.push(0);
    for sid in 1..num_glyphs {
        out.extend_from_slice(&sid.to_be_bytes());
    }
    out
}

fn build_top_dict(
    charset_offset: usize,
    charstrings_offset: usize,
    private_size: usize,
    private_offset: usize,
) -> Vec<u8> {
    let mut out = Vec::new();
    push_dict_int(&mut out, charset_offset as i32);
    push_dict_op(&mut out, OP_CHARSET);
    push_dict_int(&mut out, charstrings_offset as i32);
    push_dict_op(&mut out, OP_CHAR_STRINGS);
    push_dict_int(&mut out, private_size as i32);
    push_dict_int(&mut out, private_offset as i32);
    push_dict_op(&mut out, OP_PRIVATE);
    out
}

/// The integer-valued Private DICT fields that survive the rewrite.
/// Real-valued fields (BlueScale and friends) fall back to their CFF
/// defaults.
#[derive(Debug, Default)]
struct PrivateValues {
    blue_values: Vec<i32>,
    other_blues: Vec<i32>,
    family_blues: Vec<i32>,
    family_other_blues: Vec<i32>,
    std_hw: Option<i32>,
    std_vw: Option<i32>,
    stem_snap_h: Vec<i32>,
    stem_snap_v: Vec<i32>,
    blue_shift: Option<i32>,
    blue_fuzz: Option<i32>,
    language_group: Option<i32>,
    force_bold: Option<bool>,
    default_width_x: Option<i32>,
    nominal_width_x: Option<i32>,
    subrs_offset: Option<usize>,
}

fn parse_private_dict(data: &[u8]) -> PrivateValues {
    let round = |f: font_types::Fixed| f.to_f64().round() as i32;
    let mut values = PrivateValues::default();
    for entry in dict::entries(data, None).flatten() {
        match entry {
            Entry::BlueValues(blues) => {
                values.blue_values = blues
                    .values()
                    .iter()
                    .flat_map(|(a, b)| [round(*a), round(*b)])
                    .collect();
            }
            Entry::OtherBlues(blues) => {
                values.other_blues = blues
                    .values()
                    .iter()
                    .flat_map(|(a, b)| [round(*a), round(*b)])
                    .collect();
            }
            Entry::FamilyBlues(blues) => {
                values.family_blues = blues
                    .values()
                    .iter()
                    .flat_map(|(a, b)| [round(*a), round(*b)])
                    .collect();
            }
            Entry::FamilyOtherBlues(blues) => {
                values.family_other_blues = blues
                    .values()
                    .iter()
                    .flat_map(|(a, b)| [round(*a), round(*b)])
                    .collect();
            }
            Entry::StdHw(v) => values.std_hw = Some(round(v)),
            Entry::StdVw(v) => values.std_vw = Some(round(v)),
            Entry::StemSnapH(snaps) => {
                values.stem_snap_h = snaps.values().iter().map(|v| round(*v)).collect();
            }
            Entry::StemSnapV(snaps) => {
                values.stem_snap_v = snaps.values().iter().map(|v| round(*v)).collect();
            }
            Entry::BlueShift(v) => values.blue_shift = Some(round(v)),
            Entry::BlueFuzz(v) => values.blue_fuzz = Some(round(v)),
            Entry::LanguageGroup(v) => values.language_group = Some(v),
            Entry::ForceBold(v) => values.force_bold = Some(v),
            Entry::DefaultWidthX(v) => values.default_width_x = Some(round(v)),
            Entry::NominalWidthX(v) => values.nominal_width_x = Some(round(v)),
            Entry::SubrsOffset(offset) => values.subrs_offset = Some(offset),
            _ => {}
        }
    }
    values
}

/// Emit the Private DICT. The Subrs operand is the dict's own length (the
/// local subr index follows immediately), so iterate until the encoding
/// reproduces it.
fn build_private_dict_stable(values: &PrivateValues, with_subrs: bool) -> Vec<u8> {
    if !with_subrs {
        return build_private_dict(values, None);
    }
    let mut estimate = 0usize;
    loop {
        let body = build_private_dict(values, Some(estimate));
        if body.len() == estimate {
            return body;
        }
        estimate = body.len();
    }
}

fn build_private_dict(values: &PrivateValues, subrs_offset: Option<usize>) -> Vec<u8> {
    let mut out = Vec::new();
    push_delta_array(&mut out, &values.blue_values, OP_BLUE_VALUES);
    push_delta_array(&mut out, &values.other_blues, OP_OTHER_BLUES);
    push_delta_array(&mut out, &values.family_blues, OP_FAMILY_BLUES);
    push_delta_array(&mut out, &values.family_other_blues, OP_FAMILY_OTHER_BLUES);
    if let Some(v) = values.blue_shift {
        push_dict_int(&mut out, v);
        push_dict_op(&mut out, OP_BLUE_SHIFT);
    }
    if let Some(v) = values.blue_fuzz {
        push_dict_int(&mut out, v);
        push_dict_op(&mut out, OP_BLUE_FUZZ);
    }
    if let Some(v) = values.std_hw {
        push_dict_int(&mut out, v);
        push_dict_op(&mut out, OP_STD_HW);
    }
    if let Some(v) = values.std_vw {
        push_dict_int(&mut out, v);
        push_dict_op(&mut out, OP_STD_VW);
    }
    push_delta_array(&mut out, &values.stem_snap_h, OP_STEM_SNAP_H);
    push_delta_array(&mut out, &values.stem_snap_v, OP_STEM_SNAP_V);
    if let Some(v) = values.force_bold {
        push_dict_int(&mut out, v as i32);
        push_dict_op(&mut out, OP_FORCE_BOLD);
    }
    if let Some(v) = values.language_group {
        push_dict_int(&mut out, v);
        push_dict_op(&mut out, OP_LANGUAGE_GROUP);
    }
    if let Some(v) = values.default_width_x {
        push_dict_int(&mut out, v);
        push_dict_op(&mut out, OP_DEFAULT_WIDTH_X);
    }
    if let Some(v) = values.nominal_width_x {
        push_dict_int(&mut out, v);
        push_dict_op(&mut out, OP_NOMINAL_WIDTH_X);
    }
    if let Some(offset) = subrs_offset {
        push_dict_int(&mut out, offset as i32);
        push_dict_op(&mut out, OP_SUBRS);
    }
    out
}

fn push_delta_array(out: &mut Vec<u8>, values: &[i32], op: u16) {
    if values.is_empty() {
        return;
    }
    let mut prev = 0;
    for &v in values {
        push_dict_int(out, v - prev);
        prev = v;
    }
    push_dict_op(out, op);
}

struct CallRemap<'a> {
    old_local_bias: i32,
    new_local_bias: i32,
    old_global_bias: i32,
    new_global_bias: i32,
    local_map: &'a BTreeMap<i32, i32>,
    global_map: &'a BTreeMap<i32, i32>,
}

/// Walk a Type 2 charstring, collecting the subroutine numbers reached by
/// `callsubr`/`callgsubr`. Stem counting mirrors the interpreter so
/// hintmask operand bytes are stepped over, not decoded.
fn scan_charstring(
    data: &[u8],
    local_bias: i32,
    global_bias: i32,
    locals: &mut BTreeSet<i32>,
    globals: &mut BTreeSet<i32>,
) {
    let mut walker = Walker::new(data);
    while let Some(token) = walker.peek() {
        match &token {
            Token::Operator(op) if *op == CALLSUBR => {
                if let Some(v) = walker.last_int {
                    locals.insert(v + local_bias);
                }
            }
            Token::Operator(op) if *op == CALLGSUBR => {
                if let Some(v) = walker.last_int {
                    globals.insert(v + global_bias);
                }
            }
            _ => {}
        }
        walker.consume(&token);
    }
}

/// Re-encode every `callsubr`/`callgsubr` operand from the old numbering
/// and bias to the new ones. Everything else is copied verbatim.
fn rewrite_charstring(data: &[u8], remap: &CallRemap) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut last_int_at: Option<(usize, i32)> = None;
    let mut walker = Walker::new(data);
    while let Some(token) = walker.peek() {
        match &token {
            Token::Int { value, span } => {
                last_int_at = Some((out.len(), *value));
                out.extend_from_slice(&data[span.clone()]);
            }
            Token::Operator(op) if *op == CALLSUBR || *op == CALLGSUBR => {
                let (old_bias, new_bias, map) = if *op == CALLSUBR {
                    (remap.old_local_bias, remap.new_local_bias, remap.local_map)
                } else {
                    (
                        remap.old_global_bias,
                        remap.new_global_bias,
                        remap.global_map,
                    )
                };
                if let Some((at, value)) = last_int_at
                    && let Some(&new_index) = map.get(&(value + old_bias))
                {
                    out.truncate(at);
                    push_charstring_int(&mut out, new_index - new_bias);
                }
                out.push(*op);
                last_int_at = None;
            }
            Token::Bytes(span) => {
                out.extend_from_slice(&data[span.clone()]);
                last_int_at = None;
            }
            Token::Operator(op) => {
                out.push(*op);
                last_int_at = None;
            }
            Token::Escaped(b) => {
                out.push(ESCAPE);
                out.push(*b);
                last_int_at = None;
            }
        }
        walker.consume(&token);
    }
    out
}

/// One lexical element of a charstring.
#[derive(Clone, Debug)]
enum Token {
    /// An integer operand and the byte range that encoded it.
    Int { value: i32, span: Range<usize> },
    /// Bytes copied through untouched: 16.16 operands and hintmask
    /// operands (the operator byte itself is part of the span for masks).
    Bytes(Range<usize>),
    /// A one-byte operator.
    Operator(u8),
    /// A two-byte escaped operator.
    Escaped(u8),
}

/// Charstring tokenizer with the interpreter state needed for safe
/// skipping: operand-stack depth and accumulated stem count.
struct Walker<'a> {
    data: &'a [u8],
    pos: usize,
    stack_depth: usize,
    nstems: usize,
    last_int: Option<i32>,
}

impl<'a> Walker<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, stack_depth: 0, nstems: 0, last_int: None }
    }

    fn peek(&mut self) -> Option<Token> {
        let b = *self.data.get(self.pos)?;
        let token = match b {
            32..=246 => Token::Int {
                value: b as i32 - 139,
                span: self.pos..self.pos + 1,
            },
            247..=250 => {
                let b1 = *self.data.get(self.pos + 1)?;
                Token::Int {
                    value: (b as i32 - 247) * 256 + b1 as i32 + 108,
                    span: self.pos..self.pos + 2,
                }
            }
            251..=254 => {
                let b1 = *self.data.get(self.pos + 1)?;
                Token::Int {
                    value: -((b as i32 - 251) * 256) - b1 as i32 - 108,
                    span: self.pos..self.pos + 2,
                }
            }
            28 => {
                let bytes = self.data.get(self.pos + 1..self.pos + 3)?;
                Token::Int {
                    value: i16::from_be_bytes([bytes[0], bytes[1]]) as i32,
                    span: self.pos..self.pos + 3,
                }
            }
            255 => {
                self.data.get(self.pos + 4)?;
                Token::Bytes(self.pos..self.pos + 5)
            }
            HINTMASK | CNTRMASK => {
                // The operand bytes depend on the stems accumulated so
                // far, including the implicit vstems on the stack.
                let stems = self.nstems + self.stack_depth / 2;
                let mask_len = stems.div_ceil(8);
                let end = self.pos + 1 + mask_len;
                if end > self.data.len() {
                    return None;
                }
                Token::Bytes(self.pos..end)
            }
            ESCAPE => Token::Escaped(*self.data.get(self.pos + 1)?),
            _ => Token::Operator(b),
        };
        Some(token)
    }

    /// Advance past `token`, updating the interpreter state.
    fn consume(&mut self, token: &Token) {
        match token {
            Token::Int { value, span } => {
                self.stack_depth += 1;
                self.last_int = Some(*value);
                self.pos = span.end;
            }
            Token::Bytes(span) => {
                let b = self.data[span.start];
                if b == 255 {
                    self.stack_depth += 1;
                } else {
                    // hintmask / cntrmask
                    self.nstems += self.stack_depth / 2;
                    self.stack_depth = 0;
                }
                self.last_int = None;
                self.pos = span.end;
            }
            Token::Operator(op) => {
                match *op {
                    // hstem, vstem, hstemhm, vstemhm
                    1 | 3 | 18 | 23 => {
                        self.nstems += self.stack_depth / 2;
                        self.stack_depth = 0;
                    }
                    CALLSUBR | CALLGSUBR => {
                        self.stack_depth = self.stack_depth.saturating_sub(1);
                    }
                    _ => self.stack_depth = 0,
                }
                self.last_int = None;
                self.pos += 1;
            }
            Token::Escaped(_) => {
                self.stack_depth = 0;
                self.last_int = None;
                self.pos += 2;
            }
        }
    }
}
