//! In-memory views over box trees.
//!
//! These helpers work on a fully buffered byte range and are meant for
//! inspecting small files or rewritten output, not for the streaming path.

use bytes::Bytes;

use crate::{BoxType, COMPACT_HEADER_SIZE, ContainerLayout};

/// Parsed view over a single ISOBMFF box inside a parent byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxView {
    pub start: usize,
    pub end: usize,
    pub size: usize,
    pub header_size: usize,
    pub fourcc: [u8; 4],
    pub body_start: usize,
    pub body_end: usize,
}

impl BoxView {
    pub fn box_type(&self) -> BoxType {
        BoxType(self.fourcc)
    }
}

/// Read a box header: returns `(total_box_size, fourcc, header_size)`.
///
/// Handles 32-bit size, 64-bit extended size (`size == 1`),
/// box-extends-to-EOF (`size == 0`) and the `uuid` extended type.
pub fn read_box_header(data: &[u8]) -> Option<(usize, [u8; 4], usize)> {
    if data.len() < 8 {
        return None;
    }

    let size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as u64;
    let fourcc: [u8; 4] = [data[4], data[5], data[6], data[7]];
    let usertype = if &fourcc == b"uuid" { 16 } else { 0 };

    if size == 1 {
        if data.len() < 16 {
            return None;
        }
        let ext_size = u64::from_be_bytes([
            data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
        ]);
        Some((ext_size as usize, fourcc, 16 + usertype))
    } else if size == 0 {
        Some((data.len(), fourcc, 8 + usertype))
    } else {
        Some((size as usize, fourcc, 8 + usertype))
    }
}

/// Parse a single box located at `offset` within `[0..end)`.
pub fn box_at(data: &Bytes, offset: usize, end: usize) -> Option<BoxView> {
    if offset >= end {
        return None;
    }

    let remaining = &data[offset..end];
    let (size, fourcc, header_size) = read_box_header(remaining)?;

    if size < header_size || offset + size > end {
        return None;
    }

    let body_start = offset + header_size;
    let body_end = offset + size;
    Some(BoxView {
        start: offset,
        end: offset + size,
        size,
        header_size,
        fourcc,
        body_start,
        body_end,
    })
}

/// Find the first child box with the given FourCC inside `[start..end)`.
pub fn find_first_box(data: &Bytes, start: usize, end: usize, target: [u8; 4]) -> Option<BoxView> {
    let mut offset = start;
    while offset < end {
        let parsed = box_at(data, offset, end)?;
        if parsed.fourcc == target {
            return Some(parsed);
        }

        offset = parsed.end;
    }

    None
}

/// Returns the byte range holding the child boxes of a container box laid
/// out as `layout`.
fn children_range(
    data: &Bytes,
    parsed: &BoxView,
    layout: ContainerLayout,
) -> Option<(usize, usize)> {
    let base = layout.base_prefix_len();
    if parsed.body_start + base > parsed.body_end {
        return None;
    }

    let prefix = &data[parsed.body_start..parsed.body_start + base];
    let extra = layout.extra_prefix_len(parsed.box_type(), prefix).ok()?;
    let children_start = parsed.body_start + base + extra;
    (children_start <= parsed.body_end).then_some((children_start, parsed.body_end))
}

/// Walks every box in `[start..end)` depth-first, descending into known
/// containers, and calls `f` with each box and its nesting depth.
///
/// Inside a container, a tail too short for a box header (such as the
/// 4-byte zero terminator of QuickTime atoms) is skipped.
///
/// Returns `false` if some range could not be tiled exactly by boxes.
pub fn visit_boxes<F: FnMut(&BoxView, usize)>(
    data: &Bytes,
    start: usize,
    end: usize,
    f: &mut F,
) -> bool {
    visit_children(data, start, end, None, 0, f)
}

fn visit_children<F: FnMut(&BoxView, usize)>(
    data: &Bytes,
    start: usize,
    end: usize,
    parent: Option<BoxType>,
    depth: usize,
    f: &mut F,
) -> bool {
    let mut offset = start;
    while offset < end {
        if parent.is_some() && end - offset < COMPACT_HEADER_SIZE as usize {
            return true;
        }
        let Some(parsed) = box_at(data, offset, end) else {
            return false;
        };
        f(&parsed, depth);

        if let Some(layout) = ContainerLayout::of(parsed.box_type(), parent) {
            let Some((children_start, children_end)) = children_range(data, &parsed, layout)
            else {
                return false;
            };
            if !visit_children(
                data,
                children_start,
                children_end,
                Some(parsed.box_type()),
                depth + 1,
                f,
            ) {
                return false;
            }
        }

        offset = parsed.end;
    }

    offset == end
}
