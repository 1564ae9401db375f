//! `esds` box and the ISO/IEC 14496-1 descriptor tree it carries.
//!
//! Descriptors are kept as a tree of tagged records. Only the two descriptor
//! kinds that nest other descriptors (`ES_Descriptor` and
//! `DecoderConfigDescriptor`) are split into fixed fields and children; every
//! other descriptor is an opaque leaf. Sizes are recomputed on encode, so a
//! leaf whose payload changes length keeps all enclosing sizes consistent.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Mp4Error, Result};

/// ES_DescrTag
pub const ES_DESCRIPTOR_TAG: u8 = 0x03;
/// DecoderConfigDescrTag
pub const DECODER_CONFIG_DESCRIPTOR_TAG: u8 = 0x04;
/// DecSpecificInfoTag
pub const DECODER_SPECIFIC_INFO_TAG: u8 = 0x05;
/// SLConfigDescrTag
pub const SL_CONFIG_DESCRIPTOR_TAG: u8 = 0x06;

/// objectTypeIndication (1) + streamType/upStream (1) + bufferSizeDB (3) +
/// maxBitrate (4) + avgBitrate (4)
const DECODER_CONFIG_FIELDS: usize = 13;

/// Size fields are at most four 7-bit groups.
const MAX_SIZE_FIELD_LEN: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorBody {
    Leaf(Bytes),
    Nested {
        fields: Bytes,
        children: Vec<Descriptor>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub tag: u8,
    /// Width of the expandable size field in the source (1–4 bytes).
    ///
    /// Writers commonly pad sizes to four bytes; keeping the width makes an
    /// untouched descriptor re-encode to the exact same bytes.
    pub size_field_len: u8,
    pub body: DescriptorBody,
}

impl Descriptor {
    /// Creates a leaf descriptor with a minimal size field.
    pub fn leaf(tag: u8, data: impl Into<Bytes>) -> Self {
        Self {
            tag,
            size_field_len: 1,
            body: DescriptorBody::Leaf(data.into()),
        }
    }

    /// Leaf payload, `None` for nested descriptors.
    pub fn data(&self) -> Option<&Bytes> {
        match &self.body {
            DescriptorBody::Leaf(data) => Some(data),
            DescriptorBody::Nested { .. } => None,
        }
    }

    /// Replaces the payload of a leaf descriptor.
    ///
    /// The declared size follows the new payload on the next encode.
    pub fn set_data(&mut self, data: impl Into<Bytes>) -> Result<()> {
        match &mut self.body {
            DescriptorBody::Leaf(current) => {
                *current = data.into();
                Ok(())
            }
            DescriptorBody::Nested { .. } => Err(Mp4Error::InvalidDescriptor(format!(
                "descriptor tag {:#04x} nests other descriptors and has no raw payload",
                self.tag
            ))),
        }
    }

    pub fn children(&self) -> &[Descriptor] {
        match &self.body {
            DescriptorBody::Leaf(_) => &[],
            DescriptorBody::Nested { children, .. } => children,
        }
    }

    /// Declared size: the payload length, excluding tag and size field.
    pub fn payload_len(&self) -> usize {
        match &self.body {
            DescriptorBody::Leaf(data) => data.len(),
            DescriptorBody::Nested { fields, children } => {
                fields.len() + children.iter().map(Descriptor::encoded_len).sum::<usize>()
            }
        }
    }

    pub fn encoded_len(&self) -> usize {
        let payload_len = self.payload_len();
        1 + self.size_field_width(payload_len) as usize + payload_len
    }

    fn size_field_width(&self, payload_len: usize) -> u8 {
        minimal_size_field_len(payload_len).max(self.size_field_len)
    }

    /// Visits this descriptor and all of its descendants depth-first.
    pub fn visit_mut<F: FnMut(&mut Descriptor)>(&mut self, f: &mut F) {
        f(self);
        if let DescriptorBody::Nested { children, .. } = &mut self.body {
            for child in children {
                child.visit_mut(f);
            }
        }
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        if buf.is_empty() {
            return Err(Mp4Error::InvalidDescriptor(
                "missing descriptor tag".to_string(),
            ));
        }
        let tag = buf[0];
        let mut pos = 1;

        let mut size = 0usize;
        let mut size_field_len = 0u8;
        loop {
            let Some(&b) = buf.get(pos) else {
                return Err(Mp4Error::InvalidDescriptor(format!(
                    "truncated size field of descriptor tag {tag:#04x}"
                )));
            };
            pos += 1;
            size_field_len += 1;
            size = (size << 7) | (b & 0x7F) as usize;

            if b & 0x80 == 0 {
                break;
            }
            if size_field_len == MAX_SIZE_FIELD_LEN {
                return Err(Mp4Error::InvalidDescriptor(format!(
                    "size field of descriptor tag {tag:#04x} is longer than 4 bytes"
                )));
            }
        }

        if buf.len() - pos < size {
            return Err(Mp4Error::InvalidDescriptor(format!(
                "descriptor tag {tag:#04x} declares {size} bytes, only {} available",
                buf.len() - pos
            )));
        }

        buf.advance(pos);
        let mut payload = buf.split_to(size);

        let body = match nested_fields_len(tag, &payload)? {
            Some(fields_len) => {
                let fields = payload.split_to(fields_len);
                let mut children = Vec::new();
                while !payload.is_empty() {
                    children.push(Descriptor::decode(&mut payload)?);
                }
                DescriptorBody::Nested { fields, children }
            }
            None => DescriptorBody::Leaf(payload),
        };

        Ok(Self {
            tag,
            size_field_len,
            body,
        })
    }

    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        let payload_len = self.payload_len();
        let width = self.size_field_width(payload_len);
        if width > MAX_SIZE_FIELD_LEN {
            return Err(Mp4Error::InvalidDescriptor(format!(
                "descriptor tag {:#04x} payload of {payload_len} bytes does not fit a size field",
                self.tag
            )));
        }

        out.put_u8(self.tag);
        for i in (0..width).rev() {
            let mut b = ((payload_len >> (7 * i as usize)) & 0x7F) as u8;
            if i > 0 {
                b |= 0x80;
            }
            out.put_u8(b);
        }

        match &self.body {
            DescriptorBody::Leaf(data) => out.put_slice(data),
            DescriptorBody::Nested { fields, children } => {
                out.put_slice(fields);
                for child in children {
                    child.encode(out)?;
                }
            }
        }
        Ok(())
    }
}

fn minimal_size_field_len(size: usize) -> u8 {
    let mut len = 1;
    let mut rest = size >> 7;
    while rest != 0 {
        len += 1;
        rest >>= 7;
    }
    len
}

/// Length of the fixed fields that precede nested descriptors, for the tags
/// that nest.
fn nested_fields_len(tag: u8, payload: &[u8]) -> Result<Option<usize>> {
    let truncated = || {
        Mp4Error::InvalidDescriptor(format!(
            "descriptor tag {tag:#04x} is too short for its fixed fields"
        ))
    };

    match tag {
        ES_DESCRIPTOR_TAG => {
            // ES_ID (2) + flags/streamPriority (1)
            let flags = *payload.get(2).ok_or_else(truncated)?;
            let mut len = 3;
            if flags & 0x80 != 0 {
                len += 2; // dependsOn_ES_ID
            }
            if flags & 0x40 != 0 {
                let url_len = *payload.get(len).ok_or_else(truncated)? as usize;
                len += 1 + url_len;
            }
            if flags & 0x20 != 0 {
                len += 2; // OCR_ES_Id
            }
            if len > payload.len() {
                return Err(truncated());
            }
            Ok(Some(len))
        }
        DECODER_CONFIG_DESCRIPTOR_TAG => {
            if payload.len() < DECODER_CONFIG_FIELDS {
                return Err(truncated());
            }
            Ok(Some(DECODER_CONFIG_FIELDS))
        }
        _ => Ok(None),
    }
}

/// Decoded `esds` payload: FullBox version/flags plus the descriptor list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsdsBox {
    pub version: u8,
    pub flags: u32,
    pub descriptors: Vec<Descriptor>,
}

impl EsdsBox {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 4 {
            return Err(Mp4Error::InvalidDescriptor(
                "esds payload shorter than its FullBox header".to_string(),
            ));
        }

        let version_and_flags = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let mut rest = Bytes::copy_from_slice(&payload[4..]);
        let mut descriptors = Vec::new();
        while !rest.is_empty() {
            descriptors.push(Descriptor::decode(&mut rest)?);
        }

        Ok(Self {
            version: (version_and_flags >> 24) as u8,
            flags: version_and_flags & 0x00FF_FFFF,
            descriptors,
        })
    }

    pub fn encoded_len(&self) -> usize {
        4 + self
            .descriptors
            .iter()
            .map(Descriptor::encoded_len)
            .sum::<usize>()
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        out.put_u32(((self.version as u32) << 24) | (self.flags & 0x00FF_FFFF));
        for descriptor in &self.descriptors {
            descriptor.encode(&mut out)?;
        }
        Ok(out.freeze())
    }

    /// Visits every descriptor in the tree, parents before children.
    pub fn visit_descriptors_mut<F: FnMut(&mut Descriptor)>(&mut self, mut f: F) {
        for descriptor in &mut self.descriptors {
            descriptor.visit_mut(&mut f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::make_esds_payload;

    fn decoder_specific_info(esds: &EsdsBox) -> &Descriptor {
        &esds.descriptors[0].children()[0].children()[0]
    }

    #[test]
    fn test_decode_tree_shape() {
        let payload = make_esds_payload(&[0x12, 0x10], 1);
        let esds = EsdsBox::decode(&payload).unwrap();

        assert_eq!(esds.descriptors.len(), 1);
        let es = &esds.descriptors[0];
        assert_eq!(es.tag, ES_DESCRIPTOR_TAG);
        assert_eq!(es.children().len(), 2);
        assert_eq!(es.children()[0].tag, DECODER_CONFIG_DESCRIPTOR_TAG);
        assert_eq!(es.children()[1].tag, SL_CONFIG_DESCRIPTOR_TAG);

        let dsi = decoder_specific_info(&esds);
        assert_eq!(dsi.tag, DECODER_SPECIFIC_INFO_TAG);
        assert_eq!(dsi.data().unwrap().as_ref(), &[0x12, 0x10]);
    }

    #[test]
    fn test_round_trip_preserves_padded_size_fields() {
        for size_field_len in [1, 4] {
            let payload = make_esds_payload(&[0x12, 0x10], size_field_len);
            let esds = EsdsBox::decode(&payload).unwrap();
            assert_eq!(esds.encoded_len(), payload.len());
            assert_eq!(&esds.encode().unwrap()[..], &payload[..]);
        }
    }

    #[test]
    fn test_growing_leaf_updates_parent_sizes() {
        let payload = make_esds_payload(&[0x12, 0x10], 1);
        let mut esds = EsdsBox::decode(&payload).unwrap();
        esds.visit_descriptors_mut(|d| {
            if d.tag == DECODER_SPECIFIC_INFO_TAG {
                d.set_data(vec![0x2A, 0x12, 0x08, 0x00]).unwrap();
            }
        });

        let encoded = esds.encode().unwrap();
        assert_eq!(encoded.len(), payload.len() + 2);

        let reparsed = EsdsBox::decode(&encoded).unwrap();
        let es = &reparsed.descriptors[0];
        assert_eq!(es.payload_len() + 2, es.encoded_len());
        assert_eq!(
            decoder_specific_info(&reparsed).data().unwrap().as_ref(),
            &[0x2A, 0x12, 0x08, 0x00]
        );
        // ES_Descriptor size byte sits right after the tag.
        assert_eq!(encoded[5] as usize, es.payload_len());
    }

    #[test]
    fn test_es_descriptor_optional_fields() {
        // ES_ID, flags with dependsOn + URL(2) + OCR, then one leaf
        let mut es_payload = vec![0x00, 0x01, 0xE0, 0x00, 0x02, 0x02, b'a', b'b', 0x00, 0x03];
        es_payload.extend_from_slice(&[SL_CONFIG_DESCRIPTOR_TAG, 0x01, 0x02]);
        let mut payload = vec![0, 0, 0, 0, ES_DESCRIPTOR_TAG, es_payload.len() as u8];
        payload.extend_from_slice(&es_payload);

        let esds = EsdsBox::decode(&payload).unwrap();
        match &esds.descriptors[0].body {
            DescriptorBody::Nested { fields, children } => {
                assert_eq!(fields.len(), 10);
                assert_eq!(children.len(), 1);
                assert_eq!(children[0].tag, SL_CONFIG_DESCRIPTOR_TAG);
            }
            DescriptorBody::Leaf(_) => panic!("ES_Descriptor must nest"),
        }
        assert_eq!(&esds.encode().unwrap()[..], &payload[..]);
    }

    #[test]
    fn test_decode_rejects_overlong_size() {
        let payload = [0, 0, 0, 0, DECODER_SPECIFIC_INFO_TAG, 0x05, 0x12];
        let err = EsdsBox::decode(&payload).unwrap_err();
        assert!(matches!(err, Mp4Error::InvalidDescriptor(_)));
    }

    #[test]
    fn test_decode_rejects_five_byte_size_field() {
        let payload = [0, 0, 0, 0, 0x05, 0x80, 0x80, 0x80, 0x80, 0x01];
        let err = EsdsBox::decode(&payload).unwrap_err();
        assert!(matches!(err, Mp4Error::InvalidDescriptor(_)));
    }

    #[test]
    fn test_set_data_on_nested_fails() {
        let payload = make_esds_payload(&[0x12, 0x10], 1);
        let mut esds = EsdsBox::decode(&payload).unwrap();
        assert!(esds.descriptors[0].set_data(vec![1]).is_err());
    }

    #[test]
    fn test_size_field_widens_when_needed() {
        let mut descriptor = Descriptor::leaf(DECODER_SPECIFIC_INFO_TAG, vec![0u8; 200]);
        assert_eq!(descriptor.encoded_len(), 1 + 2 + 200);
        descriptor.size_field_len = 4;
        assert_eq!(descriptor.encoded_len(), 1 + 4 + 200);
    }
}
