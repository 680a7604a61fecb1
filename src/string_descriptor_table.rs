// Copyright (c) ScaleFS LLC; used with permission
// Licensed under the MIT License

use crate::usb_descriptors::read_u16_le;

/// One fetched string descriptor: which string index it answers, the language
/// it was requested in, and the raw descriptor bytes (including the two-byte
/// {bLength, bDescriptorType} header).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringDescriptorEntry {
    pub descriptor_index: u8,
    pub language_id: u16,
    pub descriptor: Vec<u8>,
}
//
impl StringDescriptorEntry {
    /// Decodes the UTF-16LE payload following the descriptor header. Entry 0
    /// (the language-ID list) is not text; callers should not ask it for text.
    pub fn text(&self) -> String {
        let payload = &self.descriptor[2.min(self.descriptor.len())..];
        let code_units: Vec<u16> =
            payload.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]])).collect();
        String::from_utf16_lossy(&code_units)
    }

    /// Interprets this entry as the supported-language-ID list returned by
    /// string index 0: an array of 16-bit codes following the two-byte header.
    pub fn language_ids(&self) -> Vec<u16> {
        if self.descriptor.len() < 2 {
            return Vec::new();
        }
        let count = (self.descriptor[0] as usize).saturating_sub(2) / 2;
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let offset = 2 + i * 2;
            if offset + 2 > self.descriptor.len() {
                break;
            }
            ids.push(read_u16_le(&self.descriptor, offset));
        }
        ids
    }
}

/// Ordered collection of the string descriptors fetched for one device.
///
/// Entry order reflects discovery order: the language-ID list (index 0) first,
/// then the device descriptor strings, then the configuration and interface
/// strings, each in every supported language. Order matters only for display.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StringDescriptorTable {
    entries: Vec<StringDescriptorEntry>,
}
//
impl StringDescriptorTable {
    pub fn new() -> StringDescriptorTable {
        StringDescriptorTable { entries: Vec::new() }
    }

    pub fn push(&mut self, entry: StringDescriptorEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[StringDescriptorEntry] {
        &self.entries
    }

    /// The language-ID list carried by the head entry (string index 0).
    pub fn supported_language_ids(&self) -> Vec<u16> {
        match self.entries.first() {
            Some(head) => head.language_ids(),
            None => Vec::new(),
        }
    }
}
