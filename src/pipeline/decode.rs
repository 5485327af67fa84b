//! Defensive decoding of dump-tool output

/// Encodings tried, in order, when tool output is not valid UTF-8
pub const FALLBACK_ENCODINGS: &[LegacyEncoding] =
    &[LegacyEncoding::Windows1252, LegacyEncoding::Latin1];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyEncoding {
    Windows1252,
    Latin1,
}

// 0x80..=0x9F in Windows-1252; None marks the five unassigned bytes
const WINDOWS_1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017D}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
];

impl LegacyEncoding {
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            LegacyEncoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
            LegacyEncoding::Windows1252 => bytes
                .iter()
                .map(|&b| match b {
                    0x80..=0x9F => WINDOWS_1252_HIGH[(b - 0x80) as usize],
                    _ => Some(b as char),
                })
                .collect(),
        }
    }
}

/// UTF-8 first, then each of `fallbacks` in order
pub fn decode_with_fallback(bytes: &[u8], fallbacks: &[LegacyEncoding]) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(text.to_string());
    }

    fallbacks.iter().find_map(|encoding| encoding.decode(bytes))
}

/// Decode with the default fallback list
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    decode_with_fallback(bytes, FALLBACK_ENCODINGS)
}
