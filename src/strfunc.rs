//! String transform functions for data declarations (`__utf16__` and
//! friends): re-encode a UTF-8 string literal into another encoding.

/// The transform functions usable in DB-family operand lists.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StrFunc {
    Utf16,
    Utf16Le,
    Utf16Be,
    Utf32,
    Utf32Le,
    Utf32Be,
}

impl StrFunc {
    pub fn from_name(name: &str) -> Option<StrFunc> {
        Some(match name.to_ascii_lowercase().as_str() {
            "__utf16__" => StrFunc::Utf16,
            "__utf16le__" => StrFunc::Utf16Le,
            "__utf16be__" => StrFunc::Utf16Be,
            "__utf32__" => StrFunc::Utf32,
            "__utf32le__" => StrFunc::Utf32Le,
            "__utf32be__" => StrFunc::Utf32Be,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            StrFunc::Utf16 => "__utf16__",
            StrFunc::Utf16Le => "__utf16le__",
            StrFunc::Utf16Be => "__utf16be__",
            StrFunc::Utf32 => "__utf32__",
            StrFunc::Utf32Le => "__utf32le__",
            StrFunc::Utf32Be => "__utf32be__",
        }
    }
}

/// Transform `data` (which must be valid UTF-8) into the target encoding.
/// `None` means the input was not transformable.
pub fn string_transform(data: &[u8], func: StrFunc) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(data).ok()?;
    let mut out = Vec::new();
    match func {
        StrFunc::Utf16 | StrFunc::Utf16Le => {
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_le_bytes());
            }
        }
        StrFunc::Utf16Be => {
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_be_bytes());
            }
        }
        StrFunc::Utf32 | StrFunc::Utf32Le => {
            for ch in text.chars() {
                out.extend_from_slice(&(ch as u32).to_le_bytes());
            }
        }
        StrFunc::Utf32Be => {
            for ch in text.chars() {
                out.extend_from_slice(&(ch as u32).to_be_bytes());
            }
        }
    }
    Some(out)
}
