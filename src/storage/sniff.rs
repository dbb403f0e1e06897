//! Content-type detection from leading bytes.
//!
//! Follows the WHATWG MIME sniffing algorithm for the subset of types this
//! service cares about. The client-declared type is never consulted.

const SNIFF_LEN: usize = 512;

const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// HTML tags recognised at the start of a document (after whitespace),
/// matched case-insensitively and followed by a space or `>`.
const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

struct Exact {
    sig: &'static [u8],
    content_type: &'static str,
}

struct Masked {
    mask: &'static [u8],
    pattern: &'static [u8],
    skip_whitespace: bool,
    content_type: &'static str,
}

const EXACT: &[Exact] = &[
    Exact { sig: b"%PDF-", content_type: "application/pdf" },
    Exact { sig: b"%!PS-Adobe-", content_type: "application/postscript" },
    Exact { sig: b"\x00\x00\x01\x00", content_type: "image/x-icon" },
    Exact { sig: b"\x00\x00\x02\x00", content_type: "image/x-icon" },
    Exact { sig: b"BM", content_type: "image/bmp" },
    Exact { sig: b"GIF87a", content_type: "image/gif" },
    Exact { sig: b"GIF89a", content_type: "image/gif" },
    Exact { sig: b"\x89PNG\x0D\x0A\x1A\x0A", content_type: "image/png" },
    Exact { sig: b"\xFF\xD8\xFF", content_type: "image/jpeg" },
    Exact { sig: b"ID3", content_type: "audio/mpeg" },
    Exact { sig: b"OggS\x00", content_type: "application/ogg" },
    Exact { sig: b"MThd\x00\x00\x00\x06", content_type: "audio/midi" },
    Exact { sig: b"\x1A\x45\xDF\xA3", content_type: "video/webm" },
    Exact { sig: b"\x1F\x8B\x08", content_type: "application/x-gzip" },
    Exact { sig: b"PK\x03\x04", content_type: "application/zip" },
    Exact { sig: b"Rar!\x1A\x07\x00", content_type: "application/x-rar-compressed" },
    Exact { sig: b"Rar!\x1A\x07\x01\x00", content_type: "application/x-rar-compressed" },
    Exact { sig: b"\x00\x61\x73\x6D", content_type: "application/wasm" },
];

const MASKED: &[Masked] = &[
    Masked {
        mask: b"\xFF\xFF\xFF\xFF\xFF",
        pattern: b"<?xml",
        skip_whitespace: true,
        content_type: "text/xml; charset=utf-8",
    },
    Masked {
        mask: b"\xFF\xFF",
        pattern: b"\xFE\xFF",
        skip_whitespace: false,
        content_type: "text/plain; charset=utf-16be",
    },
    Masked {
        mask: b"\xFF\xFF",
        pattern: b"\xFF\xFE",
        skip_whitespace: false,
        content_type: "text/plain; charset=utf-16le",
    },
    Masked {
        mask: b"\xFF\xFF\xFF",
        pattern: b"\xEF\xBB\xBF",
        skip_whitespace: false,
        content_type: TEXT_PLAIN,
    },
    Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00WEBPVP",
        skip_whitespace: false,
        content_type: "image/webp",
    },
    Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"FORM\x00\x00\x00\x00AIFF",
        skip_whitespace: false,
        content_type: "audio/aiff",
    },
    Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00AVI ",
        skip_whitespace: false,
        content_type: "video/avi",
    },
    Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00WAVE",
        skip_whitespace: false,
        content_type: "audio/wave",
    },
];

/// Detect the MIME type of `data` from at most its first 512 bytes.
///
/// Always returns a valid type; `application/octet-stream` when nothing
/// matches and the content looks binary.
pub fn detect_content_type(data: &[u8]) -> String {
    let data = &data[..data.len().min(SNIFF_LEN)];
    let trimmed = skip_whitespace(data);

    if HTML_TAGS.iter().any(|tag| matches_html_tag(trimmed, tag)) {
        return "text/html; charset=utf-8".to_string();
    }

    for sig in MASKED {
        let input = if sig.skip_whitespace { trimmed } else { data };
        if matches_masked(input, sig.mask, sig.pattern) {
            return sig.content_type.to_string();
        }
    }

    if let Some(sig) = EXACT.iter().find(|sig| data.starts_with(sig.sig)) {
        return sig.content_type.to_string();
    }

    if is_mp4(data) {
        return "video/mp4".to_string();
    }

    if data.iter().any(|&b| is_binary_byte(b)) {
        OCTET_STREAM.to_string()
    } else {
        TEXT_PLAIN.to_string()
    }
}

fn skip_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

fn matches_html_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() < tag.len() + 1 {
        return false;
    }
    let head_matches = data
        .iter()
        .zip(tag)
        .all(|(d, t)| d.to_ascii_uppercase() == *t);
    head_matches && matches!(data[tag.len()], b' ' | b'>')
}

fn matches_masked(data: &[u8], mask: &[u8], pattern: &[u8]) -> bool {
    data.len() >= pattern.len()
        && data
            .iter()
            .zip(mask.iter().zip(pattern))
            .all(|(d, (m, p))| d & m == *p)
}

/// ISO base media file with an `mp4` brand in its `ftyp` box.
fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if box_size % 4 != 0 || data.len() < box_size || box_size < 12 {
        return false;
    }
    if &data[4..8] != b"ftyp" {
        return false;
    }
    (8..box_size)
        .step_by(4)
        // bytes 12..16 hold the minor version, not a brand
        .filter(|&offset| offset != 12)
        .any(|offset| offset + 3 <= box_size && &data[offset..offset + 3] == b"mp4")
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    #[test]
    fn test_detects_common_binary_formats() {
        assert_eq!(detect_content_type(PNG_HEADER), "image/png");
        assert_eq!(detect_content_type(b"\xFF\xD8\xFF\xE0\x00\x10JFIF"), "image/jpeg");
        assert_eq!(detect_content_type(b"GIF89a\x01\x00"), "image/gif");
        assert_eq!(detect_content_type(b"%PDF-1.7\n"), "application/pdf");
        assert_eq!(detect_content_type(b"PK\x03\x04\x14\x00"), "application/zip");
        assert_eq!(
            detect_content_type(b"RIFF\x24\x00\x00\x00WEBPVP8 "),
            "image/webp"
        );
    }

    #[test]
    fn test_detects_text_and_markup() {
        assert_eq!(detect_content_type(b"hello world"), TEXT_PLAIN);
        assert_eq!(
            detect_content_type(b"  <html><body></body></html>"),
            "text/html; charset=utf-8"
        );
        assert_eq!(
            detect_content_type(b"<?xml version=\"1.0\"?><a/>"),
            "text/xml; charset=utf-8"
        );
    }

    #[test]
    fn test_html_tag_needs_terminator() {
        assert_eq!(detect_content_type(b"<Bogus"), TEXT_PLAIN);
        assert_eq!(detect_content_type(b"<b>bold</b>"), "text/html; charset=utf-8");
    }

    #[test]
    fn test_detects_mp4() {
        let mut data = vec![0x00, 0x00, 0x00, 0x18];
        data.extend_from_slice(b"ftypmp42");
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        data.extend_from_slice(b"mp42isom");
        assert_eq!(detect_content_type(&data), "video/mp4");
    }

    #[test]
    fn test_binary_fallback() {
        assert_eq!(detect_content_type(&[0x00, 0x01, 0x02, 0x03]), OCTET_STREAM);
        assert_eq!(detect_content_type(b""), TEXT_PLAIN);
    }

    #[test]
    fn test_only_leading_bytes_are_inspected() {
        let mut data = vec![b'a'; SNIFF_LEN];
        data.push(0x00);
        assert_eq!(detect_content_type(&data), TEXT_PLAIN);
    }
}
