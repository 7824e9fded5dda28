//! DED byte decoding
//!
//! The DED font has a handful of glyphs outside printable ASCII. Only the
//! star (`0x02`) has a text rendering the display firmware understands;
//! every other non-printable byte is escaped so it stays visible in logs.

/// DED glyph for a selectable field marker
pub const STAR_GLYPH: u8 = 0x02;

/// Text rendering of [`STAR_GLYPH`]
pub const STAR_TEXT: &str = "[*]";

/// Append the rendering of one display byte to `out`
pub fn decode_byte(byte: u8, out: &mut String) {
    match byte {
        0x20..=0x7E => out.push(char::from(byte)),
        0x00 => {}
        STAR_GLYPH => out.push_str(STAR_TEXT),
        other => out.push_str(&format!("\\x{:02x}", other)),
    }
}

/// Decode a raw display line and trim surrounding whitespace
///
/// # Examples
///
/// ```
/// use cockpit_bridge::display::decode::decode_line;
///
/// assert_eq!(decode_line(b"  UHF  242.00\x02 \0\0"), "UHF  242.00[*]");
/// ```
pub fn decode_line(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    for &byte in raw {
        decode_byte(byte, &mut out);
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(byte: u8) -> String {
        let mut out = String::new();
        decode_byte(byte, &mut out);
        out
    }

    #[test]
    fn test_decode_printable() {
        assert_eq!(decoded(0x41), "A");
        assert_eq!(decoded(b' '), " ");
        assert_eq!(decoded(b'~'), "~");
    }

    #[test]
    fn test_decode_null_is_dropped() {
        assert_eq!(decoded(0x00), "");
    }

    #[test]
    fn test_decode_star_glyph() {
        assert_eq!(decoded(0x02), "[*]");
    }

    #[test]
    fn test_decode_other_bytes_escaped() {
        assert_eq!(decoded(0x01), "\\x01");
        assert_eq!(decoded(0x7F), "\\x7f");
        assert_eq!(decoded(0xAB), "\\xab");
    }

    #[test]
    fn test_decode_line_trims() {
        assert_eq!(decode_line(b"   STPT  \x02 8\x02   "), "STPT  [*] 8[*]");
        assert_eq!(decode_line(&[0u8; 26]), "");
        assert_eq!(decode_line(b""), "");
    }

    #[test]
    fn test_decode_line_keeps_inner_nulls_out() {
        assert_eq!(decode_line(b"A\0B"), "AB");
    }
}
