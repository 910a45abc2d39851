//! Microcrate for hex byte-string cleaning and address parsing.
//!
//! Byte strings arrive with or without a `$` prefix, with whitespace and
//! underscores as visual separators. The canonical form is `$` followed by
//! uppercase hex pairs. Addresses accept `$HHHH`, `0xHHHH`, `%bbbb…`, or
//! decimal.

use c64b_error::BridgeError;

/// Strip separators and the optional `$` prefix, validate, and uppercase.
///
/// The result contains only uppercase hex digits and always has an even
/// length. Errors are `validation` errors rooted at `$`; callers re-root
/// them with [`BridgeError::at_path`].
pub fn clean_hex(input: &str) -> Result<String, BridgeError> {
    let stripped = input.strip_prefix('$').unwrap_or(input);
    let mut digits = String::with_capacity(stripped.len());
    for ch in stripped.chars() {
        if ch.is_whitespace() || ch == '_' {
            continue;
        }
        if !ch.is_ascii_hexdigit() {
            return Err(
                BridgeError::validation(format!("invalid hex digit '{ch}'"), "$")
                    .with_details(input.into()),
            );
        }
        digits.push(ch.to_ascii_uppercase());
    }
    if digits.len() % 2 != 0 {
        return Err(
            BridgeError::validation("hex byte string has an odd number of nibbles", "$")
                .with_details(input.into()),
        );
    }
    Ok(digits)
}

/// Canonical form of a byte string: `$` + uppercase hex pairs.
pub fn canonical_hex(input: &str) -> Result<String, BridgeError> {
    Ok(format!("${}", clean_hex(input)?))
}

/// Decode a byte string (in any accepted spelling) to raw bytes.
pub fn hex_to_bytes(input: &str) -> Result<Vec<u8>, BridgeError> {
    let digits = clean_hex(input)?;
    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for pair in digits.as_bytes().chunks(2) {
        let pair = std::str::from_utf8(pair).expect("chunks of ascii hex");
        // clean_hex guarantees valid hex digits.
        bytes.push(u8::from_str_radix(pair, 16).expect("validated hex pair"));
    }
    Ok(bytes)
}

/// Encode bytes in the canonical `$` + uppercase spelling.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("${}", bytes_to_plain_hex(bytes))
}

/// Encode bytes as bare uppercase hex digits (no prefix).
pub fn bytes_to_plain_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02X}"));
    }
    out
}

/// Parse an address: `$HHHH` / `0xHHHH` hex, `%b…` binary, else decimal.
pub fn parse_address(input: &str) -> Result<u16, BridgeError> {
    let trimmed = input.trim();
    let parsed: Result<u32, _> = if let Some(hex) = trimmed
        .strip_prefix('$')
        .or_else(|| trimmed.strip_prefix("0x"))
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16)
    } else if let Some(bin) = trimmed.strip_prefix('%') {
        u32::from_str_radix(bin, 2)
    } else {
        trimmed.parse::<u32>()
    };

    match parsed {
        Ok(value) if value <= u16::MAX as u32 => Ok(value as u16),
        Ok(value) => Err(
            BridgeError::validation("address outside the 16-bit address space", "$")
                .with_details(value.into()),
        ),
        Err(_) => Err(BridgeError::validation("invalid address", "$").with_details(input.into())),
    }
}

/// Format an address as zero-padded uppercase 4-hex digits (no prefix).
pub fn format_address(address: u16) -> String {
    format!("{address:04X}")
}

/// Canonical display form of an address: `$` + 4 uppercase hex digits.
pub fn display_address(address: u16) -> String {
    format!("${address:04X}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_hex_strips_prefix_and_separators() {
        assert_eq!(clean_hex("$aa 55_ff").unwrap(), "AA55FF");
        assert_eq!(clean_hex("aa55").unwrap(), "AA55");
        assert_eq!(clean_hex("").unwrap(), "");
    }

    #[test]
    fn clean_hex_is_idempotent() {
        let once = clean_hex("$de_ad be ef").unwrap();
        assert_eq!(clean_hex(&once).unwrap(), once);
    }

    #[test]
    fn clean_hex_rejects_odd_nibble_count() {
        let err = clean_hex("$ABC").unwrap_err();
        assert!(err.to_string().contains("odd number of nibbles"));
    }

    #[test]
    fn clean_hex_rejects_non_hex_digits() {
        let err = clean_hex("$GG").unwrap_err();
        assert!(err.to_string().contains("invalid hex digit"));
    }

    #[test]
    fn hex_roundtrip_law() {
        for input in ["$aa55", "AA 55", "de_ad_be_ef", "$0102"] {
            let canonical = canonical_hex(input).unwrap();
            assert_eq!(bytes_to_hex(&hex_to_bytes(input).unwrap()), canonical);
        }
    }

    #[test]
    fn bytes_to_hex_is_canonical() {
        assert_eq!(bytes_to_hex(&[0xAA, 0x55]), "$AA55");
        assert_eq!(bytes_to_hex(&[]), "$");
        assert_eq!(bytes_to_plain_hex(&[0x01, 0x02]), "0102");
    }

    #[test]
    fn parse_address_accepts_all_spellings() {
        assert_eq!(parse_address("$0400").unwrap(), 0x0400);
        assert_eq!(parse_address("0x0400").unwrap(), 0x0400);
        assert_eq!(parse_address("%0000010000000000").unwrap(), 0x0400);
        assert_eq!(parse_address("1024").unwrap(), 0x0400);
        assert_eq!(parse_address(" $FFFF ").unwrap(), 0xFFFF);
    }

    #[test]
    fn parse_address_rejects_out_of_range() {
        let err = parse_address("$10000").unwrap_err();
        assert!(err.to_string().contains("16-bit address space"));
        assert!(parse_address("65536").is_err());
    }

    #[test]
    fn parse_address_rejects_garbage() {
        assert!(parse_address("screen").is_err());
        assert!(parse_address("$").is_err());
        assert!(parse_address("%").is_err());
    }

    #[test]
    fn address_formatting_is_zero_padded_uppercase() {
        assert_eq!(format_address(0x400), "0400");
        assert_eq!(format_address(0xFFFF), "FFFF");
        assert_eq!(display_address(0x2), "$0002");
    }
}
