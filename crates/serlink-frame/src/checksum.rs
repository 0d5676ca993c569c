//! Payload checksums.
//!
//! Both framing profiles use the same sum: every payload byte added up
//! modulo 256. They differ only in how the value is rendered on the wire
//! (decimal for [`Delimited`](crate::Delimited), two-digit uppercase hex
//! for [`ColonHex`](crate::ColonHex)).

/// Sum of the payload's bytes modulo 256.
pub fn byte_sum(payload: &str) -> u8 {
    payload.bytes().fold(0u8, |acc, b| acc.wrapping_add(b))
}

/// Render a checksum as the decimal field used by the delimited profile.
pub fn render_decimal(checksum: u8) -> String {
    checksum.to_string()
}

/// Render a checksum as the two-digit uppercase hex field used by the
/// colon profile.
pub fn render_hex(checksum: u8) -> String {
    format!("{checksum:02X}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_matches_known_values() {
        // 'P'+'I'+'N'+'G' = 80+73+78+71 = 302 % 256 = 46
        assert_eq!(byte_sum("PING"), 46);
        assert_eq!(byte_sum(""), 0);
    }

    #[test]
    fn sum_wraps_modulo_256() {
        let long = "Z".repeat(100); // 90 * 100 = 9000 % 256 = 40
        assert_eq!(byte_sum(&long), 40);
    }

    #[test]
    fn renders_decimal_and_hex() {
        assert_eq!(render_decimal(46), "46");
        assert_eq!(render_hex(46), "2E");
        assert_eq!(render_hex(7), "07");
    }
}
