//! Byte classes from RFC 9110 / RFC 9112 used by the message parser.

pub const SP: u8 = b' ';
pub const HTAB: u8 = b'\t';
pub const CR: u8 = b'\r';
pub const LF: u8 = b'\n';
pub const COLON: u8 = b':';
pub const SEMICOLON: u8 = b';';

/// tchar = "!" / "#" / "$" / "%" / "&" / "'" / "*" / "+" / "-" / "." /
///         "^" / "_" / "`" / "|" / "~" / DIGIT / ALPHA
pub fn is_tchar(byte: u8) -> bool {
    b"!#$%&'*+-.^_`|~".contains(&byte) || byte.is_ascii_digit() || byte.is_ascii_alphabetic()
}

/// VCHAR
pub fn is_vchar(byte: u8) -> bool {
    (0x21..=0x7e).contains(&byte)
}

pub fn is_ows(byte: u8) -> bool {
    byte == SP || byte == HTAB
}

pub fn is_cr(byte: u8) -> bool {
    byte == CR
}

pub fn is_lf(byte: u8) -> bool {
    byte == LF
}

pub fn is_digit(byte: u8) -> bool {
    byte.is_ascii_digit()
}

pub fn is_hex_digit(byte: u8) -> bool {
    byte.is_ascii_hexdigit()
}

pub fn is_upper_case(byte: u8) -> bool {
    byte.is_ascii_uppercase()
}

pub fn to_lower(byte: u8) -> u8 {
    byte.to_ascii_lowercase()
}

#[cfg(test)]
mod chars_tests {
    use super::*;

    #[test]
    fn tchars_are_valid() {
        for byte in b"!#$%&'*+-.^_`|~09azAZ".iter() {
            assert!(is_tchar(*byte), "{} should be a tchar", *byte as char);
        }
        for byte in (b'0'..=b'9').chain(b'a'..=b'z').chain(b'A'..=b'Z') {
            assert!(is_tchar(byte));
        }
    }

    #[test]
    fn delimiters_and_controls_are_not_tchars() {
        for byte in 0..=32u8 {
            assert!(!is_tchar(byte));
        }
        for byte in b"\"(),/:;<=>?@[\\]{}".iter() {
            assert!(!is_tchar(*byte), "{} should not be a tchar", *byte as char);
        }
        for byte in 127..=255u8 {
            assert!(!is_tchar(byte));
        }
    }

    #[test]
    fn vchars() {
        assert!(is_vchar(b'!'));
        assert!(is_vchar(b'~'));
        assert!(!is_vchar(b' '));
        assert!(!is_vchar(0x7f));
        assert!(!is_vchar(0x80));
    }

    #[test]
    fn whitespace_and_line_endings() {
        assert!(is_ows(b' '));
        assert!(is_ows(b'\t'));
        assert!(!is_ows(b'\r'));
        assert!(is_cr(b'\r'));
        assert!(!is_cr(b'\n'));
        assert!(is_lf(b'\n'));
    }

    #[test]
    fn hex_digits_and_case() {
        for byte in b"0123456789abcdefABCDEF".iter() {
            assert!(is_hex_digit(*byte));
        }
        assert!(!is_hex_digit(b'g'));
        assert!(!is_hex_digit(b'G'));
        assert!(is_upper_case(b'Q'));
        assert!(!is_upper_case(b'q'));
        assert_eq!(to_lower(b'Q'), b'q');
        assert_eq!(to_lower(b'-'), b'-');
    }
}
