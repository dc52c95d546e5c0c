use pretty_assertions::assert_eq;
use serialtool_core::codec::{
    bytes_to_hex, bytes_to_text, format_hex_dump, hex_to_bytes, is_valid_hex, text_to_bytes,
    CodecError, TextEncoding,
};

#[test]
fn test_hex_round_trip_all_byte_values() {
    let all: Vec<u8> = (0u8..=255).collect();
    assert_eq!(hex_to_bytes(&bytes_to_hex(&all, "")).unwrap(), all);
    assert_eq!(hex_to_bytes(&bytes_to_hex(&all, " ")).unwrap(), all);
    assert_eq!(hex_to_bytes(&bytes_to_hex(&all, "-")).unwrap(), all);
}

#[test]
fn test_hex_round_trip_empty() {
    assert_eq!(hex_to_bytes(&bytes_to_hex(&[], "")).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_hex_length_matches_stripped_digits() {
    let input = "de ad-BE EF 00";
    let stripped_len = input.chars().filter(|c| c.is_ascii_hexdigit()).count();
    let bytes = hex_to_bytes(input).unwrap();
    assert_eq!(bytes.len(), stripped_len / 2);
    assert_eq!(bytes, vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00]);
}

#[test]
fn test_hex_invalid_inputs() {
    for input in ["ABC", "ZZ", "0G", "01 02 ZZ", "1", "0x10"] {
        let result = hex_to_bytes(input);
        assert!(
            matches!(result, Err(CodecError::InvalidFormat(_))),
            "{:?} should be rejected, got {:?}",
            input,
            result
        );
        assert!(!is_valid_hex(input));
    }
}

#[test]
fn test_hex_only_spaces_and_hyphens_separate() {
    assert_eq!(hex_to_bytes(" 01-02 ").unwrap(), vec![0x01, 0x02]);
    for input in ["01\t02", "01\r\n02", "01\n"] {
        assert!(hex_to_bytes(input).is_err(), "{:?} should be rejected", input);
        assert!(!is_valid_hex(input));
    }
    assert!(hex_to_bytes("\t\r\n").unwrap().is_empty());
}

#[test]
fn test_hex_output_is_uppercase() {
    assert_eq!(bytes_to_hex(&[0xab, 0xcd, 0xef], " "), "AB CD EF");
}

#[test]
fn test_error_message_mentions_hex() {
    let err = hex_to_bytes("ZZ").unwrap_err();
    assert!(err.to_string().starts_with("Invalid hex format"));
}

#[test]
fn test_text_round_trip_utf8() {
    let text = "Hello, port! Grüße ✓";
    let bytes = text_to_bytes(text, TextEncoding::Utf8);
    assert_eq!(bytes_to_text(&bytes, TextEncoding::Utf8), text);
}

#[test]
fn test_text_round_trip_latin1_range() {
    let text = "café ÿ";
    let bytes = text_to_bytes(text, TextEncoding::Latin1);
    assert_eq!(bytes.len(), text.chars().count());
    assert_eq!(bytes_to_text(&bytes, TextEncoding::Latin1), text);
}

#[test]
fn test_hex_dump_two_rows() {
    let data = b"0123456789ABCDEF\x00\xFF";
    let dump = format_hex_dump(data, 16);
    let expected = concat!(
        "00000000: 30 31 32 33 34 35 36 37 38 39 41 42 43 44 45 46  0123456789ABCDEF\n",
        "00000010: 00 FF                                            ..\n",
    );
    assert_eq!(dump, expected);
}

#[test]
fn test_hex_dump_zero_width_uses_default() {
    assert_eq!(format_hex_dump(b"A", 0), format_hex_dump(b"A", 16));
}
