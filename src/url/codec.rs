use std::borrow::Cow;

use super::error::ParseError;

/// Percent-encode one URL component.
///
/// Everything outside the unreserved set is escaped, `/` included, so the
/// result is safe to use as a single path segment.
pub fn quote(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}

/// Percent-decode one URL component.
pub fn unquote(value: &str) -> Result<String, ParseError> {
    validate_escapes(value)?;
    decode(value, false)
}

/// Reject `%` not followed by two hex digits.
pub(crate) fn validate_escapes(value: &str) -> Result<(), ParseError> {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let well_formed = i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !well_formed {
                return Err(ParseError::InvalidEscape { position: i });
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

/// Decode a component whose escapes were already validated.
pub(crate) fn decode(value: &str, plus_as_space: bool) -> Result<String, ParseError> {
    let source: Cow<'_, str> = if plus_as_space && value.contains('+') {
        Cow::Owned(value.replace('+', " "))
    } else {
        Cow::Borrowed(value)
    };

    urlencoding::decode(&source)
        .map(Cow::into_owned)
        .map_err(|_| ParseError::InvalidEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes_reserved() {
        assert_eq!(quote("a b/c@d"), "a%20b%2Fc%40d");
        assert_eq!(quote("plain-text_1.0~"), "plain-text_1.0~");
    }

    #[test]
    fn test_unquote_basic() {
        assert_eq!(unquote("%20").unwrap(), " ");
        assert_eq!(unquote("Dr%20Disrespect").unwrap(), "Dr Disrespect");
        assert_eq!(unquote("a+b").unwrap(), "a+b");
    }

    #[test]
    fn test_unquote_rejects_dangling_escape() {
        assert_eq!(
            unquote("abc%2").unwrap_err(),
            ParseError::InvalidEscape { position: 3 }
        );
        assert_eq!(
            unquote("%zz").unwrap_err(),
            ParseError::InvalidEscape { position: 0 }
        );
    }

    #[test]
    fn test_unquote_rejects_invalid_utf8() {
        assert_eq!(unquote("%FF%FE").unwrap_err(), ParseError::InvalidEncoding);
    }

    #[test]
    fn test_decode_plus_as_space() {
        assert_eq!(decode("a+b%2Bc", true).unwrap(), "a b+c");
        assert_eq!(decode("a+b", false).unwrap(), "a+b");
    }

    #[test]
    fn test_multibyte_roundtrip() {
        let original = "héllo wörld ✓";
        assert_eq!(unquote(&quote(original)).unwrap(), original);
    }
}
