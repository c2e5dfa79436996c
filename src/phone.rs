//! Phone number normalization and validation.
//!
//! The service only registers Indian mobile numbers. All inputs are
//! normalized to `+91` followed by exactly ten digits, the first of which
//! is 6-9. Formatting variants (`9876543210`, `919876543210`,
//! `+91 98765-43210`) collapse to the same canonical form.

/// Strips every non-digit character. Used as the rate-limiter bucket key
/// so that formatting differences share a bucket.
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalizes a raw phone number into `+91XXXXXXXXXX`, or `None` if the
/// input is not a valid Indian mobile number in any accepted spelling.
pub fn normalize(raw: &str) -> Option<String> {
    let digits = digits_only(raw);

    let national = match digits.len() {
        10 => digits,
        12 if digits.starts_with("91") => digits[2..].to_string(),
        _ => return None,
    };

    if !is_valid_national(&national) {
        return None;
    }

    Some(format!("+91{}", national))
}

/// A ten-digit national number starting with 6-9.
fn is_valid_national(digits: &str) -> bool {
    digits.len() == 10
        && digits.as_bytes()[0] >= b'6'
        && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Verification codes are exactly six ASCII digits.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_all_accepted_spellings() {
        for raw in ["9876543210", "919876543210", "+919876543210"] {
            assert_eq!(normalize(raw).as_deref(), Some("+919876543210"));
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize("9876543210").unwrap();
        assert_eq!(normalize(&once).as_deref(), Some("+919876543210"));
    }

    #[test]
    fn accepts_formatted_input() {
        assert_eq!(
            normalize("+91 98765-43210").as_deref(),
            Some("+919876543210")
        );
    }

    #[test]
    fn rejects_bad_numbers() {
        assert_eq!(normalize("12345"), None);
        // first digit must be 6-9
        assert_eq!(normalize("5876543210"), None);
        assert_eq!(normalize("98765432101"), None);
        assert_eq!(normalize(""), None);
        // non-Indian country code
        assert_eq!(normalize("+14155550100"), None);
    }

    #[test]
    fn code_format() {
        assert!(is_valid_code("123456"));
        assert!(!is_valid_code("12345"));
        assert!(!is_valid_code("1234567"));
        assert!(!is_valid_code("12a456"));
        assert!(!is_valid_code(""));
    }

    #[test]
    fn digits_only_strips_formatting() {
        assert_eq!(digits_only("+91 98765-43210"), "919876543210");
    }
}
