//! Contact detection, normalization and format validation.
//!
//! Login and password-reset inputs accept either an email address or a
//! mobile number; when the caller does not name the kind we infer it
//! from the shape of the value.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::ContactKind;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex")
});

// 10-15 digits, optional leading +, no leading zero.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+?[1-9][0-9]{9,14}$").expect("phone regex")
});

/// Infer the contact kind from the raw value. Returns `None` when the
/// value looks like neither an email address nor a phone number.
pub fn detect_kind(contact: &str) -> Option<ContactKind> {
    let trimmed = contact.trim().to_lowercase();

    if EMAIL_RE.is_match(&trimmed) {
        return Some(ContactKind::Email);
    }

    let digits: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    if PHONE_RE.is_match(&digits) {
        return Some(ContactKind::Mobile);
    }

    None
}

/// Normalize a contact value for storage and lookup: emails are
/// lowercased and trimmed, mobile numbers keep only digits and `+`.
pub fn format_contact(contact: &str, kind: ContactKind) -> String {
    let trimmed = contact.trim().to_lowercase();
    match kind {
        ContactKind::Email => trimmed,
        ContactKind::Mobile => trimmed
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect(),
    }
}

/// Validate a (normalized) contact value against its declared kind.
pub fn validate_format(contact: &str, kind: ContactKind) -> Result<(), String> {
    match kind {
        ContactKind::Email => {
            if EMAIL_RE.is_match(contact.trim()) {
                Ok(())
            } else {
                Err("Invalid email format".to_string())
            }
        }
        ContactKind::Mobile => {
            let digits: String = contact
                .trim()
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '+')
                .collect();
            if PHONE_RE.is_match(&digits) {
                Ok(())
            } else {
                Err("Invalid phone number format. Must be 10-15 digits.".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_email() {
        assert_eq!(detect_kind("alice@example.com"), Some(ContactKind::Email));
        assert_eq!(detect_kind(" Alice@Example.COM "), Some(ContactKind::Email));
    }

    #[test]
    fn detects_mobile() {
        assert_eq!(detect_kind("+14155552671"), Some(ContactKind::Mobile));
        assert_eq!(detect_kind("91 98765 43210"), Some(ContactKind::Mobile));
        assert_eq!(detect_kind("(415) 555-2671-0"), Some(ContactKind::Mobile));
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert_eq!(detect_kind("not-a-contact"), None);
        assert_eq!(detect_kind("12"), None);
        assert_eq!(detect_kind("0123456789"), None);
    }

    #[test]
    fn formats_email_lowercase() {
        assert_eq!(
            format_contact(" Alice@Example.COM ", ContactKind::Email),
            "alice@example.com"
        );
    }

    #[test]
    fn formats_mobile_digits_only() {
        assert_eq!(
            format_contact("+1 (415) 555-2671", ContactKind::Mobile),
            "+14155552671"
        );
    }

    #[test]
    fn validates_formats() {
        assert!(validate_format("alice@example.com", ContactKind::Email).is_ok());
        assert!(validate_format("alice@", ContactKind::Email).is_err());
        assert!(validate_format("+14155552671", ContactKind::Mobile).is_ok());
        assert!(validate_format("123", ContactKind::Mobile).is_err());
    }
}
