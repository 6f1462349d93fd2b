//! Syntactic gatekeepers for the fields that can reach the chain or an RFA.
//!
//! Every function here is pure, allocation-free on the success path, and
//! fails closed: an ambiguous or merely-suspicious input is rejected rather
//! than sanitized. None of these functions touch the chain; they only look
//! at the bytes in front of them.

/// A field failed syntactic validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("subject {0:?} does not match `type:opaque-id`")]
    Subject(String),
    #[error("predicate {0:?} is not a lowercase snake_case identifier")]
    Predicate(String),
    #[error("object exceeds the {0}-byte limit")]
    ObjectTooLong(usize),
    #[error("namespace {0:?} is not a valid dotted path")]
    Namespace(String),
    #[error("threshold {threshold} is out of range for {witness_count} witnesses")]
    Threshold { threshold: u32, witness_count: usize },
    #[error("control character 0x{byte:02X} at byte offset {offset} in {field}")]
    ControlCharacter { field: &'static str, offset: usize, byte: u8 },
    #[error("confidence {0} is not a finite value in [0, 1]")]
    Confidence(f64),
    #[error("confidence {0} hundredths is out of range [0, 100]")]
    ConfidenceOutOfRange(u8),
}

const MAX_OBJECT_LEN: usize = 4096;
const MAX_SUBJECT_OPAQUE_LEN: usize = 128;

/// Reject ASCII control characters other than horizontal tab (0x09) and
/// line feed (0x0A).
pub fn reject_control_characters(field: &'static str, s: &str) -> Result<(), ValidationError> {
    for (offset, b) in s.bytes().enumerate() {
        if b <= 0x1F && b != 0x09 && b != 0x0A {
            return Err(ValidationError::ControlCharacter { field, offset, byte: b });
        }
    }
    Ok(())
}

fn is_lower_alpha_or_underscore(c: char) -> bool {
    c.is_ascii_lowercase() || c == '_'
}

fn is_lower_alnum_or_underscore(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'
}

/// `^[a-z_]+:[a-z0-9_./-]{1,128}$`
pub fn validate_subject(s: &str) -> Result<(), ValidationError> {
    reject_control_characters("subject", s)?;
    let bad = || ValidationError::Subject(s.to_string());

    let colon = s.find(':').ok_or_else(bad)?;
    let (ty, rest) = (&s[..colon], &s[colon + 1..]);

    if ty.is_empty() || !ty.chars().all(is_lower_alpha_or_underscore) {
        return Err(bad());
    }
    if rest.is_empty() || rest.chars().count() > MAX_SUBJECT_OPAQUE_LEN {
        return Err(bad());
    }
    let opaque_ok = |c: char| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '/' | '-')
    };
    if !rest.chars().all(opaque_ok) {
        return Err(bad());
    }
    Ok(())
}

/// `^[a-z_][a-z0-9_]{0,63}$`
pub fn validate_predicate(p: &str) -> Result<(), ValidationError> {
    reject_control_characters("predicate", p)?;
    let bad = || ValidationError::Predicate(p.to_string());

    let mut chars = p.chars();
    let first = chars.next().ok_or_else(bad)?;
    if !is_lower_alpha_or_underscore(first) {
        return Err(bad());
    }
    let rest_len = p.chars().count() - 1;
    if rest_len > 63 {
        return Err(bad());
    }
    if !chars.all(is_lower_alnum_or_underscore) {
        return Err(bad());
    }
    Ok(())
}

/// An `object` is either a typed identifier (`type:opaque`, same grammar as
/// `subject`), a typed value (`"type:value"`, opaque payload after the first
/// colon), or a bare string up to 4096 characters. All three are accepted
/// here; the distinction is made by the caller if it cares.
pub fn validate_object(o: &str) -> Result<(), ValidationError> {
    reject_control_characters("object", o)?;
    if o.chars().count() > MAX_OBJECT_LEN {
        return Err(ValidationError::ObjectTooLong(MAX_OBJECT_LEN));
    }
    Ok(())
}

/// `^[a-z_][a-z0-9_]*(\.[a-z_][a-z0-9_]*)*$`, no leading/trailing/consecutive
/// dots, no traversal sequences (`..`, `.` segments, or a bare `.`).
pub fn validate_namespace(n: &str) -> Result<(), ValidationError> {
    reject_control_characters("namespace", n)?;
    let bad = || ValidationError::Namespace(n.to_string());

    if n.is_empty() || n.starts_with('.') || n.ends_with('.') || n.contains("..") {
        return Err(bad());
    }
    for segment in n.split('.') {
        let mut chars = segment.chars();
        let first = chars.next().ok_or_else(bad)?;
        if !is_lower_alpha_or_underscore(first) {
            return Err(bad());
        }
        if !chars.all(is_lower_alnum_or_underscore) {
            return Err(bad());
        }
    }
    Ok(())
}

/// `1 <= threshold <= witness_count`.
pub fn validate_threshold(threshold: u32, witness_count: usize) -> Result<(), ValidationError> {
    if threshold == 0 || (threshold as usize) > witness_count {
        return Err(ValidationError::Threshold { threshold, witness_count });
    }
    Ok(())
}

/// Confidence must be representable as hundredths in `[0, 100]`.
///
/// The crate never carries confidence as a floating-point value internally:
/// callers supply a `f64` in `[0.0, 1.0]`
/// at the boundary and this converts it to the fixed-point form used by
/// [`crate::cell::Fact`], rejecting anything that would lose precision
/// beyond two decimal digits or fall outside the unit interval.
pub fn validate_confidence(confidence: f64) -> Result<u8, ValidationError> {
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(ValidationError::Confidence(confidence));
    }
    Ok((confidence * 100.0).round() as u8)
}

/// Bounds-check an already fixed-point confidence (as stored on a
/// `FactBody`) against its `[0, 100]` range. Distinct from
/// [`validate_confidence`], which additionally converts from the `f64`
/// wire/boundary representation.
pub fn validate_confidence_hundredths(confidence: u8) -> Result<(), ValidationError> {
    if confidence > 100 {
        return Err(ValidationError::ConfidenceOutOfRange(confidence));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_accepts_valid_and_rejects_invalid() {
        assert!(validate_subject("user:alice_123").is_ok());
        assert!(validate_subject("doc:7").is_ok());
        assert!(validate_subject("no_colon").is_err());
        assert!(validate_subject("USER:alice").is_err());
        assert!(validate_subject("user:").is_err());
    }

    #[test]
    fn predicate_rejects_injection_attempt() {
        assert!(validate_predicate("can_access").is_ok());
        assert!(validate_predicate("can;drop table").is_err());
        assert!(validate_predicate("CanAccess").is_err());
    }

    #[test]
    fn namespace_rejects_traversal() {
        assert!(validate_namespace("corp").is_ok());
        assert!(validate_namespace("corp.hr").is_ok());
        assert!(validate_namespace("corp..hr").is_err());
        assert!(validate_namespace(".corp").is_err());
        assert!(validate_namespace("corp.").is_err());
        assert!(validate_namespace("").is_err());
    }

    #[test]
    fn threshold_bounds() {
        assert!(validate_threshold(1, 3).is_ok());
        assert!(validate_threshold(3, 3).is_ok());
        assert!(validate_threshold(0, 3).is_err());
        assert!(validate_threshold(4, 3).is_err());
    }

    #[test]
    fn control_characters_rejected() {
        assert!(validate_object("hello\u{0}world").is_err());
        assert!(validate_object("hello\tworld\n").is_ok());
    }

    #[test]
    fn confidence_ceiling_conversion() {
        assert_eq!(validate_confidence(1.0).unwrap(), 100);
        assert_eq!(validate_confidence(0.0).unwrap(), 0);
        assert!(validate_confidence(1.5).is_err());
        assert!(validate_confidence(-0.1).is_err());
    }

    #[test]
    fn confidence_hundredths_bounds() {
        assert!(validate_confidence_hundredths(0).is_ok());
        assert!(validate_confidence_hundredths(100).is_ok());
        assert!(validate_confidence_hundredths(200).is_err());
    }
}
