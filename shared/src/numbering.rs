//! Human-readable document numbers
//!
//! Sequence values come from the database; this module only formats and
//! parses them so every caller produces the same shape.

use chrono::NaiveDate;

/// Document kinds that carry a generated number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Transfer,
    Query,
}

impl DocumentKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::Transfer => "TRF",
            DocumentKind::Query => "QRY",
        }
    }
}

/// Format `PREFIX-YYYYMMDD-NNNN`. Sequences past 9999 keep all digits.
pub fn format_document_number(kind: DocumentKind, date: NaiveDate, sequence: i64) -> String {
    format!("{}-{}-{:04}", kind.prefix(), date.format("%Y%m%d"), sequence)
}

/// Split a document number back into its date and sequence
pub fn parse_document_number(kind: DocumentKind, number: &str) -> Option<(NaiveDate, i64)> {
    let mut parts = number.splitn(3, '-');
    if parts.next()? != kind.prefix() {
        return None;
    }
    let date = NaiveDate::parse_from_str(parts.next()?, "%Y%m%d").ok()?;
    let sequence = parts.next()?.parse().ok()?;
    Some((date, sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_padding() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        assert_eq!(
            format_document_number(DocumentKind::Query, date, 7),
            "QRY-20260214-0007"
        );
        assert_eq!(
            format_document_number(DocumentKind::Transfer, date, 12345),
            "TRF-20260214-12345"
        );
    }

    #[test]
    fn parse_rejects_wrong_prefix() {
        assert_eq!(
            parse_document_number(DocumentKind::Transfer, "QRY-20260214-0007"),
            None
        );
        let date = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        assert_eq!(
            parse_document_number(DocumentKind::Query, "QRY-20260214-0007"),
            Some((date, 7))
        );
    }
}
