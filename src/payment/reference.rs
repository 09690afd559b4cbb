//! Correlation token codec
//!
//! A payment session carries `lead_<leadId>_<issuedAtMillis>` as the provider's
//! external reference. The callback echoes it back and [`decode`] recovers the
//! lead id. Decoding is total: anything that does not match yields `None`.

use std::sync::OnceLock;

use regex::Regex;

use crate::ledger::LeadId;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| match Regex::new(r"^lead_([0-9]+)_") {
        Ok(re) => re,
        Err(e) => unreachable!("static token pattern is valid: {e}"),
    })
}

/// Build the correlation token for a session issued at `issued_at_millis`.
pub fn encode(lead_id: LeadId, issued_at_millis: i64) -> String {
    format!("lead_{}_{}", lead_id, issued_at_millis)
}

/// Recover the lead id from a correlation token.
///
/// ```
/// use leadpay::ledger::LeadId;
/// use leadpay::payment::reference::{decode, encode};
///
/// assert_eq!(decode(&encode(LeadId(42), 1_700_000_000_000)), Some(LeadId(42)));
/// assert_eq!(decode("order_42_1"), None);
/// ```
pub fn decode(token: &str) -> Option<LeadId> {
    let captures = token_pattern().captures(token)?;
    captures.get(1)?.as_str().parse::<u64>().ok().map(LeadId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_format() {
        assert_eq!(encode(LeadId(42), 1_700_000_000_000), "lead_42_1700000000000");
    }

    #[test]
    fn test_decode_known_token() {
        assert_eq!(decode("lead_42_1700000000000"), Some(LeadId(42)));
        assert_eq!(decode("lead_0_0"), Some(LeadId(0)));
        assert_eq!(decode("lead_7_"), Some(LeadId(7)));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        for token in [
            "",
            "lead_",
            "lead__123",
            "lead_42",
            "LEAD_42_1",
            " lead_42_1",
            "xlead_42_1",
            "lead_-4_1",
            "lead_4a_1",
            "lead_99999999999999999999999_1",
        ] {
            assert_eq!(decode(token), None, "token {token:?}");
        }
    }

    proptest! {
        #[test]
        fn prop_roundtrip(lead_id in any::<u64>(), millis in 0i64..=i64::MAX) {
            prop_assert_eq!(decode(&encode(LeadId(lead_id), millis)), Some(LeadId(lead_id)));
        }

        #[test]
        fn prop_decode_total(token in ".*") {
            let _ = decode(&token);
        }

        #[test]
        fn prop_non_prefixed_is_absent(token in "[^l].*") {
            prop_assert_eq!(decode(&token), None);
        }
    }
}
