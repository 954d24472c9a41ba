//! Inbound invocation request and its validation.
//!
//! Everything here runs before any RPC call is made: a request that fails
//! validation never touches the ledger.

use std::fmt;
use std::num::IntErrorKind;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;

/// Amount used when the request carries no usable increment.
pub const DEFAULT_INCREMENT: u64 = 1;

/// 2^64 as an `f64`; any float at or above this does not fit a `u64`.
const U64_LIMIT_F64: f64 = 18_446_744_073_709_551_616.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid network: {0:?}")]
    UnknownNetwork(String),
    #[error("invalid contract id {0:?}: expected 64 hex characters")]
    MalformedContractId(String),
    #[error("increment amount {0} is not representable as an unsigned 64-bit integer")]
    AmountOutOfRange(String),
    #[error("invalid cursor")]
    InvalidCursor,
}

/// 32-byte contract identifier, written as 64 hex characters on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContractIdentifier([u8; 32]);

impl ContractIdentifier {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a hex identifier, tolerating surrounding whitespace and upper case.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let bytes = hex::decode(trimmed)
            .map_err(|_| ValidationError::MalformedContractId(raw.to_string()))?;
        if bytes.len() != 32 {
            return Err(ValidationError::MalformedContractId(raw.to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for ContractIdentifier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ContractIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContractIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractIdentifier({})", self.to_hex())
    }
}

/// Canonical form of a contract id used as an event-log key.
///
/// Valid identifiers are lower-cased; anything else is kept as given (trimmed)
/// so that lookups for it simply find nothing.
pub fn normalize_contract_id(raw: &str) -> String {
    match ContractIdentifier::parse(raw) {
        Ok(id) => id.to_hex(),
        Err(_) => raw.trim().to_string(),
    }
}

/// An "increment" action as received from the automation platform.
#[derive(Debug, Clone, Default)]
pub struct InvocationRequest {
    pub contract_id: String,
    pub network: String,
    /// Raw amount field; coerced by [`coerce_amount`].
    pub increment_amount: Option<Value>,
    /// Caller's IANA time zone, used only for the event timestamp.
    pub time_zone: Option<String>,
}

/// Coerce the raw amount field into a `u64`.
///
/// Missing, null, empty, zero, `false` and non-numeric values fall back to
/// [`DEFAULT_INCREMENT`]. Negative, fractional or oversized numbers are
/// rejected.
pub fn coerce_amount(raw: Option<&Value>) -> Result<u64, ValidationError> {
    let amount = match raw {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(b)) => u64::from(*b),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) => v,
            None => match n.as_f64() {
                Some(f) => amount_from_f64(f, &n.to_string())?,
                None => return Err(ValidationError::AmountOutOfRange(n.to_string())),
            },
        },
        Some(Value::String(s)) => amount_from_str(s)?,
        Some(Value::Array(_)) | Some(Value::Object(_)) => 0,
    };

    Ok(if amount == 0 { DEFAULT_INCREMENT } else { amount })
}

/// Numeric value of a string field, following JavaScript `Number(string)`.
///
/// Strings that are not numeric literals yield 0. Accepted forms are decimal
/// and exponent literals, `Infinity` with an optional sign, and unsigned
/// `0x`/`0o`/`0b` integer literals.
fn amount_from_str(raw: &str) -> Result<u64, ValidationError> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(0);
    }
    if let Ok(v) = s.parse::<u64>() {
        return Ok(v);
    }

    let radix = match s.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &s[2..];
        if digits.starts_with(['+', '-']) {
            return Ok(0);
        }
        return match u64::from_str_radix(digits, radix) {
            Ok(v) => Ok(v),
            Err(e) if *e.kind() == IntErrorKind::PosOverflow => {
                Err(ValidationError::AmountOutOfRange(raw.to_string()))
            }
            Err(_) => Ok(0),
        };
    }

    if matches!(s, "Infinity" | "+Infinity" | "-Infinity") {
        return Err(ValidationError::AmountOutOfRange(raw.to_string()));
    }

    // Anything else must be a plain decimal literal; this also keeps the
    // `inf`/`nan` spellings `f64::from_str` accepts out.
    let decimal = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if !decimal {
        return Ok(0);
    }
    match s.parse::<f64>() {
        Ok(f) => amount_from_f64(f, s),
        Err(_) => Ok(0),
    }
}

fn amount_from_f64(f: f64, raw: &str) -> Result<u64, ValidationError> {
    if !f.is_finite() || f < 0.0 || f.fract() != 0.0 || f >= U64_LIMIT_F64 {
        return Err(ValidationError::AmountOutOfRange(raw.to_string()));
    }
    Ok(f as u64)
}

/// Resolve the caller's time zone, falling back to UTC for unknown names.
pub fn resolve_time_zone(name: Option<&str>) -> Tz {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Tz::UTC;
    };
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(time_zone = name, "unknown caller time zone, using UTC");
            Tz::UTC
        }
    }
}

/// Render `yyyy-MM-dd HH:mm:ss <zone>` in the caller's time zone.
pub fn format_timestamp(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz)
        .format("%Y-%m-%d %H:%M:%S %Z")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    const ID: &str = "bfe2b969bf755db902578ad8d744e2a813fb5104d0c28fd1f980914333298bca";

    #[test]
    fn parses_contract_id() {
        let id = ContractIdentifier::parse(ID).unwrap();
        assert_eq!(id.to_hex(), ID);
        assert_eq!(id.to_string(), ID);
    }

    #[test]
    fn contract_id_is_case_insensitive() {
        let upper = ID.to_uppercase();
        let id = ContractIdentifier::parse(&format!("  {upper}\n")).unwrap();
        assert_eq!(id.to_hex(), ID);
        assert_eq!(normalize_contract_id(&upper), ID);
    }

    #[rstest]
    #[case("")]
    #[case("zz")]
    #[case(&ID[..62])]
    #[case("not-a-contract")]
    fn rejects_malformed_contract_id(#[case] raw: &str) {
        assert!(matches!(
            ContractIdentifier::parse(raw),
            Err(ValidationError::MalformedContractId(_))
        ));
    }

    #[test]
    fn normalize_keeps_invalid_ids() {
        assert_eq!(normalize_contract_id(" abc "), "abc");
    }

    #[rstest]
    #[case(None, 1)]
    #[case(Some(json!(null)), 1)]
    #[case(Some(json!("")), 1)]
    #[case(Some(json!("0")), 1)]
    #[case(Some(json!(0)), 1)]
    #[case(Some(json!(false)), 1)]
    #[case(Some(json!(true)), 1)]
    #[case(Some(json!("abc")), 1)]
    #[case(Some(json!("NaN")), 1)]
    #[case(Some(json!({})), 1)]
    #[case(Some(json!("5")), 5)]
    #[case(Some(json!(" 42 ")), 42)]
    #[case(Some(json!(7)), 7)]
    #[case(Some(json!(3.0)), 3)]
    #[case(Some(json!("1e3")), 1000)]
    #[case(Some(json!("18446744073709551615")), u64::MAX)]
    #[case(Some(json!("inf")), 1)]
    #[case(Some(json!("-infinity")), 1)]
    #[case(Some(json!("nan")), 1)]
    #[case(Some(json!("0x10")), 16)]
    #[case(Some(json!("0X1f")), 31)]
    #[case(Some(json!("0o17")), 15)]
    #[case(Some(json!("0b11")), 3)]
    #[case(Some(json!("0x")), 1)]
    #[case(Some(json!("0x-1")), 1)]
    #[case(Some(json!("0xzz")), 1)]
    #[case(Some(json!("1e")), 1)]
    #[case(Some(json!(".5e1")), 5)]
    fn coerces_amount(#[case] raw: Option<Value>, #[case] expected: u64) {
        assert_eq!(coerce_amount(raw.as_ref()).unwrap(), expected);
    }

    #[rstest]
    #[case(json!("-3"))]
    #[case(json!(-3))]
    #[case(json!("2.5"))]
    #[case(json!(2.5))]
    #[case(json!("18446744073709551616"))]
    #[case(json!("Infinity"))]
    #[case(json!("-Infinity"))]
    #[case(json!("0x10000000000000000"))]
    fn rejects_unrepresentable_amount(#[case] raw: Value) {
        assert!(matches!(
            coerce_amount(Some(&raw)),
            Err(ValidationError::AmountOutOfRange(_))
        ));
    }

    #[test]
    fn unknown_time_zone_falls_back_to_utc() {
        assert_eq!(resolve_time_zone(Some("Mars/Olympus_Mons")), Tz::UTC);
        assert_eq!(resolve_time_zone(None), Tz::UTC);
        assert_eq!(resolve_time_zone(Some("  ")), Tz::UTC);
        assert_eq!(
            resolve_time_zone(Some("America/New_York")),
            Tz::America__New_York
        );
    }

    #[test]
    fn formats_timestamp_in_caller_zone() {
        let at = Utc.with_ymd_and_hms(2023, 1, 15, 18, 30, 5).unwrap();
        assert_eq!(format_timestamp(at, Tz::UTC), "2023-01-15 18:30:05 UTC");
        assert_eq!(
            format_timestamp(at, Tz::America__Los_Angeles),
            "2023-01-15 10:30:05 PST"
        );
    }
}
