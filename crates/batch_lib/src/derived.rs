//! Computes the derived key of a value.
//!
//! Some values are JSON objects describing a customer of a brand on a channel. For those, another
//! key named `{channel}::{numeric customer ID}::{brand account}` exists in the database, and must
//! be deleted along with the primary key.

use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// The field containing the compound customer identifier.
pub const CUSTOMER_ID_FIELD: &str = "customerId";
/// The field containing the brand account identifier.
pub const BRAND_ACCOUNT_FIELD: &str = "brandAccount";
/// The field containing the channel identifier.
pub const CHANNEL_FIELD: &str = "gupshupChannel";

/// The separator before the numeric part of a customer identifier.
const CUSTOMER_ID_SEPARATOR: char = ':';

/// The error raised when a derived key can't be computed from a value.
#[derive(thiserror::Error, Debug)]
pub enum DeriveError {
    /// The value isn't valid JSON.
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// The value has the customer and brand account fields, but misses another required field.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// A required field has a type that can't be used in a key.
    #[error("field `{0}` has an unexpected type")]
    InvalidField(&'static str),
}

/// The parts of a derived key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    /// The channel identifier.
    pub channel: String,
    /// The numeric part of the customer identifier.
    pub numeric_id: String,
    /// The brand account identifier.
    pub brand_account: String,
}

impl fmt::Display for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}::{}",
            self.channel, self.numeric_id, self.brand_account
        )
    }
}

#[derive(Deserialize)]
struct Fields {
    #[serde(rename = "customerId", default, deserialize_with = "present")]
    customer_id: Option<Value>,
    #[serde(rename = "brandAccount", default, deserialize_with = "present")]
    brand_account: Option<Value>,
    #[serde(rename = "gupshupChannel", default, deserialize_with = "present")]
    channel: Option<Value>,
}

/// Keeps a `null` field as `Some(Value::Null)`, so only a missing field is `None`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Renders a scalar JSON value the way it appears in a key.
fn key_part(value: Value, field: &'static str) -> Result<String, DeriveError> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(DeriveError::InvalidField(field)),
    }
}

/// Returns the derived key of the provided value.
///
/// Returns `Ok(None)` if the value is valid JSON but isn't an object containing both the
/// customer identifier and the brand account. Once both are present, the channel is required
/// too.
///
/// A field set to `null` is present: it results in [`DeriveError::InvalidField`], as does a
/// customer identifier that isn't a string, or any field holding an array or an object.
pub fn derive_key(value: &str) -> Result<Option<DerivedKey>, DeriveError> {
    let value: Value = serde_json::from_str(value)?;
    if !value.is_object() {
        return Ok(None);
    }

    let Fields {
        customer_id: Some(customer_id),
        brand_account: Some(brand_account),
        channel,
    } = Fields::deserialize(value)?
    else {
        return Ok(None);
    };

    let channel = channel.ok_or(DeriveError::MissingField(CHANNEL_FIELD))?;

    let Value::String(customer_id) = customer_id else {
        return Err(DeriveError::InvalidField(CUSTOMER_ID_FIELD));
    };
    let numeric_id = customer_id
        .rsplit(CUSTOMER_ID_SEPARATOR)
        .next()
        .unwrap_or_default()
        .to_owned();

    Ok(Some(DerivedKey {
        channel: key_part(channel, CHANNEL_FIELD)?,
        numeric_id,
        brand_account: key_part(brand_account, BRAND_ACCOUNT_FIELD)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::{DeriveError, derive_key};

    fn derived(value: &str) -> Option<String> {
        derive_key(value).unwrap().map(|k| k.to_string())
    }

    #[test]
    fn full_value() {
        assert_eq!(
            derived(r#"{"customerId":"acct:789","brandAccount":"B1","gupshupChannel":"wa"}"#)
                .as_deref(),
            Some("wa::789::B1")
        );
    }

    #[test]
    fn last_segment_of_customer_id() {
        assert_eq!(
            derived(r#"{"customerId":"a:b:42","brandAccount":"B","gupshupChannel":"sms"}"#)
                .as_deref(),
            Some("sms::42::B")
        );
        assert_eq!(
            derived(r#"{"customerId":"42","brandAccount":"B","gupshupChannel":"sms"}"#).as_deref(),
            Some("sms::42::B")
        );
    }

    #[test]
    fn numeric_brand_account() {
        assert_eq!(
            derived(r#"{"customerId":"c:1","brandAccount":7,"gupshupChannel":"wa"}"#).as_deref(),
            Some("wa::1::7")
        );
    }

    #[test]
    fn missing_customer_or_brand() {
        assert_eq!(derived(r#"{"brandAccount":"B1","gupshupChannel":"wa"}"#), None);
        assert_eq!(derived(r#"{"customerId":"a:1","gupshupChannel":"wa"}"#), None);
    }

    #[test]
    fn null_fields_are_invalid() {
        assert!(matches!(
            derive_key(r#"{"customerId":null,"brandAccount":"B1","gupshupChannel":"wa"}"#),
            Err(DeriveError::InvalidField("customerId"))
        ));
        assert!(matches!(
            derive_key(r#"{"customerId":"a:1","brandAccount":null,"gupshupChannel":"wa"}"#),
            Err(DeriveError::InvalidField("brandAccount"))
        ));
        assert!(matches!(
            derive_key(r#"{"customerId":"a:1","brandAccount":"B1","gupshupChannel":null}"#),
            Err(DeriveError::InvalidField("gupshupChannel"))
        ));
        // The channel is checked before the type of the other fields.
        assert!(matches!(
            derive_key(r#"{"customerId":null,"brandAccount":"B1"}"#),
            Err(DeriveError::MissingField("gupshupChannel"))
        ));
    }

    #[test]
    fn not_an_object() {
        assert_eq!(derived("42"), None);
        assert_eq!(derived(r#"["customerId","brandAccount"]"#), None);
        assert_eq!(derived(r#""text""#), None);
    }

    #[test]
    fn missing_channel() {
        assert!(matches!(
            derive_key(r#"{"customerId":"a:1","brandAccount":"B1"}"#),
            Err(DeriveError::MissingField("gupshupChannel"))
        ));
    }

    #[test]
    fn invalid_customer_id() {
        assert!(matches!(
            derive_key(r#"{"customerId":5,"brandAccount":"B1","gupshupChannel":"wa"}"#),
            Err(DeriveError::InvalidField("customerId"))
        ));
    }

    #[test]
    fn invalid_json() {
        assert!(matches!(
            derive_key("not valid json"),
            Err(DeriveError::Parse(_))
        ));
    }
}
