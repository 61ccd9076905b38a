//! Verified claim set access and stringification.
//!
//! Claims are dynamically typed JSON values. This module provides the
//! dot-notation path traversal used by meta claim rules and the uniform
//! stringification policy applied when projecting claims into user
//! metadata. Stringification is best-effort: unsupported shapes become
//! an empty string, never an error.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Registered claims that carry an epoch timestamp. When projected into
/// metadata they are rendered as RFC 3339 text rather than raw seconds.
const TEMPORAL_CLAIMS: &[&str] = &["exp", "iat", "nbf"];

/// The claims of a verified token, immutable after verification.
#[derive(Debug, Clone)]
pub struct ClaimSet(Map<String, Value>);

impl ClaimSet {
    pub fn new(claims: Map<String, Value>) -> Self {
        ClaimSet(claims)
    }

    /// Fetch a top-level claim by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Resolve a claim by dot-separated path, e.g. `settings.payout.enabled`.
    ///
    /// Each segment indexes into a nested JSON object. A missing segment
    /// at any depth resolves to `None`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Resolve a claim path and stringify it.
    ///
    /// Top-level `exp`/`iat`/`nbf` are rendered as RFC 3339; everything
    /// else goes through [`stringify`].
    pub fn stringify_path(&self, path: &str) -> String {
        let value = match self.get_path(path) {
            Some(v) => v,
            None => return String::new(),
        };
        if TEMPORAL_CLAIMS.contains(&path) {
            if let Some(ts) = as_epoch_seconds(value) {
                return stringify_timestamp(ts);
            }
        }
        stringify(value)
    }
}

/// Stringify a claim value for user metadata.
///
/// Policy: null -> ""; string -> itself; bool -> "true"/"false";
/// number -> decimal text; list of scalars -> elements joined with ","
/// (no spaces); any other composite -> "".
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Array(_) | Value::Object(_) => return String::new(),
                    scalar => parts.push(stringify(scalar)),
                }
            }
            parts.join(",")
        }
        Value::Object(_) => String::new(),
    }
}

/// Render epoch seconds as RFC 3339 in UTC, keeping sub-second precision
/// when present.
fn stringify_timestamp(epoch_seconds: f64) -> String {
    let secs = epoch_seconds.trunc() as i64;
    let nanos = ((epoch_seconds - epoch_seconds.trunc()) * 1e9).round() as u32;
    match DateTime::<Utc>::from_timestamp(secs, nanos) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        None => String::new(),
    }
}

fn as_epoch_seconds(value: &Value) -> Option<f64> {
    value.as_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn claim_set(value: Value) -> ClaimSet {
        match value {
            Value::Object(map) => ClaimSet::new(map),
            _ => panic!("claim set fixtures must be JSON objects"),
        }
    }

    #[rstest]
    #[case(json!(null), "")]
    #[case(json!("abc"), "abc")]
    #[case(json!(true), "true")]
    #[case(json!(false), "false")]
    #[case(json!(1991), "1991")]
    #[case(json!(19911110), "19911110")]
    #[case(json!(["csgo", "dota2"]), "csgo,dota2")]
    #[case(json!([1, 2, 3]), "1,2,3")]
    #[case(json!([true, "x", 7]), "true,x,7")]
    #[case(json!({"nested": "object"}), "")]
    #[case(json!([["nested"], "list"]), "")]
    fn test_stringify(#[case] input: Value, #[case] expected: &str) {
        assert_eq!(stringify(&input), expected);
    }

    #[test]
    fn test_get_path_top_level() {
        let claims = claim_set(json!({"sub": "ggicci", "uid": 19911110}));
        assert_eq!(claims.get_path("sub"), Some(&json!("ggicci")));
        assert_eq!(claims.get_path("uid"), Some(&json!(19911110)));
        assert_eq!(claims.get_path("absent"), None);
    }

    #[test]
    fn test_get_path_nested() {
        let claims = claim_set(json!({
            "settings": {
                "role": "admin",
                "payout": {"paypal": {"enabled": true}}
            }
        }));
        assert_eq!(claims.get_path("settings.role"), Some(&json!("admin")));
        assert_eq!(
            claims.get_path("settings.payout.paypal.enabled"),
            Some(&json!(true))
        );
        // missing at any depth is not an error
        assert_eq!(claims.get_path("settings.payout.alipay.enabled"), None);
        assert_eq!(claims.get_path("settings.role.deeper"), None);
    }

    #[test]
    fn test_stringify_path_applies_policy() {
        let claims = claim_set(json!({
            "IsAdmin": true,
            "groups": ["csgo", "dota2"],
            "settings": {"role": "admin"}
        }));
        assert_eq!(claims.stringify_path("IsAdmin"), "true");
        assert_eq!(claims.stringify_path("groups"), "csgo,dota2");
        assert_eq!(claims.stringify_path("settings.role"), "admin");
        assert_eq!(claims.stringify_path("absent"), "");
        assert_eq!(claims.stringify_path("settings"), "");
    }

    #[test]
    fn test_stringify_path_renders_temporal_claims_as_rfc3339() {
        let claims = claim_set(json!({"exp": 946826598, "iat": 946826598}));
        assert_eq!(claims.stringify_path("exp"), "2000-01-02T15:23:18Z");
        assert_eq!(claims.stringify_path("iat"), "2000-01-02T15:23:18Z");
    }
}
