//! Claim predicate validators.
//!
//! Each predicate is a self-contained rule inspecting one claim of a
//! verified token. New predicate kinds plug in through [`ClaimPredicate`]
//! without touching the verifier's control flow.

use serde_json::Value;
use thiserror::Error;

use crate::claims::ClaimSet;

/// Why a predicate rejected a claim. Diagnostics only; never exposed
/// verbatim to the unauthenticated caller.
#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("claim {0:?} not found")]
    Absent(String),
    #[error("claim {0:?} is not a {1}")]
    WrongType(String, &'static str),
    #[error("{0:?} not satisfied")]
    Mismatch(String),
}

/// A rule evaluated against the verified claim set.
pub trait ClaimPredicate: Send + Sync {
    fn evaluate(&self, claims: &ClaimSet) -> Result<(), PredicateError>;
}

/// Passes when the named claim is a list containing `value`, compared as
/// strings case-insensitively. Scalar claims fail as the wrong type even
/// when textually equal.
pub struct ClaimContainsString {
    pub claim: String,
    pub value: String,
}

impl ClaimPredicate for ClaimContainsString {
    fn evaluate(&self, claims: &ClaimSet) -> Result<(), PredicateError> {
        let value = claims
            .get(&self.claim)
            .ok_or_else(|| PredicateError::Absent(self.claim.clone()))?;
        let items = value
            .as_array()
            .ok_or_else(|| PredicateError::WrongType(self.claim.clone(), "list"))?;

        let found = items.iter().any(|item| {
            item.as_str()
                .is_some_and(|s| s.eq_ignore_ascii_case(&self.value))
        });
        if found {
            Ok(())
        } else {
            Err(PredicateError::Mismatch(self.claim.clone()))
        }
    }
}

/// Passes when the named claim is a string equal to `value` under
/// case-insensitive comparison.
pub struct ClaimEqualsIgnoreCase {
    pub claim: String,
    pub value: String,
}

impl ClaimPredicate for ClaimEqualsIgnoreCase {
    fn evaluate(&self, claims: &ClaimSet) -> Result<(), PredicateError> {
        let value = claims
            .get(&self.claim)
            .ok_or_else(|| PredicateError::Absent(self.claim.clone()))?;
        let s = value
            .as_str()
            .ok_or_else(|| PredicateError::WrongType(self.claim.clone(), "string"))?;

        if s.eq_ignore_ascii_case(&self.value) {
            Ok(())
        } else {
            Err(PredicateError::Mismatch(self.claim.clone()))
        }
    }
}

/// The predicate behind `verify_claims` entries: dispatches on the
/// actual claim type, so a scalar role claim and a role list both work
/// against the same configured value.
pub struct ClaimMatchesString {
    pub claim: String,
    pub value: String,
}

impl ClaimPredicate for ClaimMatchesString {
    fn evaluate(&self, claims: &ClaimSet) -> Result<(), PredicateError> {
        match claims.get(&self.claim) {
            None => Err(PredicateError::Absent(self.claim.clone())),
            Some(Value::String(_)) => ClaimEqualsIgnoreCase {
                claim: self.claim.clone(),
                value: self.value.clone(),
            }
            .evaluate(claims),
            Some(Value::Array(_)) => ClaimContainsString {
                claim: self.claim.clone(),
                value: self.value.clone(),
            }
            .evaluate(claims),
            Some(_) => Err(PredicateError::WrongType(
                self.claim.clone(),
                "string or list",
            )),
        }
    }
}
