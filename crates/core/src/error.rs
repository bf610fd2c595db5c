//! Errors raised by the quest domain itself.
//!
//! Storage, transport and queue failures have their own types in the
//! infrastructure crate.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Merchant-supplied shop, quest or reward data is unusable.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier did not parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Progress may only move forward through its states.
    #[error("progress cannot move from {from} to {to}")]
    IllegalTransition { from: &'static str, to: &'static str },

    /// The progress record was already rewarded, with the given reward.
    #[error("progress already rewarded with reward {0}")]
    AlreadyRewarded(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_state() {
        let transition = DomainError::IllegalTransition { from: "IN_PROGRESS", to: "REWARDED" };
        assert_eq!(transition.to_string(), "progress cannot move from IN_PROGRESS to REWARDED");
        assert_eq!(
            DomainError::validation("name must not be empty").to_string(),
            "validation failed: name must not be empty"
        );
    }
}
