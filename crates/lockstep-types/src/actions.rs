//! Action and outcome types for participant-to-environment communication.
//!
//! An [`Action`] is a tagged, opaque payload. The kernel routes it by its
//! [`ActionTag`] and never looks inside the payload; the handler that owns
//! the tag deserializes the payload into its own parameter type via
//! [`Action::params`].

use core::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Discriminator that selects which handler accepts an [`Action`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionTag(String);

impl ActionTag {
    /// Create a tag from any string-like value.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Borrow the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionTag {
    fn from(tag: &str) -> Self {
        Self(tag.to_owned())
    }
}

impl From<String> for ActionTag {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

/// Errors converting between typed parameters and an action payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The typed parameters could not be serialized into a payload.
    #[error("failed to encode parameters for action `{tag}`: {source}")]
    Encode {
        /// Tag of the action being built.
        tag: ActionTag,
        /// The underlying serialization error.
        source: serde_json::Error,
    },

    /// The payload does not match the parameter type the handler expects.
    #[error("malformed payload for action `{tag}`: {source}")]
    Decode {
        /// Tag of the action being decoded.
        tag: ActionTag,
        /// The underlying deserialization error.
        source: serde_json::Error,
    },
}

/// An intended state change submitted by a participant.
///
/// Fields are private: once built, an action cannot be altered on its way
/// through the connector to the handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    tag: ActionTag,
    #[serde(default)]
    payload: serde_json::Value,
}

impl Action {
    /// Build an action from a tag and a raw JSON payload.
    pub fn new(tag: impl Into<ActionTag>, payload: serde_json::Value) -> Self {
        Self {
            tag: tag.into(),
            payload,
        }
    }

    /// Build an action that carries no payload.
    pub fn bare(tag: impl Into<ActionTag>) -> Self {
        Self::new(tag, serde_json::Value::Null)
    }

    /// Build an action by serializing typed parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Encode`] if `params` cannot be serialized.
    pub fn with_params<P: Serialize>(
        tag: impl Into<ActionTag>,
        params: &P,
    ) -> Result<Self, PayloadError> {
        let tag = tag.into();
        match serde_json::to_value(params) {
            Ok(payload) => Ok(Self { tag, payload }),
            Err(source) => Err(PayloadError::Encode { tag, source }),
        }
    }

    /// The tag used to route this action.
    pub const fn tag(&self) -> &ActionTag {
        &self.tag
    }

    /// The raw payload.
    pub const fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Decode the payload into the handler's parameter type.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Decode`] if the payload does not match `P`.
    pub fn params<P: DeserializeOwned>(&self) -> Result<P, PayloadError> {
        P::deserialize(&self.payload).map_err(|source| PayloadError::Decode {
            tag: self.tag.clone(),
            source,
        })
    }
}

/// What a handler reports back after processing an action.
///
/// A `Rejected` outcome is a normal, successful dispatch: the handler looked
/// at the action and declined it on domain grounds (target occupied, not
/// enough of something). Handler crashes are reported separately as errors
/// by the connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The handler applied the action to shared state.
    Applied {
        /// Handler-specific response data (`null` when there is none).
        #[serde(default)]
        response: serde_json::Value,
    },
    /// The handler declined the action; shared state is unchanged.
    Rejected {
        /// Human-readable reason for the rejection.
        reason: String,
    },
}

impl ActionOutcome {
    /// An applied outcome with no response data.
    pub const fn applied() -> Self {
        Self::Applied {
            response: serde_json::Value::Null,
        }
    }

    /// An applied outcome carrying response data.
    pub const fn applied_with(response: serde_json::Value) -> Self {
        Self::Applied { response }
    }

    /// A rejected outcome with the given reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Whether the action was applied.
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}
