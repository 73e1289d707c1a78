//! Error types for the lockstep-env crate.
//!
//! Two layers: [`StateError`] for the shared-state store itself, and
//! [`EnvironmentError`] for everything the connector reports back to
//! participants and to the code that assembles an environment.
//! [`HandlerError`] is what action handlers return internally; the
//! connector folds it into [`EnvironmentError::ActionExecutionFailed`].

use core::fmt;
use std::any::Any;

use lockstep_types::{ActionTag, ParticipantId, PayloadError, StateKey};

use crate::handler::HandlerId;

/// Errors raised by the shared-state store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// No value has been written for the key.
    #[error("state key not found: {key}")]
    NotFound {
        /// The key that was read.
        key: StateKey,
    },

    /// The caller does not own the key it tried to write.
    #[error("handler {caller} may not write `{key}` (owner: {owner})")]
    Unauthorized {
        /// The key that was written.
        key: StateKey,
        /// The handler that attempted the write.
        caller: HandlerId,
        /// The owning handler, or `none` if no handler owns the key.
        owner: OwnerLabel,
    },
}

/// Display helper for the owner of a state key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerLabel(pub Option<HandlerId>);

impl fmt::Display for OwnerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{id}"),
            None => f.write_str("none"),
        }
    }
}

/// The thing two handlers both tried to claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipClaim {
    /// An action tag.
    Tag(ActionTag),
    /// A shared-state key.
    Key(StateKey),
}

impl fmt::Display for OwnershipClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, "action tag `{tag}`"),
            Self::Key(key) => write!(f, "state key `{key}`"),
        }
    }
}

/// Errors reported by the environment connector and its builder.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    /// The participant is already registered.
    #[error("participant {participant} is already registered")]
    AlreadyRegistered {
        /// The participant that tried to register twice.
        participant: ParticipantId,
    },

    /// The actor is not registered, or the key is not its current key.
    #[error("invalid authorization for participant {participant}")]
    InvalidAuthorization {
        /// The participant named in the call.
        participant: ParticipantId,
    },

    /// Two handlers claim the same action tag or state key.
    #[error("{claim} is already owned by handler `{owner}`; `{claimant}` cannot claim it")]
    ConflictingOwnership {
        /// What was claimed twice.
        claim: OwnershipClaim,
        /// Name of the handler that already owns the claim.
        owner: String,
        /// Name of the handler whose registration was refused.
        claimant: String,
    },

    /// No registered handler accepts the action's tag.
    #[error("no handler accepts action `{tag}`")]
    NoHandlerFound {
        /// The unroutable tag.
        tag: ActionTag,
    },

    /// The handler returned an error or panicked while processing the action.
    #[error("handler `{handler}` failed on action `{tag}`: {reason}")]
    ActionExecutionFailed {
        /// The action's tag.
        tag: ActionTag,
        /// Name of the failing handler.
        handler: String,
        /// Description of the failure.
        reason: String,
    },

    /// No service of the requested type is currently available.
    #[error("environment service unavailable: {service}")]
    UnavailableService {
        /// Type name of the requested service.
        service: &'static str,
    },

    /// The tick the action was submitted in has already closed.
    #[error("tick {tick} is closed; actions are accepted only while a tick is running")]
    TickClosed {
        /// The most recently closed tick.
        tick: u64,
    },

    /// The environment could not be assembled.
    #[error("invalid environment configuration: {reason}")]
    Configuration {
        /// Explanation of what is wrong.
        reason: String,
    },
}

/// Errors an action handler may return from
/// [`ActionHandler::handle`](crate::handler::ActionHandler::handle).
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A shared-state operation failed.
    #[error(transparent)]
    State(#[from] StateError),

    /// The action payload did not match the handler's parameter type.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// Any other handler-specific failure.
    #[error("{reason}")]
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

impl HandlerError {
    /// Creates a handler-specific failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Text of a caught panic payload.
///
/// Used for both handler panics and participant/plugin hook panics, so the
/// two report the same message.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
