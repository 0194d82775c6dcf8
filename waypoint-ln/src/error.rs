//! Structured errors for the command surface and the collaborator RPCs.
//!
//! Cleanup is always driven on a command's exit path, never at the point of
//! error detection; errors here only carry what the caller needs to react:
//! an RPC code, a message, and optionally the failing sub-command.

use serde::{Deserialize, Serialize};

use crate::route::Exclusion;

/// JSON-RPC error codes used across the command surface.
pub mod code {
    /// Caller fault: bad parameters.
    pub const PARAM: i32 = -32602;
    /// Catch-all.
    pub const OTHER: i32 = -1;
    /// Funding amount exceeds what the peer accepts.
    pub const FUND_MAX_EXCEEDED: i32 = 300;
    /// Wallet cannot afford the requested outputs.
    pub const FUND_CANNOT_AFFORD: i32 = 301;
    /// A requested output is below the dust limit.
    pub const FUND_OUTPUT_IS_DUST: i32 = 302;
    /// The funding transaction failed to broadcast.
    pub const FUND_BROADCAST_FAIL: i32 = 303;
    /// No route could be found.
    pub const PAY_ROUTE_NOT_FOUND: i32 = 205;
    /// The acceleration backend no longer knows the txacc id, meaning a
    /// child of the original transaction has confirmed.
    pub const ACCEL_ID_NOT_FOUND: i32 = 320;
}

/// A transport-level error from an external collaborator.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// What class of failure a [`CommandError`] represents; drives the caller's
/// recovery, not the wire encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller fault; recoverable upstream. The orchestrator preserves
    /// reservations so the caller can fix its parameters and retry.
    Param,
    /// Peer slow, gossip race; retried or deferred locally.
    Transient,
    /// Fee or CLTV budget exceeded. Carries a hint for the caller's exclude
    /// set: the edge which most contributed to the violated budget.
    BudgetExceeded { hint: Exclusion },
    /// No route found.
    Unreachable,
    /// A peer refused; cleanup has been performed.
    Protocol,
    /// The transaction may have been published despite the error. The
    /// state machine treats this as success: destinations remain done.
    AmbiguousBroadcast,
    Other,
}

/// A structured error from a core command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandError {
    pub code: i32,
    pub message: String,
    /// The failing sub-command, when the failure came from a collaborator.
    pub sub_command: Option<&'static str>,
    pub kind: ErrorKind,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self.code;
        let message = &self.message;
        write!(f, "{message} (code {code}")?;
        if let Some(sub) = self.sub_command {
            write!(f, ", in {sub}")?;
        }
        write!(f, ")")
    }
}

impl std::error::Error for CommandError {}

impl CommandError {
    pub fn param(message: impl Into<String>) -> Self {
        Self {
            code: code::PARAM,
            message: message.into(),
            sub_command: None,
            kind: ErrorKind::Param,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            code: code::OTHER,
            message: message.into(),
            sub_command: None,
            kind: ErrorKind::Other,
        }
    }

    pub fn unreachable(
        message: impl Into<String>,
        sub_command: Option<&'static str>,
    ) -> Self {
        Self {
            code: code::PAY_ROUTE_NOT_FOUND,
            message: message.into(),
            sub_command,
            kind: ErrorKind::Unreachable,
        }
    }

    pub fn budget_exceeded(message: impl Into<String>, hint: Exclusion) -> Self {
        Self {
            code: code::PAY_ROUTE_NOT_FOUND,
            message: message.into(),
            sub_command: None,
            kind: ErrorKind::BudgetExceeded { hint },
        }
    }

    pub fn protocol(
        code: i32,
        message: impl Into<String>,
        sub_command: Option<&'static str>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            sub_command,
            kind: ErrorKind::Protocol,
        }
    }

    pub fn ambiguous_broadcast(message: impl Into<String>) -> Self {
        Self {
            code: code::FUND_BROADCAST_FAIL,
            message: message.into(),
            sub_command: Some("txsend"),
            kind: ErrorKind::AmbiguousBroadcast,
        }
    }

    /// Wrap a collaborator failure, preserving its code and naming the
    /// failing sub-command.
    pub fn from_rpc(err: RpcError, sub_command: &'static str) -> Self {
        Self {
            code: err.code,
            message: err.message,
            sub_command: Some(sub_command),
            kind: ErrorKind::Protocol,
        }
    }

    pub fn is_param(&self) -> bool {
        matches!(self.kind, ErrorKind::Param)
    }
}
