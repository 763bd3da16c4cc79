//! Per-request context threaded through every engine call.
//!
//! Carries the correlation id echoed in responses and logs, the
//! authenticated caller identity supplied by the auth collaborator, and a
//! cancellation token that aborts outbound work when the client goes away.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Caller role, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    User,
    Editor,
    Admin,
}

impl Role {
    /// Parses the role header value; unknown values fall back to `User`.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "editor" => Role::Editor,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }
}

/// Authenticated caller identity (verified upstream of this core).
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

/// Explicit request context, passed by value into every core operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    pub caller: Caller,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(caller: Caller) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            caller,
            cancel: CancellationToken::new(),
        }
    }

    /// Builds a context with a caller-supplied correlation id.
    pub fn with_correlation_id(caller: Caller, correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            caller,
            cancel: CancellationToken::new(),
        }
    }

    /// Context for internal/background work not tied to an HTTP request.
    pub fn background(job: &str) -> Self {
        Self {
            correlation_id: format!("{}-{}", job, Uuid::new_v4()),
            caller: Caller::new("system", Role::Admin),
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Requests cancellation of all work attached to this context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::User < Role::Editor);
        assert!(Role::Editor < Role::Admin);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("Admin"), Role::Admin);
        assert_eq!(Role::parse("editor"), Role::Editor);
        assert_eq!(Role::parse("user"), Role::User);
        assert_eq!(Role::parse("banana"), Role::User);
    }

    #[test]
    fn test_context_cancellation() {
        let ctx = RequestContext::new(Caller::new("u1", Role::User));
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_correlation_id_passthrough() {
        let ctx = RequestContext::with_correlation_id(Caller::new("u1", Role::User), "corr-42");
        assert_eq!(ctx.correlation_id, "corr-42");
    }
}
