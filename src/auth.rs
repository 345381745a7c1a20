use std::collections::HashSet;

use serde::{Deserialize, Serialize};

// ============================================================================
// Authorization Context
// ============================================================================
//
// Every core operation receives an explicit AuthContext instead of reading
// ambient session state. The context carries the resolved identity, the
// caller's permission set, and the ids of password-protected events whose
// gate the caller has already passed. Resolving all of this is the job of
// whatever fronts the service; the core only consumes it.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    BuyTickets,
    ManageOrders,
    ViewUsers,
    CreateEvents,
    Admin,
}

impl Permission {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "buy_tickets" => Some(Self::BuyTickets),
            "manage_orders" => Some(Self::ManageOrders),
            "view_users" => Some(Self::ViewUsers),
            "create_events" => Some(Self::CreateEvents),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Generic denial. Deliberately carries no detail about the target resource,
/// so a caller cannot learn whether it exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("permission denied")]
pub struct PermissionDenied;

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub permissions: HashSet<Permission>,
    /// Event ids whose password check succeeded earlier in this caller's
    /// session.
    pub event_access: HashSet<String>,
}

impl AuthContext {
    pub fn new(email: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
            display_name: String::new(),
            permissions: HashSet::new(),
            event_access: HashSet::new(),
        }
    }

    pub fn with_permissions<I>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = Permission>,
    {
        self.permissions = permissions.into_iter().collect();
        self
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn require(&self, permission: Permission) -> Result<(), PermissionDenied> {
        if self.has(permission) {
            Ok(())
        } else {
            Err(PermissionDenied)
        }
    }

    /// Short tag used as the prefix of payment references: the username, or
    /// the local part of the email address when no username is set.
    pub fn reference_tag(&self) -> &str {
        if !self.username.is_empty() {
            &self.username
        } else {
            self.email.split('@').next().unwrap_or(&self.email)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_checks_exact_permission() {
        let ctx = AuthContext::new("max@example.com", "max")
            .with_permissions([Permission::BuyTickets]);
        assert!(ctx.require(Permission::BuyTickets).is_ok());
        assert_eq!(ctx.require(Permission::ManageOrders), Err(PermissionDenied));
    }

    #[test]
    fn test_reference_tag_falls_back_to_email_local_part() {
        let ctx = AuthContext::new("max.mustermann@example.com", "");
        assert_eq!(ctx.reference_tag(), "max.mustermann");

        let ctx = AuthContext::new("max@example.com", "maxm");
        assert_eq!(ctx.reference_tag(), "maxm");
    }

    #[test]
    fn test_permission_parse_rejects_unknown() {
        assert_eq!(Permission::parse("manage_orders"), Some(Permission::ManageOrders));
        assert_eq!(Permission::parse(" admin "), Some(Permission::Admin));
        assert_eq!(Permission::parse("root"), None);
    }
}
