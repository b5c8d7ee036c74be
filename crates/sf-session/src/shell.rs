//! Role-scoped shells
//!
//! The admin, vendor and support consoles each render only for their own role.

use crate::guard::{Access, Decision, RoleSet, RouteGuard};
use crate::session::SessionState;
use sf_common::Role;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shell {
    Admin,
    Vendor,
    Support,
}

impl Shell {
    pub const ALL: [Shell; 3] = [Shell::Admin, Shell::Vendor, Shell::Support];

    /// Shell owned by `role`; shoppers have none.
    pub fn for_role(role: Role) -> Option<Shell> {
        match role {
            Role::Admin => Some(Shell::Admin),
            Role::Vendor => Some(Shell::Vendor),
            Role::Support => Some(Shell::Support),
            Role::User => None,
        }
    }

    /// Shell whose views include `path`.
    pub fn for_path(path: &str) -> Option<Shell> {
        let path = path.split(['?', '#']).next().unwrap_or("");
        Shell::ALL.into_iter().find(|shell| {
            let base = shell.base_path();
            path == base
                || path
                    .strip_prefix(base)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn required_roles(&self) -> RoleSet {
        match self {
            Shell::Admin => RoleSet::only(Role::Admin),
            Shell::Vendor => RoleSet::only(Role::Vendor),
            Shell::Support => RoleSet::only(Role::Support),
        }
    }

    pub fn base_path(&self) -> &'static str {
        match self {
            Shell::Admin => "/admin",
            Shell::Vendor => "/vendor",
            Shell::Support => "/support",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Shell::Admin => "Administration",
            Shell::Vendor => "Vendor Dashboard",
            Shell::Support => "Support Desk",
        }
    }

    /// Ask the guard whether this shell may render for `state`.
    pub fn admit(&self, guard: &RouteGuard, state: &SessionState) -> Decision {
        guard.check(state, &Access::Authenticated(self.required_roles()))
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_common::Identity;
    use sf_config::RouteConfig;

    fn state(role: Role) -> SessionState {
        SessionState::Authenticated(Identity {
            id: "1".to_string(),
            email: "s@x.com".to_string(),
            display_name: None,
            first_name: None,
            last_name: None,
            role,
        })
    }

    #[test]
    fn test_shell_admits_only_its_role() {
        let guard = RouteGuard::storefront(RouteConfig::default());
        for shell in Shell::ALL {
            for role in Role::ALL {
                let decision = shell.admit(&guard, &state(role));
                if Shell::for_role(role) == Some(shell) {
                    assert_eq!(decision, Decision::Allow);
                } else {
                    assert_eq!(decision, Decision::Redirect("/".to_string()));
                }
            }
        }
    }

    #[test]
    fn test_base_path_matches_route_table() {
        let guard = RouteGuard::storefront(RouteConfig::default());
        for shell in Shell::ALL {
            assert_eq!(
                guard.table().access_for(shell.base_path()),
                Access::Authenticated(shell.required_roles())
            );
        }
    }

    #[test]
    fn test_for_path() {
        assert_eq!(Shell::for_path("/admin/users?page=1"), Some(Shell::Admin));
        assert_eq!(Shell::for_path("/vendor"), Some(Shell::Vendor));
        assert_eq!(Shell::for_path("/supporters"), None);
        assert_eq!(Shell::for_path("/"), None);
    }

    #[test]
    fn test_shell_defers_while_unknown() {
        let guard = RouteGuard::storefront(RouteConfig::default());
        assert_eq!(Shell::Admin.admit(&guard, &SessionState::Unknown), Decision::Defer);
    }
}
