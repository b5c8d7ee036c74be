//! Route Guard
//!
//! Decides whether a view is reachable from the current session state.

use crate::session::SessionState;
use sf_common::Role;
use sf_config::RouteConfig;
use std::fmt;

/// Set of roles; empty means "any authenticated user".
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const ANY: RoleSet = RoleSet(0);

    pub fn of(roles: &[Role]) -> Self {
        roles.iter().fold(Self::ANY, |set, role| set.with(*role))
    }

    pub fn only(role: Role) -> Self {
        Self::ANY.with(role)
    }

    pub fn with(self, role: Role) -> Self {
        RoleSet(self.0 | Self::bit(role))
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0 & Self::bit(role) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Whether `role` satisfies this requirement
    pub fn admits(&self, role: Role) -> bool {
        self.is_empty() || self.contains(role)
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL.into_iter().filter(move |role| self.contains(*role))
    }

    fn bit(role: Role) -> u8 {
        match role {
            Role::User => 1,
            Role::Vendor => 1 << 1,
            Role::Support => 1 << 2,
            Role::Admin => 1 << 3,
        }
    }
}

impl fmt::Debug for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("RoleSet(ANY)");
        }
        f.debug_set().entries(self.iter()).finish()
    }
}

/// What a view requires of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Reachable by anyone
    Public,
    /// Login and registration forms; never shown to a signed-in session
    EntryOnly,
    /// Requires a session whose role is in the set (empty set: any role)
    Authenticated(RoleSet),
}

impl Access {
    pub fn any_authenticated() -> Self {
        Access::Authenticated(RoleSet::ANY)
    }

    pub fn roles(roles: &[Role]) -> Self {
        Access::Authenticated(RoleSet::of(roles))
    }
}

/// Outcome of a guard check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Session not yet known; render a neutral loading state
    Defer,
    Redirect(String),
}

/// Path prefix rules; the longest matching prefix wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<(String, Access)>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storefront views and the shells that own them. The login view is
    /// whatever `routes.login` names.
    pub fn storefront(routes: &RouteConfig) -> Self {
        Self::new()
            .rule(routes.login.as_str(), Access::EntryOnly)
            .rule("/register", Access::EntryOnly)
            .rule("/profile", Access::any_authenticated())
            .rule("/orders", Access::any_authenticated())
            .rule("/cart/checkout", Access::any_authenticated())
            .rule("/admin", Access::roles(&[Role::Admin]))
            .rule("/vendor", Access::roles(&[Role::Vendor]))
            .rule("/support", Access::roles(&[Role::Support]))
    }

    pub fn rule(mut self, prefix: impl Into<String>, access: Access) -> Self {
        self.rules.push((normalize(&prefix.into()), access));
        self
    }

    /// Requirement for `path`; unmatched paths are public.
    pub fn access_for(&self, path: &str) -> Access {
        let path = normalize(path);
        self.rules
            .iter()
            .filter(|(prefix, _)| matches_prefix(&path, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, access)| *access)
            .unwrap_or(Access::Public)
    }
}

/// Strip query/fragment and any trailing slash (except for the root).
fn normalize(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or("");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// `/admin` matches `/admin` and `/admin/users`, not `/administrator`.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Gate between session state and views
#[derive(Debug, Clone)]
pub struct RouteGuard {
    routes: RouteConfig,
    table: RouteTable,
}

impl RouteGuard {
    pub fn new(routes: RouteConfig, table: RouteTable) -> Self {
        Self { routes, table }
    }

    /// Guard over [`RouteTable::storefront`]
    pub fn storefront(routes: RouteConfig) -> Self {
        let table = RouteTable::storefront(&routes);
        Self::new(routes, table)
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Decide for a view with the given requirement.
    pub fn check(&self, state: &SessionState, access: &Access) -> Decision {
        match (access, state) {
            (Access::Public, _) => Decision::Allow,

            (_, SessionState::Unknown) => Decision::Defer,

            (Access::EntryOnly, SessionState::Authenticated(identity)) => {
                Decision::Redirect(self.routes.landing_for(identity.role).to_string())
            }
            (Access::EntryOnly, _) => Decision::Allow,

            (Access::Authenticated(roles), SessionState::Authenticated(identity)) => {
                if roles.admits(identity.role) {
                    Decision::Allow
                } else {
                    Decision::Redirect(self.routes.home.clone())
                }
            }
            (Access::Authenticated(_), _) => Decision::Redirect(self.routes.login.clone()),
        }
    }

    /// Decide for a navigation target path.
    pub fn resolve(&self, state: &SessionState, path: &str) -> Decision {
        let access = self.table.access_for(path);
        self.check(state, &access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_common::Identity;

    fn authenticated(role: Role) -> SessionState {
        SessionState::Authenticated(Identity {
            id: "1".to_string(),
            email: "a@x.com".to_string(),
            display_name: None,
            first_name: None,
            last_name: None,
            role,
        })
    }

    fn guard() -> RouteGuard {
        RouteGuard::storefront(RouteConfig::default())
    }

    #[test]
    fn test_role_set() {
        let set = RoleSet::of(&[Role::Admin, Role::Support]);
        assert!(set.contains(Role::Admin));
        assert!(!set.contains(Role::Vendor));
        assert!(RoleSet::ANY.admits(Role::Vendor));
        assert!(!set.admits(Role::User));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Role::Support, Role::Admin]);
    }

    #[test]
    fn test_access_for_prefix_matching() {
        let table = RouteTable::storefront(&RouteConfig::default());
        assert_eq!(table.access_for("/admin/users?page=2"), Access::roles(&[Role::Admin]));
        assert_eq!(table.access_for("/administrator"), Access::Public);
        assert_eq!(table.access_for("/login/"), Access::EntryOnly);
        assert_eq!(table.access_for("/products/12"), Access::Public);
        assert_eq!(table.access_for("orders"), Access::any_authenticated());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = RouteTable::new()
            .rule("/vendor", Access::roles(&[Role::Vendor]))
            .rule("/vendor/apply", Access::any_authenticated());
        assert_eq!(table.access_for("/vendor/apply"), Access::any_authenticated());
        assert_eq!(table.access_for("/vendor/products"), Access::roles(&[Role::Vendor]));
    }

    #[test]
    fn test_unknown_defers_protected_views() {
        let guard = guard();
        assert_eq!(guard.resolve(&SessionState::Unknown, "/admin"), Decision::Defer);
        assert_eq!(guard.resolve(&SessionState::Unknown, "/login"), Decision::Defer);
        assert_eq!(guard.resolve(&SessionState::Unknown, "/"), Decision::Allow);
    }

    #[test]
    fn test_anonymous_redirects_to_login() {
        let guard = guard();
        for state in [SessionState::Anonymous, SessionState::Authenticating] {
            assert_eq!(
                guard.resolve(&state, "/orders"),
                Decision::Redirect("/login".to_string())
            );
            assert_eq!(guard.resolve(&state, "/login"), Decision::Allow);
        }
    }

    #[test]
    fn test_entry_views_redirect_to_landing() {
        let guard = guard();
        assert_eq!(
            guard.resolve(&authenticated(Role::Admin), "/login"),
            Decision::Redirect("/admin".to_string())
        );
        assert_eq!(
            guard.resolve(&authenticated(Role::User), "/register"),
            Decision::Redirect("/".to_string())
        );
    }

    #[test]
    fn test_configured_login_view_is_entry_only() {
        let routes = RouteConfig {
            login: "/signin".to_string(),
            ..RouteConfig::default()
        };
        let guard = RouteGuard::storefront(routes);

        assert_eq!(guard.table().access_for("/signin"), Access::EntryOnly);
        assert_eq!(guard.table().access_for("/register"), Access::EntryOnly);
        assert_eq!(
            guard.resolve(&authenticated(Role::User), "/signin"),
            Decision::Redirect("/".to_string())
        );
        assert_eq!(
            guard.resolve(&authenticated(Role::Vendor), "/signin"),
            Decision::Redirect("/vendor".to_string())
        );
        assert_eq!(guard.resolve(&SessionState::Anonymous, "/signin"), Decision::Allow);
        assert_eq!(
            guard.resolve(&SessionState::Anonymous, "/orders"),
            Decision::Redirect("/signin".to_string())
        );
    }

    /// Every role against every view category.
    #[test]
    fn test_role_matrix() {
        let guard = guard();
        let categories: [(&str, Access); 5] = [
            ("public", Access::Public),
            ("any-authenticated", Access::any_authenticated()),
            ("admin-only", Access::roles(&[Role::Admin])),
            ("vendor-only", Access::roles(&[Role::Vendor])),
            ("support-only", Access::roles(&[Role::Support])),
        ];

        for role in Role::ALL {
            let state = authenticated(role);
            for (name, access) in &categories {
                let granted = match access {
                    Access::Public => true,
                    Access::Authenticated(set) => set.is_empty() || set.contains(role),
                    Access::EntryOnly => unreachable!(),
                };
                let expected = if granted {
                    Decision::Allow
                } else {
                    Decision::Redirect("/".to_string())
                };
                assert_eq!(guard.check(&state, access), expected, "{} on {}", role, name);
            }
        }
    }
}
