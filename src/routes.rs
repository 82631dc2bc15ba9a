//! Route table and per-navigation authorization.
//!
//! Every route declares the capability it requires and the page shown to
//! admins and to users. The gate's `AuthState` is evaluated once per
//! navigation and `Router::navigate` turns it into a single decision.

use crate::gate::AuthState;

pub const LOGIN_PATH: &str = "/login";
pub const USER_HOME_PATH: &str = "/home";
pub const ROOT_PATH: &str = "/";
pub const FORBIDDEN_PATH: &str = "/403";

/// What a visitor needs to get past a route or action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Public,
    AuthenticatedAny,
    AuthenticatedAdmin,
}

/// Outcome of checking a capability against the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    LoginRequired,
    AdminRequired,
}

pub fn authorize(capability: Capability, state: AuthState) -> Access {
    match (capability, state) {
        (Capability::Public, _) => Access::Granted,
        (_, AuthState::Anonymous) => Access::LoginRequired,
        (Capability::AuthenticatedAny, _) => Access::Granted,
        (Capability::AuthenticatedAdmin, AuthState::AuthenticatedAdmin) => Access::Granted,
        (Capability::AuthenticatedAdmin, AuthState::AuthenticatedUser) => Access::AdminRequired,
    }
}

/// Pages the client can render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Login,
    Register,
    AdminOrchids,
    UserHome,
    AdminCategories,
    CategoryDisplay,
    OrchidDetail,
    EditOrchid,
    UserOrders,
    AdminOrders,
    Accounts,
    Employees,
    Forbidden,
    NotFound,
}

#[derive(Debug, Clone, Copy)]
pub struct RouteEntry {
    pub pattern: &'static str,
    pub capability: Capability,
    pub admin_page: Page,
    pub user_page: Page,
}

const fn route(pattern: &'static str, capability: Capability, page: Page) -> RouteEntry {
    RouteEntry {
        pattern,
        capability,
        admin_page: page,
        user_page: page,
    }
}

const fn branching(pattern: &'static str, admin_page: Page, user_page: Page) -> RouteEntry {
    RouteEntry {
        pattern,
        capability: Capability::AuthenticatedAny,
        admin_page,
        user_page,
    }
}

pub const ROUTES: &[RouteEntry] = &[
    route("/login", Capability::Public, Page::Login),
    route("/register", Capability::Public, Page::Register),
    branching("/", Page::AdminOrchids, Page::UserHome),
    route("/home", Capability::AuthenticatedAny, Page::UserHome),
    route("/orchids", Capability::AuthenticatedAdmin, Page::AdminOrchids),
    branching("/categories", Page::AdminCategories, Page::CategoryDisplay),
    route("/detail/:id", Capability::AuthenticatedAny, Page::OrchidDetail),
    route("/edit/:id", Capability::AuthenticatedAdmin, Page::EditOrchid),
    route("/user-orders", Capability::AuthenticatedAny, Page::UserOrders),
    route("/admin-orders", Capability::AuthenticatedAdmin, Page::AdminOrders),
    route("/accounts", Capability::AuthenticatedAdmin, Page::Accounts),
    route("/employees", Capability::AuthenticatedAdmin, Page::Employees),
    route("/403", Capability::Public, Page::Forbidden),
];

const NOT_FOUND: RouteEntry = route("*", Capability::Public, Page::NotFound);

/// A path matched against the table
#[derive(Debug, Clone)]
pub struct Resolved {
    pub entry: RouteEntry,
    pub id: Option<String>,
}

/// What the client does after a navigation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Render { page: Page, id: Option<String> },
    Redirect(&'static str),
}

#[derive(Debug, Default)]
pub struct Router;

impl Router {
    pub fn new() -> Self {
        Self
    }

    /// Match a path against the table. Unknown paths resolve to the
    /// not-found page.
    pub fn resolve(&self, path: &str) -> Resolved {
        let path = normalize(path);
        for entry in ROUTES {
            if let Some(id) = match_pattern(entry.pattern, &path) {
                return Resolved { entry: *entry, id };
            }
        }
        Resolved {
            entry: NOT_FOUND,
            id: None,
        }
    }

    /// Decide whether to render a page or redirect
    pub fn navigate(&self, path: &str, state: AuthState) -> Navigation {
        let resolved = self.resolve(path);
        match authorize(resolved.entry.capability, state) {
            Access::Granted => {
                let page = if state.is_admin() {
                    resolved.entry.admin_page
                } else {
                    resolved.entry.user_page
                };
                Navigation::Render {
                    page,
                    id: resolved.id,
                }
            }
            Access::LoginRequired => Navigation::Redirect(LOGIN_PATH),
            Access::AdminRequired => Navigation::Redirect(USER_HOME_PATH),
        }
    }
}

/// Strip query, fragment and trailing slashes
pub fn normalize(path: &str) -> String {
    let path = path.split(&['?', '#'][..]).next().unwrap_or("");
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        ROOT_PATH.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Returns `Some(param)` when the path matches. `:id` segments capture a
/// non-empty value.
fn match_pattern(pattern: &str, path: &str) -> Option<Option<String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let path_parts: Vec<&str> = path.split('/').collect();
    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut param = None;
    for (expected, actual) in pattern_parts.iter().zip(&path_parts) {
        if expected.starts_with(':') {
            if actual.is_empty() {
                return None;
            }
            param = Some(actual.to_string());
        } else if expected != actual {
            return None;
        }
    }
    Some(param)
}
