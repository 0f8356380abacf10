//! Route guard for views that need a signed-in shopper.
//!
//! The guard is a pure function of the session state and the requested
//! route. It never redirects on its own; the caller acts on the returned
//! [`GuardDecision`].

use std::fmt;

use crate::session::SessionState;

/// A storefront view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    ProductDetail { slug: String },
    Cart,
    Checkout,
    Profile,
    Login,
    Register,
}

impl Route {
    /// Parse a path such as `/products/green-tea`.
    ///
    /// Query strings, fragments and a trailing slash are ignored. Returns
    /// `None` for paths that name no view.
    #[must_use]
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = path.trim().trim_end_matches('/');

        match path {
            "" => Some(Self::Home),
            "/cart" => Some(Self::Cart),
            "/checkout" => Some(Self::Checkout),
            "/profile" => Some(Self::Profile),
            "/login" => Some(Self::Login),
            "/register" => Some(Self::Register),
            _ => path
                .strip_prefix("/products/")
                .filter(|slug| !slug.is_empty() && !slug.contains('/'))
                .map(|slug| Self::ProductDetail {
                    slug: slug.to_string(),
                }),
        }
    }

    /// The canonical path of the view.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_string(),
            Self::ProductDetail { slug } => format!("/products/{slug}"),
            Self::Cart => "/cart".to_string(),
            Self::Checkout => "/checkout".to_string(),
            Self::Profile => "/profile".to_string(),
            Self::Login => "/login".to_string(),
            Self::Register => "/register".to_string(),
        }
    }

    /// Whether the view needs a signed-in shopper.
    #[must_use]
    pub const fn requires_identity(&self) -> bool {
        matches!(self, Self::Cart | Self::Checkout | Self::Profile)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// The destination a visitor asked for before being sent to sign in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeTarget(pub Route);

/// Outcome of checking a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Render the view.
    Allow,
    /// Session not settled yet; show a neutral loading state.
    Defer,
    /// Send the visitor to `redirect_to`, remembering where they were going.
    Deny {
        redirect_to: Route,
        resume: ResumeTarget,
    },
}

/// Decide whether `route` may be shown in `state`.
///
/// Public views are always allowed, even before the session settles.
#[must_use]
pub fn check(state: &SessionState, route: &Route) -> GuardDecision {
    if !route.requires_identity() {
        return GuardDecision::Allow;
    }

    match state {
        SessionState::Unknown => GuardDecision::Defer,
        SessionState::Authenticated(_) => GuardDecision::Allow,
        SessionState::Anonymous => GuardDecision::Deny {
            redirect_to: Route::Login,
            resume: ResumeTarget(route.clone()),
        },
    }
}

/// Where to go after a successful sign-in.
#[must_use]
pub fn resume_destination(resume: Option<&ResumeTarget>) -> Route {
    resume.map_or(Route::Home, |ResumeTarget(route)| route.clone())
}
