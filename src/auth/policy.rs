//! URL access rules, evaluated top to bottom; the first matching rule wins.

use axum::http::Method;
use lazy_static::lazy_static;

pub const LOGIN_PAGE: &str = "/login";
pub const LOGOUT_SUCCESS_URL: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Security is skipped entirely (static resources).
    Ignored,
    Public,
    Authenticated,
}

/// Ant-style path pattern: `*` is one segment, a trailing `**` is any suffix.
#[derive(Debug, Clone)]
pub struct PathPattern {
    segments: Vec<String>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            segments: split(pattern).map(str::to_string).collect(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        let mut parts = split(path);
        for (i, seg) in self.segments.iter().enumerate() {
            if seg == "**" && i == self.segments.len() - 1 {
                return true;
            }
            match parts.next() {
                Some(part) if seg == "*" || seg == part => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
pub struct Rule {
    method: Option<Method>,
    patterns: Vec<PathPattern>,
    access: Access,
}

impl Rule {
    fn new(method: Option<Method>, patterns: &[&str], access: Access) -> Self {
        Self {
            method,
            patterns: patterns.iter().map(|p| PathPattern::new(p)).collect(),
            access,
        }
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method.as_ref().map_or(true, |m| m == method)
            && self.patterns.iter().any(|p| p.matches(path))
    }
}

#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    rules: Vec<Rule>,
    fallback: Access,
}

impl SecurityPolicy {
    pub fn studyolle() -> Self {
        let rules = vec![
            Rule::new(
                None,
                &[
                    "/node_modules/**",
                    "/css/**",
                    "/js/**",
                    "/images/**",
                    "/webjars/**",
                    "/favicon.ico",
                ],
                Access::Ignored,
            ),
            Rule::new(
                None,
                &[
                    "/",
                    LOGIN_PAGE,
                    "/sign-up",
                    "/check-email-token",
                    "/email-login",
                    "/check-email-login",
                    "/login-link",
                    "/logout",
                ],
                Access::Public,
            ),
            Rule::new(Some(Method::GET), &["/profile/*"], Access::Public),
        ];
        Self {
            rules,
            fallback: Access::Authenticated,
        }
    }

    pub fn access_for(&self, method: &Method, path: &str) -> Access {
        self.rules
            .iter()
            .find(|r| r.matches(method, path))
            .map(|r| r.access)
            .unwrap_or(self.fallback)
    }
}

lazy_static! {
    pub static ref POLICY: SecurityPolicy = SecurityPolicy::studyolle();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_paths_for_any_method() {
        for path in [
            "/",
            "/login",
            "/sign-up",
            "/check-email-token",
            "/email-login",
            "/check-email-login",
            "/login-link",
        ] {
            assert_eq!(POLICY.access_for(&Method::GET, path), Access::Public, "{path}");
            assert_eq!(POLICY.access_for(&Method::POST, path), Access::Public, "{path}");
        }
    }

    #[test]
    fn profile_is_public_for_get_only() {
        assert_eq!(POLICY.access_for(&Method::GET, "/profile/mintae"), Access::Public);
        assert_eq!(
            POLICY.access_for(&Method::POST, "/profile/mintae"),
            Access::Authenticated
        );
        assert_eq!(
            POLICY.access_for(&Method::GET, "/profile/mintae/edit"),
            Access::Authenticated
        );
    }

    #[test]
    fn everything_else_requires_authentication() {
        assert_eq!(POLICY.access_for(&Method::GET, "/check-email"), Access::Authenticated);
        assert_eq!(
            POLICY.access_for(&Method::GET, "/resend-confirm-email"),
            Access::Authenticated
        );
        assert_eq!(POLICY.access_for(&Method::GET, "/settings"), Access::Authenticated);
    }

    #[test]
    fn static_resources_are_ignored() {
        assert_eq!(
            POLICY.access_for(&Method::GET, "/node_modules/jquery/dist/jquery.js"),
            Access::Ignored
        );
        assert_eq!(POLICY.access_for(&Method::GET, "/css/app.css"), Access::Ignored);
        assert_eq!(POLICY.access_for(&Method::GET, "/favicon.ico"), Access::Ignored);
    }

    #[test]
    fn pattern_matching() {
        assert!(PathPattern::new("/").matches("/"));
        assert!(!PathPattern::new("/").matches("/x"));
        assert!(PathPattern::new("/a/*").matches("/a/b"));
        assert!(!PathPattern::new("/a/*").matches("/a"));
        assert!(PathPattern::new("/a/**").matches("/a"));
        assert!(PathPattern::new("/a/**").matches("/a/b/c"));
        assert!(PathPattern::new("/login").matches("/login/"));
    }
}
