//! Access control gate.

use ripperdoc_core::RoleSet;

use super::jwt::Claims;

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Request may proceed.
    Allowed,
    /// Request must be refused.
    Denied,
}

/// Decide whether validated claims satisfy a role requirement.
///
/// An empty requirement admits any authenticated subject. Otherwise at
/// least one held role must appear in `required`.
#[must_use]
pub fn authorize(claims: &Claims, required: &RoleSet) -> Decision {
    if required.is_empty() || !claims.roles.is_disjoint(required) {
        Decision::Allowed
    } else {
        Decision::Denied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripperdoc_core::{UserId, role_set};

    fn claims(roles: &[&str]) -> Claims {
        Claims {
            sub: UserId::generate(),
            email: "a@b.io".to_string(),
            roles: role_set(roles.iter().copied()),
            iat: 0,
            exp: 60,
            iss: "ripperdoc".to_string(),
            aud: "shop".to_string(),
            jti: "j".to_string(),
        }
    }

    #[test]
    fn test_empty_requirement_allows_any_subject() {
        assert_eq!(authorize(&claims(&[]), &RoleSet::new()), Decision::Allowed);
        assert_eq!(authorize(&claims(&["Customer"]), &RoleSet::new()), Decision::Allowed);
    }

    #[test]
    fn test_any_matching_role_allows() {
        let required = role_set(["Admin", "Support"]);
        assert_eq!(authorize(&claims(&["Support"]), &required), Decision::Allowed);
        assert_eq!(authorize(&claims(&["Customer", "Admin"]), &required), Decision::Allowed);
    }

    #[test]
    fn test_no_matching_role_denies() {
        let required = role_set(["Admin"]);
        assert_eq!(authorize(&claims(&["Customer"]), &required), Decision::Denied);
        assert_eq!(authorize(&claims(&[]), &required), Decision::Denied);
    }

    #[test]
    fn test_role_match_is_case_sensitive() {
        assert_eq!(
            authorize(&claims(&["admin"]), &role_set(["Admin"])),
            Decision::Denied
        );
    }

    #[test]
    fn test_decision_is_stable() {
        let c = claims(&["Customer"]);
        let required = role_set(["Admin"]);
        let first = authorize(&c, &required);
        for _ in 0..10 {
            assert_eq!(authorize(&c, &required), first);
        }
    }
}
