//! Access tiers and the delete-time integrity guard.
//!
//! Both take the caller's [`Principal`] explicitly so an unauthorized caller is
//! rejected before any dependent count is read.

use serde_json::Value;
use uniadmin_auth::Principal;
use uniadmin_contracts::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTier {
    /// Catalog CRUD and account registration.
    AdminOnly,
    /// Dropdowns, academic years and the caller's own account.
    Authenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forbidden;

impl std::fmt::Display for Forbidden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "principal lacks the required role")
    }
}

impl std::error::Error for Forbidden {}

pub fn authorize(principal: &Principal, tier: AccessTier) -> Result<(), Forbidden> {
    match tier {
        AccessTier::Authenticated => Ok(()),
        AccessTier::AdminOnly if principal.is_admin() => Ok(()),
        AccessTier::AdminOnly => Err(Forbidden),
    }
}

/// Deleting a `parent` record is blocked while any `dependent` record references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependentRule {
    pub parent: EntityKind,
    pub dependent: EntityKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityViolation {
    pub entity: EntityKind,
    pub name: String,
    pub dependent: EntityKind,
    pub count: u64,
}

impl IntegrityViolation {
    pub fn details(&self) -> Value {
        serde_json::json!({
            "entity": self.entity.as_str(),
            "name": self.name,
            "dependent": self.dependent.as_str(),
            "count": self.count,
        })
    }
}

impl std::fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} '{}' still has {} dependent {}",
            self.entity.as_str(),
            self.name,
            self.count,
            self.dependent.as_str()
        )
    }
}

impl std::error::Error for IntegrityViolation {}

#[derive(Debug, Clone)]
pub struct DeleteGuard {
    rules: Vec<DependentRule>,
}

impl DeleteGuard {
    pub fn new(rules: Vec<DependentRule>) -> Self {
        Self { rules }
    }

    /// Faculty keeps its majors, major keeps its classes. Classes have no dependents yet.
    pub fn standard() -> Self {
        Self::new(vec![
            DependentRule {
                parent: EntityKind::Faculty,
                dependent: EntityKind::Major,
            },
            DependentRule {
                parent: EntityKind::Major,
                dependent: EntityKind::Class,
            },
        ])
    }

    /// Authorizes the delete and returns the dependent counts the caller must check.
    pub fn plan(
        &self,
        principal: &Principal,
        kind: EntityKind,
    ) -> Result<Vec<DependentRule>, Forbidden> {
        authorize(principal, AccessTier::AdminOnly)?;
        Ok(self
            .rules
            .iter()
            .filter(|rule| rule.parent == kind)
            .copied()
            .collect())
    }

    /// Inactive dependents count too.
    pub fn check(
        &self,
        name: &str,
        rule: DependentRule,
        dependents: u64,
    ) -> Result<(), IntegrityViolation> {
        if dependents == 0 {
            return Ok(());
        }
        Err(IntegrityViolation {
            entity: rule.parent,
            name: name.to_string(),
            dependent: rule.dependent,
            count: dependents,
        })
    }
}

impl Default for DeleteGuard {
    fn default() -> Self {
        Self::standard()
    }
}
