//! Role-based permission table and the predicates evaluated over it.
//!
//! The table is built once at startup and passed explicitly to every check;
//! nothing here holds global state.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::user::UserRole;

macro_rules! permissions {
    ($($variant:ident => $wire:literal,)*) => {
        /// A single `resource:action` permission.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Permission {
            $($variant,)*
        }

        impl Permission {
            pub const ALL: &'static [Permission] = &[$(Permission::$variant,)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Permission::$variant => $wire,)*
                }
            }
        }
    };
}

permissions! {
    CustomersRead => "customers:read",
    CustomersCreate => "customers:create",
    CustomersUpdate => "customers:update",
    CustomersDelete => "customers:delete",
    InvoicesRead => "invoices:read",
    InvoicesCreate => "invoices:create",
    InvoicesUpdate => "invoices:update",
    InvoicesDelete => "invoices:delete",
    VisitsRead => "visits:read",
    VisitsCreate => "visits:create",
    VisitsUpdate => "visits:update",
    VisitsDelete => "visits:delete",
    MarketersRead => "marketers:read",
    MarketersCreate => "marketers:create",
    MarketersUpdate => "marketers:update",
    MarketersDelete => "marketers:delete",
    ReportsRead => "reports:read",
    ReportsExport => "reports:export",
    UsersRead => "users:read",
    UsersManage => "users:manage",
    PermissionsRead => "permissions:read",
}

/// Returned when a permission string does not name a known permission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission: {0}")]
pub struct UnknownPermission(pub String);

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == trimmed)
            .ok_or_else(|| UnknownPermission(s.to_owned()))
    }
}

impl Serialize for Permission {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors raised while loading a role table from configuration.
#[derive(Debug, thiserror::Error)]
pub enum RoleTableError {
    #[error("invalid role table JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    UnknownRole(#[from] crate::user::UnknownRole),
    #[error(transparent)]
    UnknownPermission(#[from] UnknownPermission),
    #[error("role table has no entry for {0}")]
    MissingRole(UserRole),
    #[error("role table lists {0} more than once")]
    DuplicateRole(UserRole),
}

/// Static, total mapping from every [`UserRole`] to its permission set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePermissions {
    table: HashMap<UserRole, BTreeSet<Permission>>,
}

impl RolePermissions {
    /// The CRM's built-in role table.
    pub fn standard() -> Self {
        use Permission::*;

        let admin: BTreeSet<Permission> = Permission::ALL.iter().copied().collect();
        let manager = BTreeSet::from([
            CustomersRead,
            CustomersCreate,
            CustomersUpdate,
            CustomersDelete,
            InvoicesRead,
            InvoicesCreate,
            InvoicesUpdate,
            InvoicesDelete,
            VisitsRead,
            VisitsCreate,
            VisitsUpdate,
            VisitsDelete,
            MarketersRead,
            MarketersCreate,
            MarketersUpdate,
            ReportsRead,
            ReportsExport,
            UsersRead,
            PermissionsRead,
        ]);
        let marketer = BTreeSet::from([
            CustomersRead,
            CustomersCreate,
            CustomersUpdate,
            VisitsRead,
            VisitsCreate,
            VisitsUpdate,
            InvoicesRead,
            MarketersRead,
        ]);

        Self {
            table: HashMap::from([
                (UserRole::Admin, admin),
                (UserRole::Manager, manager),
                (UserRole::Marketer, marketer),
                (UserRole::User, BTreeSet::new()),
            ]),
        }
    }

    /// Parse a role table from JSON of the shape `{"ROLE": ["resource:action", ...]}`.
    ///
    /// Every role must be present exactly once (an empty list is allowed) and every
    /// string must name a known role or permission. Role keys are case-insensitive,
    /// so `"ADMIN"` and `"admin"` together are a duplicate.
    pub fn from_json(raw: &str) -> Result<Self, RoleTableError> {
        let parsed: HashMap<String, Vec<String>> = serde_json::from_str(raw)?;
        let mut table = HashMap::with_capacity(parsed.len());
        for (role, perms) in parsed {
            let role: UserRole = role.parse()?;
            let perms = perms
                .iter()
                .map(|p| p.parse::<Permission>())
                .collect::<Result<BTreeSet<_>, _>>()?;
            if table.insert(role, perms).is_some() {
                return Err(RoleTableError::DuplicateRole(role));
            }
        }
        if let Some(missing) = UserRole::ALL.into_iter().find(|r| !table.contains_key(r)) {
            return Err(RoleTableError::MissingRole(missing));
        }
        Ok(Self { table })
    }

    /// Permission set of `role`. Empty for a role with no grants.
    pub fn permissions_of(&self, role: UserRole) -> impl Iterator<Item = Permission> + '_ {
        self.table.get(&role).into_iter().flatten().copied()
    }

    fn grants(&self, role: UserRole, permission: Permission) -> bool {
        self.table
            .get(&role)
            .is_some_and(|set| set.contains(&permission))
    }
}

pub fn has_permission(table: &RolePermissions, role: UserRole, permission: Permission) -> bool {
    table.grants(role, permission)
}

/// `true` if the role holds at least one of `permissions`. An empty list never matches.
pub fn has_any_permission(
    table: &RolePermissions,
    role: UserRole,
    permissions: &[Permission],
) -> bool {
    permissions.iter().any(|p| table.grants(role, *p))
}

/// `true` if the role holds every one of `permissions`.
pub fn has_all_permissions(
    table: &RolePermissions,
    role: UserRole,
    permissions: &[Permission],
) -> bool {
    permissions.iter().all(|p| table.grants(role, *p))
}

pub fn has_role(role: UserRole, candidates: &[UserRole]) -> bool {
    candidates.contains(&role)
}

/// Union of every role's permissions, sorted by wire name.
pub fn list_all_permissions(table: &RolePermissions) -> Vec<&'static str> {
    let names: BTreeSet<&'static str> = table
        .table
        .values()
        .flatten()
        .map(|p| p.as_str())
        .collect();
    names.into_iter().collect()
}
