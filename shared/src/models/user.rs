//! Staff accounts, roles and permissions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A staff account of a business
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub business_id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: StaffRole,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fixed staff roles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Owner,
    Manager,
    Cashier,
    Storekeeper,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Owner => "owner",
            StaffRole::Manager => "manager",
            StaffRole::Cashier => "cashier",
            StaffRole::Storekeeper => "storekeeper",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(StaffRole::Owner),
            "manager" => Some(StaffRole::Manager),
            "cashier" => Some(StaffRole::Cashier),
            "storekeeper" => Some(StaffRole::Storekeeper),
            _ => None,
        }
    }
}

/// A permission granting actions on a resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    pub resource: Resource,
    pub actions: Vec<Action>,
}

/// Resources that can be accessed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Product,
    Batch,
    Account,
    Voucher,
    Receipt,
    Stock,
    Report,
    Staff,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Product => "product",
            Resource::Batch => "batch",
            Resource::Account => "account",
            Resource::Voucher => "voucher",
            Resource::Receipt => "receipt",
            Resource::Stock => "stock",
            Resource::Report => "report",
            Resource::Staff => "staff",
        }
    }
}

/// Actions that can be performed on resources
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
    Export,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Export => "export",
        }
    }
}

const ALL_ACTIONS: [Action; 5] = [
    Action::View,
    Action::Create,
    Action::Edit,
    Action::Delete,
    Action::Export,
];

const ALL_RESOURCES: [Resource; 8] = [
    Resource::Product,
    Resource::Batch,
    Resource::Account,
    Resource::Voucher,
    Resource::Receipt,
    Resource::Stock,
    Resource::Report,
    Resource::Staff,
];

/// Permissions granted to a role
pub fn role_permissions(role: StaffRole) -> Vec<Permission> {
    let grant = |resource: Resource, actions: &[Action]| Permission {
        resource,
        actions: actions.to_vec(),
    };

    match role {
        StaffRole::Owner => ALL_RESOURCES
            .iter()
            .map(|r| grant(*r, &ALL_ACTIONS))
            .collect(),
        StaffRole::Manager => ALL_RESOURCES
            .iter()
            .map(|r| match r {
                Resource::Staff => grant(*r, &[Action::View, Action::Create, Action::Edit]),
                _ => grant(*r, &ALL_ACTIONS),
            })
            .collect(),
        StaffRole::Cashier => vec![
            grant(Resource::Product, &[Action::View]),
            grant(Resource::Batch, &[Action::View]),
            grant(Resource::Account, &[Action::View, Action::Create, Action::Edit]),
            grant(Resource::Voucher, &[Action::View, Action::Create, Action::Edit]),
            grant(Resource::Receipt, &[Action::View, Action::Create]),
            grant(Resource::Stock, &[Action::View]),
        ],
        StaffRole::Storekeeper => vec![
            grant(Resource::Product, &[Action::View, Action::Create, Action::Edit]),
            grant(Resource::Batch, &[Action::View, Action::Create, Action::Edit]),
            grant(Resource::Account, &[Action::View]),
            grant(Resource::Voucher, &[Action::View, Action::Create, Action::Edit]),
            grant(Resource::Stock, &[Action::View, Action::Export]),
            grant(Resource::Report, &[Action::View]),
        ],
    }
}

/// Flattened `resource:action` strings carried in access tokens
pub fn permission_strings(role: StaffRole) -> Vec<String> {
    role_permissions(role)
        .iter()
        .flat_map(|p| {
            p.actions
                .iter()
                .map(move |a| format!("{}:{}", p.resource.as_str(), a.as_str()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_has_everything() {
        let perms = permission_strings(StaffRole::Owner);
        assert_eq!(perms.len(), ALL_RESOURCES.len() * ALL_ACTIONS.len());
        assert!(perms.contains(&"staff:delete".to_string()));
    }

    #[test]
    fn test_manager_cannot_delete_staff() {
        let perms = permission_strings(StaffRole::Manager);
        assert!(perms.contains(&"staff:edit".to_string()));
        assert!(!perms.contains(&"staff:delete".to_string()));
        assert!(perms.contains(&"voucher:delete".to_string()));
    }

    #[test]
    fn test_cashier_limits() {
        let perms = permission_strings(StaffRole::Cashier);
        assert!(perms.contains(&"voucher:create".to_string()));
        assert!(perms.contains(&"receipt:create".to_string()));
        assert!(!perms.contains(&"voucher:delete".to_string()));
        assert!(!perms.contains(&"product:create".to_string()));
        assert!(!perms.iter().any(|p| p.starts_with("staff:")));
    }

    #[test]
    fn test_storekeeper_has_no_receipts() {
        let perms = permission_strings(StaffRole::Storekeeper);
        assert!(!perms.iter().any(|p| p.starts_with("receipt:")));
        assert!(perms.contains(&"stock:export".to_string()));
    }

    #[test]
    fn test_role_names() {
        for role in [StaffRole::Owner, StaffRole::Manager, StaffRole::Cashier, StaffRole::Storekeeper] {
            assert_eq!(StaffRole::from_str(role.as_str()), Some(role));
        }
    }
}
