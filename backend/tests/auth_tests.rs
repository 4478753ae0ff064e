//! Staff access and sign-up validation tests
//!
//! Covers:
//! - Static role to permission mapping
//! - Registration and staff input validation (business code, email,
//!   password, phone, GSTIN)

use proptest::prelude::*;
use shared::{
    permission_strings, validate_business_code, validate_email, validate_gstin, validate_password,
    validate_phone, Action, Resource, StaffRole,
};

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Generate valid business codes (3-10 uppercase alphanumeric)
fn business_code_strategy() -> impl Strategy<Value = String> {
    "[A-Z0-9]{3,10}"
}

/// Generate valid email addresses
fn email_strategy() -> impl Strategy<Value = String> {
    "[a-z]{5,10}@[a-z]{3,8}\\.(com|org|net|in)"
}

/// Generate passwords with at least one letter and one digit
fn password_strategy() -> impl Strategy<Value = String> {
    ("[a-zA-Z]{4,10}", "[0-9]{4,10}").prop_map(|(letters, digits)| format!("{}{}", letters, digits))
}

/// Generate Indian style mobile numbers, with or without country code
fn phone_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[6-9][0-9]{9}",
        "\\+91 [6-9][0-9]{4}-[0-9]{5}",
    ]
}

fn role_strategy() -> impl Strategy<Value = StaffRole> {
    prop_oneof![
        Just(StaffRole::Owner),
        Just(StaffRole::Manager),
        Just(StaffRole::Cashier),
        Just(StaffRole::Storekeeper),
    ]
}

fn perm(resource: Resource, action: Action) -> String {
    format!("{}:{}", resource.as_str(), action.as_str())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_only_owner_deletes_staff() {
        let delete_staff = perm(Resource::Staff, Action::Delete);
        assert!(permission_strings(StaffRole::Owner).contains(&delete_staff));
        assert!(!permission_strings(StaffRole::Manager).contains(&delete_staff));
        assert!(!permission_strings(StaffRole::Cashier).contains(&delete_staff));
        assert!(!permission_strings(StaffRole::Storekeeper).contains(&delete_staff));
    }

    #[test]
    fn test_cashier_bills_but_cannot_delete() {
        let perms = permission_strings(StaffRole::Cashier);
        assert!(perms.contains(&perm(Resource::Voucher, Action::Create)));
        assert!(perms.contains(&perm(Resource::Receipt, Action::Create)));
        assert!(!perms.contains(&perm(Resource::Voucher, Action::Delete)));
        assert!(!perms.contains(&perm(Resource::Receipt, Action::Delete)));
        assert!(!perms.contains(&perm(Resource::Product, Action::Create)));
        assert!(!perms.contains(&perm(Resource::Staff, Action::View)));
    }

    #[test]
    fn test_storekeeper_manages_catalogue_not_money() {
        let perms = permission_strings(StaffRole::Storekeeper);
        assert!(perms.contains(&perm(Resource::Product, Action::Create)));
        assert!(perms.contains(&perm(Resource::Batch, Action::Edit)));
        assert!(perms.contains(&perm(Resource::Stock, Action::Export)));
        assert!(!perms.contains(&perm(Resource::Receipt, Action::View)));
        assert!(!perms.contains(&perm(Resource::Account, Action::Create)));
    }

    #[test]
    fn test_role_names() {
        for role in [StaffRole::Owner, StaffRole::Manager, StaffRole::Cashier, StaffRole::Storekeeper] {
            assert_eq!(StaffRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(StaffRole::from_str("worker"), None);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(validate_business_code("ab").is_err());
        assert!(validate_business_code("shop1").is_err());
        assert!(validate_email("no-at-sign.com").is_err());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("lettersonly").is_err());
        assert!(validate_password("1234567890").is_err());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("98765abcde").is_err());
        assert!(validate_gstin("27AAPFU0939F1Z").is_err());
    }

    #[test]
    fn test_gstin_checksum() {
        assert!(validate_gstin("27AAPFU0939F1ZV").is_ok());
        assert!(validate_gstin("27AAPFU0939F1ZW").is_err());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every role can at least look at vouchers and stock
    #[test]
    fn prop_every_role_views_vouchers(role in role_strategy()) {
        let perms = permission_strings(role);
        prop_assert!(perms.contains(&perm(Resource::Voucher, Action::View)));
        prop_assert!(perms.contains(&perm(Resource::Stock, Action::View)));
    }

    /// Permission strings are unique and well formed
    #[test]
    fn prop_permission_strings_well_formed(role in role_strategy()) {
        let perms = permission_strings(role);
        let mut deduped = perms.clone();
        deduped.sort();
        deduped.dedup();
        prop_assert_eq!(deduped.len(), perms.len());
        for p in &perms {
            let (resource, action) = p.split_once(':').unwrap();
            prop_assert!(!resource.is_empty());
            prop_assert!(["view", "create", "edit", "delete", "export"].contains(&action));
        }
    }

    /// Owners hold a superset of every other role
    #[test]
    fn prop_owner_is_superset(role in role_strategy()) {
        let owner = permission_strings(StaffRole::Owner);
        for p in permission_strings(role) {
            prop_assert!(owner.contains(&p));
        }
    }

    #[test]
    fn prop_valid_business_codes_accepted(code in business_code_strategy()) {
        prop_assert!(validate_business_code(&code).is_ok());
    }

    #[test]
    fn prop_lowercase_business_codes_rejected(code in "[a-z]{3,10}") {
        prop_assert!(validate_business_code(&code).is_err());
    }

    #[test]
    fn prop_valid_emails_accepted(email in email_strategy()) {
        prop_assert!(validate_email(&email).is_ok());
    }

    #[test]
    fn prop_valid_passwords_accepted(password in password_strategy()) {
        prop_assert!(validate_password(&password).is_ok());
    }

    #[test]
    fn prop_valid_phones_accepted(phone in phone_strategy()) {
        prop_assert!(validate_phone(&phone).is_ok());
    }
}
