//! Host functions available to every expression
//!
//! Three functions are registered at engine construction: `hasRole`,
//! `isOwner` and `inList`. They operate on the JSON projections of the
//! CEL arguments.

use serde_json::Value;

/// Check if a principal map has a specific role
///
/// Accepts `roles` as a list of strings or a list of arbitrary values
/// (non-strings are skipped).
///
/// ```cel
/// hasRole(principal, "admin")
/// hasRole(P, "editor")
/// ```
pub fn has_role(principal: &Value, role: &Value) -> bool {
    let (Some(principal_obj), Some(role_str)) = (principal.as_object(), role.as_str()) else {
        return false;
    };

    principal_obj
        .get("roles")
        .and_then(|roles| roles.as_array())
        .map(|roles| {
            roles
                .iter()
                .filter_map(|r| r.as_str())
                .any(|r| r == role_str)
        })
        .unwrap_or(false)
}

/// Check if a principal owns a resource
///
/// True iff `principal.id == resource.attributes.ownerId`; the legacy
/// `attr.ownerId` spelling is accepted as an alias.
///
/// ```cel
/// isOwner(principal, resource)
/// isOwner(P, R)
/// ```
pub fn is_owner(principal: &Value, resource: &Value) -> bool {
    let Some(principal_id) = principal.get("id").and_then(|v| v.as_str()) else {
        return false;
    };

    for attrs_key in ["attributes", "attr"] {
        if let Some(owner_id) = resource
            .get(attrs_key)
            .and_then(|attrs| attrs.get("ownerId"))
            .and_then(|v| v.as_str())
        {
            return principal_id == owner_id;
        }
    }

    false
}

/// Check if a string value is in a list of strings
///
/// ```cel
/// inList(resource.attributes.department, principal.attributes.departments)
/// inList("read", ["read", "write"])
/// ```
pub fn in_list(value: &Value, list: &Value) -> bool {
    let (Some(value_str), Some(list_arr)) = (value.as_str(), list.as_array()) else {
        return false;
    };

    list_arr
        .iter()
        .filter_map(|item| item.as_str())
        .any(|item| item == value_str)
}
