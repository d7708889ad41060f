//! Search filter construction

use crate::profile::ObjectClassConfig;

/// Excludes accounts whose userAccountControl has the ACCOUNTDISABLE bit
pub const DISABLED_ACCOUNTS_FILTER: &str = "(!(userAccountControl:1.2.840.113556.1.4.803:=2))";

/// Filter for enumerating every object of a class
pub fn enumeration_filter(class: &ObjectClassConfig, include_disabled: bool) -> String {
    let mut filter = String::from("(&");
    filter.push_str(&parenthesize(&class.filter));
    if !include_disabled {
        filter.push_str(DISABLED_ACCOUNTS_FILTER);
    }
    filter.push(')');
    filter
}

/// Filter matching `id` against any of the class's key attributes
pub fn identity_filter(class: &ObjectClassConfig, include_disabled: bool, id: &str) -> String {
    let escaped = escape_filter_value(id);

    let mut filter = String::from("(&");
    filter.push_str(&parenthesize(&class.filter));
    if !include_disabled {
        filter.push_str(DISABLED_ACCOUNTS_FILTER);
    }
    filter.push_str("(|");
    for key in &class.key_attributes {
        filter.push('(');
        filter.push_str(&key.name);
        filter.push('=');
        filter.push_str(&escaped);
        filter.push(')');
    }
    filter.push_str("))");
    filter
}

/// Escape an assertion value per RFC 4515
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

fn parenthesize(filter: &str) -> String {
    let filter = filter.trim();
    if filter.starts_with('(') {
        filter.to_string()
    } else {
        format!("({filter})")
    }
}
