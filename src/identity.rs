//! Student identity recovery from submission entry names.
//!
//! LMS exports name each submission differently. Known shapes:
//!
//! - `Last_First_userdomain.tld_2025-10-10_23-43-22` (address with the `@` dropped)
//! - `Last_First_user@domain.tld_date`
//! - `user@domain.tld`
//! - `user@host` with any shape after the `@`
//! - anything else, which falls back to a synthesized address
//!
//! Each shape is a separate rule; [`RULES`] is tried in order and the first
//! rule that produces an identity wins.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::debug;

/// Institutional domains whose `@` is routinely stripped by the export.
const KNOWN_DOMAINS: [&str; 2] = ["calvin.edu", "student.edu"];
const FALLBACK_DOMAIN: &str = "student.edu";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub last_name: String,
    pub first_name: String,
    pub email: String,
    pub date: String,
}

type Rule = fn(&str) -> Option<Identity>;

pub const RULES: [(&str, Rule); 5] = [
    ("underscore_fields", underscore_fields),
    ("embedded_address", embedded_address),
    ("bare_address", bare_address),
    ("dash_fields", dash_fields),
    ("synthesized", synthesized),
];

/// Runs the rules in priority order. `None` means the name carries nothing
/// usable and the caller should report the entry.
pub fn parse_student_info(name: &str) -> Option<Identity> {
    if name.trim().is_empty() {
        return None;
    }
    for (rule_name, rule) in RULES.iter() {
        if let Some(identity) = rule(name) {
            debug!(entry = name, rule = rule_name, email = %identity.email, "identity extracted");
            return Some(identity);
        }
    }
    debug!(entry = name, "no identity rule matched");
    None
}

fn or_default(token: Option<&&str>, default: &str) -> String {
    match token {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => default.to_string(),
    }
}

fn underscore_fields(name: &str) -> Option<Identity> {
    let parts: Vec<&str> = name.split('_').collect();
    if parts.len() < 4 || parts[2].is_empty() {
        return None;
    }
    let date = parts[3..].join("_");
    Some(Identity {
        last_name: or_default(parts.first(), "Unknown"),
        first_name: or_default(parts.get(1), "Student"),
        email: repair_address(parts[2]),
        date: if date.is_empty() {
            "unknown".to_string()
        } else {
            date
        },
    })
}

/// Puts the `@` back into an address token like `jgs32calvin.edu`.
pub fn repair_address(token: &str) -> String {
    if token.contains('@') {
        return token.to_string();
    }
    for domain in KNOWN_DOMAINS {
        if let Some(local) = token.strip_suffix(domain) {
            return format!("{local}@{domain}");
        }
    }
    if let Some((local, domain)) = split_generic_domain(token) {
        return format!("{local}@{domain}");
    }
    format!("{token}@{FALLBACK_DOMAIN}")
}

fn domain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:[A-Za-z]+\.)+[A-Za-z]{2,}$").expect("domain regex"))
}

fn local_part_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._%-]+$").expect("local part regex"))
}

/// Longest trailing `label.label.tld` run that still leaves a local part.
fn split_generic_domain(token: &str) -> Option<(&str, &str)> {
    token
        .char_indices()
        .skip(1)
        .map(|(i, _)| token.split_at(i))
        .find(|(local, domain)| domain_re().is_match(domain) && local_part_re().is_match(local))
}

fn embedded_address(name: &str) -> Option<Identity> {
    let parts: Vec<&str> = name.split('_').collect();
    if parts.len() < 2 {
        return None;
    }
    let email = parts.iter().find(|p| p.contains('@'))?;
    Some(Identity {
        last_name: or_default(parts.first(), "Unknown"),
        first_name: or_default(parts.get(1), "Unknown"),
        email: email.to_string(),
        date: or_default(parts.last(), "unknown"),
    })
}

/// A lone token carrying an `@` is taken as the address, whatever its shape.
fn bare_address(name: &str) -> Option<Identity> {
    let token = name.trim();
    if token.contains('_') || !token.contains('@') {
        return None;
    }
    Some(Identity {
        last_name: "Unknown".to_string(),
        first_name: "Student".to_string(),
        email: token.to_string(),
        date: "unknown".to_string(),
    })
}

fn dash_fields(name: &str) -> Option<Identity> {
    if !name.contains('-') {
        return None;
    }
    let parts: Vec<&str> = name.split('-').collect();
    let email = parts.iter().find(|p| p.contains('@'))?;
    Some(Identity {
        last_name: or_default(parts.first(), "Unknown"),
        first_name: or_default(parts.get(1), "Student"),
        email: email.to_string(),
        date: or_default(parts.last(), "unknown"),
    })
}

fn synthesized(name: &str) -> Option<Identity> {
    let parts: Vec<&str> = name.split('_').collect();
    let first = parts.first().copied().unwrap_or("");
    let local: String = first
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if local.is_empty() {
        return None;
    }
    Some(Identity {
        last_name: or_default(parts.first(), "Unknown"),
        first_name: or_default(parts.get(1), "Student"),
        email: format!("{local}@{FALLBACK_DOMAIN}"),
        date: "unknown".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(last: &str, first: &str, email: &str, date: &str) -> Identity {
        Identity {
            last_name: last.into(),
            first_name: first.into(),
            email: email.into(),
            date: date.into(),
        }
    }

    #[test]
    fn moodle_name_with_stripped_at_sign() {
        assert_eq!(
            parse_student_info("Segura_Joshua_jgs32calvin.edu_2025-10-10_23-43-22"),
            Some(ident("Segura", "Joshua", "jgs32@calvin.edu", "2025-10-10_23-43-22"))
        );
    }

    #[test]
    fn underscore_form_keeps_existing_at_sign() {
        assert_eq!(
            parse_student_info("Doe_Jane_jd4@calvin.edu_2025-01-01"),
            Some(ident("Doe", "Jane", "jd4@calvin.edu", "2025-01-01"))
        );
    }

    #[test]
    fn repair_address_handles_known_generic_and_fallback() {
        assert_eq!(repair_address("abc12student.edu"), "abc12@student.edu");
        assert_eq!(repair_address("abc12example.org"), "abc12@example.org");
        assert_eq!(repair_address("x9mail.cs.uni.de"), "x9@mail.cs.uni.de");
        assert_eq!(repair_address("12345"), "12345@student.edu");
    }

    #[test]
    fn known_domain_with_nothing_in_front_keeps_the_domain() {
        assert_eq!(repair_address("calvin.edu"), "@calvin.edu");
        assert_eq!(repair_address("student.edu"), "@student.edu");
    }

    #[test]
    fn embedded_address_with_few_fields() {
        assert_eq!(
            parse_student_info("Smith_Ann_as7@uni.edu"),
            Some(ident("Smith", "Ann", "as7@uni.edu", "as7@uni.edu"))
        );
    }

    #[test]
    fn bare_address_name() {
        assert_eq!(
            parse_student_info("mary-ann@uni.edu"),
            Some(ident("Unknown", "Student", "mary-ann@uni.edu", "unknown"))
        );
    }

    #[test]
    fn bare_token_with_at_sign_is_the_address_even_without_a_tld() {
        assert_eq!(
            parse_student_info("jsmith@calvin"),
            Some(ident("Unknown", "Student", "jsmith@calvin", "unknown"))
        );
        assert_eq!(
            parse_student_info("  odd@@host "),
            Some(ident("Unknown", "Student", "odd@@host", "unknown"))
        );
    }

    #[test]
    fn dash_delimited_name() {
        assert_eq!(
            dash_fields("Lee-Kim-kl2@uni.edu-2024"),
            Some(ident("Lee", "Kim", "kl2@uni.edu", "2024"))
        );
        // The lone-token rule runs first and keeps the whole name.
        assert_eq!(
            parse_student_info("Lee-Kim-kl2@uni.edu-2024").map(|i| i.email),
            Some("Lee-Kim-kl2@uni.edu-2024".to_string())
        );
    }

    #[test]
    fn last_resort_synthesizes_address() {
        assert_eq!(
            parse_student_info("Project 1 (Final)"),
            Some(ident("Project 1 (Final)", "Student", "project1final@student.edu", "unknown"))
        );
        assert_eq!(
            parse_student_info("Garcia_Luis"),
            Some(ident("Garcia", "Luis", "garcia@student.edu", "unknown"))
        );
    }

    #[test]
    fn empty_or_symbol_only_names_fail() {
        assert_eq!(parse_student_info(""), None);
        assert_eq!(parse_student_info("   "), None);
        assert_eq!(parse_student_info("!!!"), None);
        assert_eq!(parse_student_info("___"), None);
    }

    #[test]
    fn rules_are_individually_callable() {
        assert!(underscore_fields("a_b").is_none());
        assert!(embedded_address("solo@uni.edu").is_none());
        assert!(bare_address("a_b@uni.edu").is_none());
        assert!(dash_fields("no_dash").is_none());
        assert!(synthesized("").is_none());
    }
}
