//! Environment-variable validation (C19), per SPEC_FULL §6.
//!
//! `VNPY_DATABASE_DRIVER` is the only variable every deployment must set; the rest have
//! documented defaults or are only required for specific drivers. Broker credentials are
//! likewise required but belong to the gateway adapter, not the core — `required_broker_vars`
//! is exposed so the worker binary can validate them at the same fail-fast boundary.

const REQUIRED_DATABASE_VARS: &[&str] = &["VNPY_DATABASE_DRIVER"];

const REQUIRED_BROKER_VARS: &[&str] = &[
    "VNPY_BROKER_USERID",
    "VNPY_BROKER_PASSWORD",
    "VNPY_BROKER_APPID",
    "VNPY_BROKER_AUTHCODE",
    "VNPY_BROKER_FRONTADDR",
    "VNPY_BROKER_MDADDR",
];

/// Returns the subset of `names` that are unset or empty in the process environment.
fn missing_from<L: Fn(&str) -> Option<String>>(names: &[&str], lookup: L) -> Vec<String> {
    names
        .iter()
        .filter(|name| lookup(name).map(|v| v.is_empty()).unwrap_or(true))
        .map(|s| s.to_string())
        .collect()
}

/// Validates the database-related required environment variables.
///
/// Returns exactly the set of missing required names (Testable property 12), never more and
/// never less — callers that also need broker vars call [`validate_broker_env_vars`] separately
/// so a missing broker credential doesn't get misreported as a database problem.
pub fn validate_database_env_vars() -> Vec<String> {
    missing_from(REQUIRED_DATABASE_VARS, |n| std::env::var(n).ok())
}

pub fn validate_broker_env_vars() -> Vec<String> {
    missing_from(REQUIRED_BROKER_VARS, |n| std::env::var(n).ok())
}

/// Reads a `VNPY_DATABASE_*` variable, falling back to `default` when unset (used for the
/// optional ones like `VNPY_DATABASE_PORT`).
pub fn database_var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(map: &std::collections::HashMap<&str, &str>) -> impl Fn(&str) -> Option<String> + '_ {
        move |n| map.get(n).map(|v| v.to_string())
    }

    #[test]
    fn missing_from_reports_exactly_the_unset_names() {
        let mut present = std::collections::HashMap::new();
        present.insert("A", "1");
        present.insert("B", "");
        let names = ["A", "B", "C"];
        let missing = missing_from(&names, lookup_from(&present));
        assert_eq!(missing, vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn all_present_means_nothing_missing() {
        let mut present = std::collections::HashMap::new();
        for n in REQUIRED_DATABASE_VARS {
            present.insert(*n, "x");
        }
        let missing = missing_from(REQUIRED_DATABASE_VARS, lookup_from(&present));
        assert!(missing.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        const NAMES: &[&str] = &["A", "B", "C", "D", "E", "F"];

        /// Property 12: for any subset of required names marked present (with a non-empty value)
        /// and the rest absent, `missing_from` returns exactly the complement — never more, never
        /// less, regardless of which names or how many are in the "present" subset.
        #[test]
        fn prop_missing_from_returns_exactly_the_complement() {
            proptest!(|(present_flags in prop::collection::vec(any::<bool>(), NAMES.len()))| {
                let mut present = std::collections::HashMap::new();
                let mut expected_missing: Vec<String> = Vec::new();
                for (name, is_present) in NAMES.iter().zip(present_flags.iter()) {
                    if *is_present {
                        present.insert(*name, "x");
                    } else {
                        expected_missing.push(name.to_string());
                    }
                }

                let missing = missing_from(NAMES, lookup_from(&present));
                prop_assert_eq!(missing, expected_missing);
            });
        }

        /// An empty-string value counts as missing, matching the fail-fast startup check — a
        /// variable set to `""` is exactly as unusable as one never set.
        #[test]
        fn prop_empty_string_value_counts_as_missing() {
            proptest!(|(present_flags in prop::collection::vec(any::<bool>(), NAMES.len()))| {
                let mut present = std::collections::HashMap::new();
                for (name, is_present) in NAMES.iter().zip(present_flags.iter()) {
                    present.insert(*name, if *is_present { "x" } else { "" });
                }
                let missing = missing_from(NAMES, lookup_from(&present));
                let expected: Vec<String> = NAMES
                    .iter()
                    .zip(present_flags.iter())
                    .filter(|(_, is_present)| !**is_present)
                    .map(|(n, _)| n.to_string())
                    .collect();
                prop_assert_eq!(missing, expected);
            });
        }
    }
}
