//! Property tests for secret binding parsing and flag classification.

use proptest::prelude::*;

use gantry::secrets::{classify, SecretBinding};

fn env_name() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z0-9_]{1,12}").unwrap()
}

fn secret_name() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z0-9-]{1,16}").unwrap()
}

fn version() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("latest".to_string()),
        proptest::string::string_regex("[0-9]{1,4}").unwrap(),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 96,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: `SecretBinding::parse` never panics on arbitrary input.
    #[test]
    fn property_binding_parse_never_panics(
        fragment in "(?s).{0,64}"
    ) {
        let _ = SecretBinding::parse(&fragment);
    }

    /// PROPERTY: A well-formed binding survives a parse/Display round trip.
    #[test]
    fn property_binding_display_round_trips(
        env in env_name(),
        secret in secret_name(),
        version in version(),
    ) {
        let raw = format!("{env}={secret}:{version}");
        let binding = SecretBinding::parse(&raw).unwrap();
        prop_assert_eq!(binding.to_string(), raw);
    }

    /// PROPERTY: A binding without `:VERSION` always selects `latest`.
    #[test]
    fn property_binding_version_defaults_to_latest(
        env in env_name(),
        secret in secret_name(),
    ) {
        let binding = SecretBinding::parse(&format!("{env}={secret}")).unwrap();
        prop_assert_eq!(binding.version, "latest");
    }

    /// PROPERTY: `classify` never panics on arbitrary flag lists.
    #[test]
    fn property_classify_never_panics(
        flags in proptest::collection::vec("(?s).{0,48}", 0..6)
    ) {
        let _ = classify(&flags);
    }

    /// PROPERTY: Well-formed binding flags classify to exactly their
    /// fragments, leaving no residue in the plain flags.
    #[test]
    fn property_classify_extracts_every_fragment(
        bindings in proptest::collection::vec(
            (env_name(), secret_name(), version()),
            1..5,
        )
    ) {
        let fragments: Vec<String> = bindings
            .iter()
            .map(|(e, s, v)| format!("{e}={s}:{v}"))
            .collect();
        let flag = format!("--update-secrets={}", fragments.join(","));

        let classified = classify(&[flag]).unwrap();

        prop_assert!(classified.plain.is_empty());
        prop_assert_eq!(classified.bindings.len(), fragments.len());
        for (binding, fragment) in classified.bindings.iter().zip(&fragments) {
            prop_assert_eq!(&binding.to_string(), fragment);
        }
    }

    /// PROPERTY: Plain flags pass through classification in order, untouched,
    /// when no bindings are present.
    #[test]
    fn property_plain_flags_pass_through(
        flags in proptest::collection::vec("--[a-z-]{1,12}=[A-Za-z0-9]{0,12}", 0..6)
    ) {
        let classified = classify(&flags).unwrap();
        prop_assert_eq!(classified.plain, flags);
        prop_assert!(classified.bindings.is_empty());
        prop_assert!(classified.pruned.is_empty());
    }
}
