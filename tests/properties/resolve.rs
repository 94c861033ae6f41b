//! Property tests for variable substitution.

use proptest::prelude::*;

use gantry::envfile::{EnvLayer, LayerRank, LayerStack};
use gantry::resolve::resolve;

fn ident() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z0-9_]{1,12}").unwrap()
}

/// Values that survive dotenv parsing unchanged (no whitespace to trim, no
/// wrapping quotes to strip) and cannot terminate a placeholder early.
fn safe_value() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z0-9@./_-]{0,20}").unwrap()
}

fn stack_with(name: &str, value: &str) -> LayerStack {
    let mut layers = LayerStack::new();
    layers.push(EnvLayer::from_dotenv(
        LayerRank::GlobalDefaults,
        &format!("{name}={value}\n"),
    ));
    layers
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 96,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: `resolve` never panics on arbitrary input, with or without
    /// well-formed placeholders.
    #[test]
    fn property_resolve_never_panics(
        raw in "(?s).{0,256}",
        name in ident(),
        value in safe_value(),
    ) {
        let layers = stack_with(&name, &value);
        let _ = resolve(&raw, &layers);
    }

    /// PROPERTY: A defined variable always substitutes to its value, whatever
    /// the identifier and value are.
    #[test]
    fn property_defined_variable_substitutes(
        name in ident(),
        value in safe_value(),
    ) {
        let layers = stack_with(&name, &value);
        let raw = format!("--flag=${{{name}}}");
        prop_assert_eq!(resolve(&raw, &layers).unwrap(), format!("--flag={value}"));
    }

    /// PROPERTY: The inline default is used exactly when the variable is
    /// undefined.
    #[test]
    fn property_fallback_used_iff_undefined(
        name in ident(),
        value in safe_value(),
        default in safe_value(),
        defined in proptest::bool::ANY,
    ) {
        let layers = if defined {
            stack_with(&name, &value)
        } else {
            LayerStack::new()
        };
        let raw = format!("${{{name}:-{default}}}");
        let expected = if defined { value } else { default };
        prop_assert_eq!(resolve(&raw, &layers).unwrap(), expected);
    }

    /// PROPERTY: Resolution is idempotent - resolving already-resolved output
    /// changes nothing.
    #[test]
    fn property_resolution_idempotent(
        name in ident(),
        value in safe_value(),
        prefix in safe_value(),
        suffix in safe_value(),
    ) {
        let layers = stack_with(&name, &value);
        let raw = format!("{prefix}${{{name}}}{suffix}");
        let once = resolve(&raw, &layers).unwrap();
        let twice = resolve(&once, &layers).unwrap();
        prop_assert_eq!(once, twice);
    }

    /// PROPERTY: An undefined variable without a fallback is always an error,
    /// and the error names the variable but never any layered value.
    #[test]
    fn property_undefined_without_fallback_errors(
        name in ident(),
        other_value in "[A-Za-z0-9]{8,16}",
    ) {
        let mut layers = LayerStack::new();
        layers.push(EnvLayer::from_dotenv(
            LayerRank::AgentSecrets,
            &format!("OTHER_SECRET={other_value}\n"),
        ));
        let raw = format!("${{{name}}}");
        prop_assume!(name != "OTHER_SECRET");
        prop_assume!(!name.contains(&other_value));

        let err = resolve(&raw, &layers).unwrap_err();
        let message = err.to_string();
        prop_assert!(message.contains(&name));
        prop_assert!(!message.contains(&other_value));
    }
}
