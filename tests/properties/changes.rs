//! Property tests for change-driven agent selection.

use proptest::prelude::*;

use gantry::changes::{select, GlobalPatterns};

/// The root-level files that force a full redeploy.
const GLOBAL_FILES: &[&str] = &[
    ".env",
    "requirements.txt",
    "environment.yml",
    "Makefile",
    "makefile",
    "pyproject.toml",
    ".python-version",
];

fn known_agents() -> Vec<String> {
    vec![
        "alpha".to_string(),
        "beta".to_string(),
        "gamma".to_string(),
    ]
}

fn arbitrary_path() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z0-9./_-]{0,32}").unwrap()
}

fn agent_path() -> impl Strategy<Value = String> {
    (
        proptest::sample::select(vec!["alpha", "beta", "gamma"]),
        proptest::string::string_regex("[a-z0-9_]{1,12}\\.py").unwrap(),
    )
        .prop_map(|(agent, file)| format!("agents/{agent}/{file}"))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 96,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: `select` never panics and never selects an agent outside the
    /// known set, whatever the changed paths look like.
    #[test]
    fn property_selected_agents_are_known(
        paths in proptest::collection::vec(arbitrary_path(), 0..8)
    ) {
        let known = known_agents();
        let set = select(&paths, &known, "agents", &GlobalPatterns::default());
        for agent in &set.agents {
            prop_assert!(known.contains(agent));
        }
    }

    /// PROPERTY: Any changed path matching a global file escalates to every
    /// known agent, no matter what else changed.
    #[test]
    fn property_global_file_always_escalates(
        mut paths in proptest::collection::vec(agent_path(), 0..5),
        global_idx in 0..GLOBAL_FILES.len(),
        insert_at in 0usize..64,
    ) {
        paths.insert(insert_at % (paths.len() + 1), GLOBAL_FILES[global_idx].to_string());

        let known = known_agents();
        let set = select(&paths, &known, "agents", &GlobalPatterns::default());

        prop_assert!(set.global_escalation);
        prop_assert_eq!(set.agents.len(), known.len());
    }

    /// PROPERTY: Selection only depends on the set of changed paths, not
    /// their order.
    #[test]
    fn property_selection_is_order_insensitive(
        paths in proptest::collection::vec(
            prop_oneof![agent_path(), arbitrary_path()],
            0..8,
        )
    ) {
        let known = known_agents();
        let patterns = GlobalPatterns::default();
        let forward = select(&paths, &known, "agents", &patterns);
        let reversed: Vec<String> = paths.iter().rev().cloned().collect();
        let backward = select(&reversed, &known, "agents", &patterns);
        prop_assert_eq!(forward, backward);
    }

    /// PROPERTY: Without global matches, exactly the agents whose directories
    /// contain a changed path are selected.
    #[test]
    fn property_agent_paths_select_their_agents(
        paths in proptest::collection::vec(agent_path(), 1..6)
    ) {
        let known = known_agents();
        let set = select(&paths, &known, "agents", &GlobalPatterns::default());

        prop_assert!(!set.global_escalation);
        for path in &paths {
            let agent = path.split('/').nth(1).unwrap();
            prop_assert!(set.agents.contains(agent));
        }
        prop_assert!(set.agents.len() <= paths.len());
    }
}
