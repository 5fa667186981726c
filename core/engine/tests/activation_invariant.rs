//! Random sequences of install, activate and uninstall must keep the store,
//! the configuration and the activation artifacts in agreement.

mod common;

use proptest::prelude::*;
use swup_engine::activation::link_target;
use swup_engine::{Selector, ToolchainVersion};

const VERSIONS: [ToolchainVersion; 3] = [
    ToolchainVersion::release(5, 8, 0),
    ToolchainVersion::release(5, 9, 0),
    ToolchainVersion::release(5, 10, 0),
];

#[derive(Debug, Clone, Copy)]
enum Op {
    Install { index: usize, activate: bool },
    Activate(usize),
    Uninstall(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..VERSIONS.len(), any::<bool>())
            .prop_map(|(index, activate)| Op::Install { index, activate }),
        (0..VERSIONS.len()).prop_map(Op::Activate),
        (0..VERSIONS.len()).prop_map(Op::Uninstall),
    ]
}

fn check_invariants(h: &common::Harness) -> Result<(), TestCaseError> {
    let config = h.engine.config().map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert!(config.validate().is_ok());
    prop_assert!(config.pending.is_empty());

    let mut recorded: Vec<String> = config
        .installed_toolchains
        .iter()
        .map(|t| t.version.to_string())
        .collect();
    recorded.sort();
    prop_assert_eq!(h.store_entries(), recorded);

    match config.active() {
        Some(version) => {
            prop_assert!(config.is_installed(&version));
            prop_assert_eq!(link_target(h.paths()), Some(h.toolchain_dir(&version)));
        }
        None => prop_assert_eq!(link_target(h.paths()), None),
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn activation_invariant_holds(ops in prop::collection::vec(op(), 1..8)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let h = common::initialized(&VERSIONS).await;
            for op in ops {
                let installed = h.engine.config().unwrap().installed_toolchains.len();
                let result = match op {
                    Op::Install { index, activate } => h
                        .engine
                        .resolve_and_install(&Selector::Exact(VERSIONS[index]), activate)
                        .await
                        .map(|outcome| {
                            if activate {
                                assert!(outcome.activated);
                            }
                        }),
                    Op::Activate(index) => h.engine.activate(&VERSIONS[index]).await.map(drop),
                    Op::Uninstall(index) => h.engine.uninstall(&VERSIONS[index], None).await.map(drop),
                };
                if result.is_err() {
                    prop_assert_eq!(
                        h.engine.config().unwrap().installed_toolchains.len(),
                        installed,
                        "a rejected operation changes nothing"
                    );
                }
                check_invariants(&h)?;
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
