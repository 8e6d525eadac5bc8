//! End-to-end engine tests against the scripted provider.
//!
//! Each test drives the full deploy pipeline (validation, journal replay,
//! reconciliation, batching, execution) with an in-memory journal, then
//! asserts on both the returned result and the journaled history.
//! Run with: cargo test --test engine_test

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alloy_core::primitives::{Address, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;
use kiln_engine::journal::JournalMessage;
use kiln_engine::testing::MockProvider;
use kiln_engine::{
    AddressRef, Arg, Deployer, DeploymentModule, DeploymentResult, DeploymentState,
    DeploymentStrategy, EngineError, ExecutionConfig, Future, FutureId, FutureKind, MemoryJournal,
    StrategyAction,
};

const CHAIN_ID: u64 = 31337;

/// Polling and bump intervals tight enough that lifecycle tests finish in
/// tens of milliseconds.
fn fast_config() -> ExecutionConfig {
    ExecutionConfig {
        required_confirmations: 1,
        block_polling_interval_ms: 5,
        fee_bump_interval_ms: 20,
        max_fee_bumps: 4,
        ..Default::default()
    }
}

fn sender() -> Address {
    Address::with_last_byte(0xAA)
}

fn deployment(key: &str, args: Vec<Arg>) -> Future {
    Future {
        id: FutureId::new("Mod", key),
        after: vec![],
        kind: FutureKind::ContractDeployment {
            contract_name: key.to_string(),
            bytecode: Bytes::from(vec![0x60, 0x80, 0x60, 0x40]),
            constructor_args: args,
            libraries: Default::default(),
            value: U256::ZERO,
            from: None,
        },
    }
}

/// A module deploying `token`, then calling `init` on it.
fn token_module() -> DeploymentModule {
    let mut module = DeploymentModule::new("Mod");
    module.accounts = vec![sender()];
    module.futures.push(deployment("token", vec![]));
    module.futures.push(Future {
        id: FutureId::new("Mod", "init"),
        after: vec![],
        kind: FutureKind::ContractCall {
            target: AddressRef::Future {
                id: FutureId::new("Mod", "token"),
            },
            function_name: "init".to_string(),
            args: vec![Arg::literal(42)],
            value: U256::ZERO,
            from: None,
        },
    });
    module
}

struct TestRig {
    provider: Arc<MockProvider>,
    journal: MemoryJournal,
    deployer: Deployer,
}

impl TestRig {
    fn new(provider: MockProvider) -> Self {
        Self::with_config(provider, fast_config())
    }

    fn with_config(provider: MockProvider, config: ExecutionConfig) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let provider = Arc::new(provider);
        let journal = MemoryJournal::new();
        let deployer = Deployer::new(provider.clone(), Box::new(journal.clone()))
            .with_config(config);
        Self {
            provider,
            journal,
            deployer,
        }
    }

    /// A fresh deployer and provider over the same journal, as a new process
    /// resuming the deployment would see it.
    fn resume(&self) -> Deployer {
        Deployer::new(
            Arc::new(MockProvider::new(CHAIN_ID)),
            Box::new(self.journal.clone()),
        )
        .with_config(fast_config())
    }
}

#[tokio::test]
async fn happy_path_deploys_and_reports_contracts() -> Result<()> {
    let rig = TestRig::new(MockProvider::new(CHAIN_ID));
    let result = rig.deployer.deploy(&token_module()).await?;

    let DeploymentResult::Successful(contracts) = result else {
        panic!("expected success, got {result:?}");
    };
    assert_eq!(contracts.len(), 1);
    let token = &contracts[&FutureId::new("Mod", "token")];
    assert_eq!(token.contract_name, "token");

    // One transaction per onchain future, in dependency order.
    let sent = rig.provider.sent_transactions();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].to.is_none());
    assert!(sent[1].to.is_some());
    Ok(())
}

#[tokio::test]
async fn resume_of_a_finished_deployment_sends_nothing() -> Result<()> {
    let rig = TestRig::new(MockProvider::new(CHAIN_ID));
    let module = token_module();
    assert!(rig.deployer.deploy(&module).await?.is_successful());

    // The fresh provider has no record of the earlier transactions; success
    // must come entirely from the journal.
    let result = rig.resume().deploy(&module).await?;
    assert!(result.is_successful());
    Ok(())
}

#[tokio::test]
async fn changed_constructor_args_fail_reconciliation() -> Result<()> {
    let rig = TestRig::new(MockProvider::new(CHAIN_ID));
    let mut module = DeploymentModule::new("Mod");
    module.accounts = vec![sender()];
    module.futures.push(deployment("token", vec![Arg::literal(1)]));
    assert!(rig.deployer.deploy(&module).await?.is_successful());

    let mut amended = DeploymentModule::new("Mod");
    amended.accounts = vec![sender()];
    amended
        .futures
        .push(deployment("token", vec![Arg::literal(2)]));

    let result = rig.resume().deploy(&amended).await?;

    let DeploymentResult::ReconciliationError(failures) = result else {
        panic!("expected reconciliation error, got {result:?}");
    };
    assert_eq!(failures.len(), 1);
    assert!(failures[&FutureId::new("Mod", "token")][0].contains("constructor arguments"));
    Ok(())
}

#[tokio::test]
async fn fee_bump_allowance_bounds_the_attempt_count() -> Result<()> {
    let config = ExecutionConfig {
        max_fee_bumps: 2,
        ..fast_config()
    };
    let rig = TestRig::with_config(MockProvider::new(CHAIN_ID).never_mine(), config);

    let mut module = DeploymentModule::new("Mod");
    module.accounts = vec![sender()];
    module.futures.push(deployment("stuck", vec![]));

    let result = rig.deployer.deploy(&module).await?;
    let DeploymentResult::ExecutionError(report) = result else {
        panic!("expected execution error, got {result:?}");
    };
    assert_eq!(report.timed_out.len(), 1);
    assert_eq!(report.timed_out[0].id, FutureId::new("Mod", "stuck"));

    // maxFeeBumps = 2 allows exactly three broadcasts: the original and two
    // bumps, all reusing one nonce with strictly rising fees.
    let sent = rig.provider.sent_transactions();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|tx| tx.nonce == 0));
    assert!(sent[1].fees.strictly_higher_than(&sent[0].fees));
    assert!(sent[2].fees.strictly_higher_than(&sent[1].fees));

    let timeouts = rig
        .journal
        .messages()
        .into_iter()
        .filter(|m| matches!(m, JournalMessage::OnchainInteractionTimeout { .. }))
        .count();
    assert_eq!(timeouts, 1);
    Ok(())
}

#[tokio::test]
async fn dropped_transaction_is_resent_with_a_fresh_start() -> Result<()> {
    let rig = TestRig::new(MockProvider::new(CHAIN_ID).drop_next_sends(1));

    let mut module = DeploymentModule::new("Mod");
    module.accounts = vec![sender()];
    module.futures.push(deployment("token", vec![]));

    let result = rig.deployer.deploy(&module).await?;
    assert!(result.is_successful());

    assert_eq!(rig.provider.sent_count(), 2);
    assert!(
        rig.journal
            .messages()
            .iter()
            .any(|m| matches!(m, JournalMessage::OnchainInteractionDropped { .. }))
    );
    Ok(())
}

#[tokio::test]
async fn user_replacement_is_tracked_and_resolves_the_future() -> Result<()> {
    // A long bump interval keeps the engine from re-sending while the user
    // races it.
    let config = ExecutionConfig {
        fee_bump_interval_ms: 60_000,
        ..fast_config()
    };
    let rig = TestRig::with_config(MockProvider::new(CHAIN_ID).never_mine(), config);

    let mut module = DeploymentModule::new("Mod");
    module.accounts = vec![sender()];
    module.futures.push(Future {
        id: FutureId::new("Mod", "pay"),
        after: vec![],
        kind: FutureKind::SendData {
            to: AddressRef::Address {
                address: Address::with_last_byte(0x01),
            },
            data: Bytes::new(),
            value: U256::from(1u64),
            from: None,
        },
    });

    // Once the engine's broadcast is pending, the user sends their own
    // transaction at the same nonce.
    let replace = async {
        while rig.provider.sent_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        rig.provider.user_replace(sender(), 0)
    };
    let (result, replacement) = tokio::join!(rig.deployer.deploy(&module), replace);
    assert!(result?.is_successful());

    // The engine broadcast once and adopted the replacement instead of
    // re-sending.
    assert_eq!(rig.provider.sent_count(), 1);
    let tracked = rig.journal.messages().into_iter().find_map(|m| match m {
        JournalMessage::OnchainInteractionReplacedByUser { hash, .. } => Some(hash),
        _ => None,
    });
    assert_eq!(tracked, Some(replacement));

    let state = rig.deployer.state().await?;
    let exec = state.get(&FutureId::new("Mod", "pay")).unwrap();
    match exec.result.as_ref().unwrap() {
        kiln_engine::FutureResult::TransactionHash { hash } => assert_eq!(*hash, replacement),
        other => panic!("unexpected result {other:?}"),
    }
    Ok(())
}

/// Holds the first future it sees and proceeds from then on.
struct HoldFirstStrategy {
    released: AtomicBool,
}

#[async_trait]
impl DeploymentStrategy for HoldFirstStrategy {
    fn name(&self) -> &str {
        "hold-first"
    }

    async fn before_interaction(
        &self,
        _future: &Future,
        _state: &DeploymentState,
    ) -> StrategyAction {
        if self.released.swap(true, Ordering::SeqCst) {
            StrategyAction::Proceed
        } else {
            StrategyAction::Hold {
                reason: "awaiting off-chain approval".to_string(),
            }
        }
    }
}

#[tokio::test]
async fn held_future_is_reported_and_retried_on_the_next_run() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let strategy = Arc::new(HoldFirstStrategy {
        released: AtomicBool::new(false),
    });
    let provider = Arc::new(MockProvider::new(CHAIN_ID));
    let journal = MemoryJournal::new();
    let deployer = Deployer::new(provider.clone(), Box::new(journal.clone()))
        .with_config(fast_config())
        .with_strategy(strategy.clone());

    let mut module = DeploymentModule::new("Mod");
    module.accounts = vec![sender()];
    module.futures.push(deployment("token", vec![]));

    // The hold ends the run without issuing anything.
    let result = deployer.deploy(&module).await?;
    let DeploymentResult::ExecutionError(report) = result else {
        panic!("expected execution error, got {result:?}");
    };
    assert_eq!(report.held.len(), 1);
    assert_eq!(report.held[0].id, FutureId::new("Mod", "token"));
    assert!(report.held[0].reason.contains("approval"));
    assert_eq!(provider.sent_count(), 0);

    // No wipe needed: the strategy releases and the next run goes through.
    let retry = Deployer::new(provider.clone(), Box::new(journal.clone()))
        .with_config(fast_config())
        .with_strategy(strategy);
    assert!(retry.deploy(&module).await?.is_successful());
    assert_eq!(provider.sent_count(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_future_blocks_the_next_run_until_wiped() -> Result<()> {
    let provider = MockProvider::new(CHAIN_ID);
    provider.revert_next_transaction();
    let rig = TestRig::new(provider);

    let mut module = DeploymentModule::new("Mod");
    module.accounts = vec![sender()];
    module.futures.push(deployment("token", vec![]));

    let result = rig.deployer.deploy(&module).await?;
    let DeploymentResult::ExecutionError(report) = result else {
        panic!("expected execution error, got {result:?}");
    };
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].reason.contains("reverted"));

    // Resuming without intervention is refused.
    let resumed = rig.resume();
    let result = resumed.deploy(&module).await?;
    assert!(matches!(result, DeploymentResult::PreviousRunError(_)));

    // A wipe clears the slate and the retry goes through.
    resumed.wipe(&FutureId::new("Mod", "token")).await?;
    let result = resumed.deploy(&module).await?;
    assert!(result.is_successful());
    Ok(())
}

#[tokio::test]
async fn wipe_refuses_a_successful_future() -> Result<()> {
    let rig = TestRig::new(MockProvider::new(CHAIN_ID));
    let module = token_module();
    assert!(rig.deployer.deploy(&module).await?.is_successful());

    let err = rig.deployer.wipe(&FutureId::new("Mod", "init")).await;
    assert!(matches!(err, Err(EngineError::WipeNotAllowed { .. })));

    // The recorded state is untouched and the resume still succeeds.
    let state = rig.deployer.state().await?;
    assert!(state.get(&FutureId::new("Mod", "init")).is_some());
    assert!(rig.resume().deploy(&module).await?.is_successful());
    Ok(())
}

#[tokio::test]
async fn futures_behind_a_failure_are_left_untouched() -> Result<()> {
    let provider = MockProvider::new(CHAIN_ID);
    provider.revert_next_transaction();
    let rig = TestRig::new(provider);

    let result = rig.deployer.deploy(&token_module()).await?;
    let DeploymentResult::ExecutionError(report) = result else {
        panic!("expected execution error, got {result:?}");
    };
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].id, FutureId::new("Mod", "token"));
    // The dependent call never initialized and never sent anything.
    assert_eq!(report.started, vec![FutureId::new("Mod", "init")]);
    assert_eq!(rig.provider.sent_count(), 1);
    Ok(())
}

#[tokio::test]
async fn chain_id_mismatch_aborts_the_run() -> Result<()> {
    let rig = TestRig::new(MockProvider::new(CHAIN_ID));
    let module = token_module();
    assert!(rig.deployer.deploy(&module).await?.is_successful());

    let other_chain = Deployer::new(
        Arc::new(MockProvider::new(CHAIN_ID + 1)),
        Box::new(rig.journal.clone()),
    )
    .with_config(fast_config());
    assert!(other_chain.deploy(&module).await.is_err());
    Ok(())
}

#[tokio::test]
async fn static_call_result_becomes_the_future_result() -> Result<()> {
    let provider = MockProvider::new(CHAIN_ID);
    // Two return words; the future narrows to the second.
    let mut ret = vec![0u8; 64];
    ret[63] = 7;
    provider.script_call_result(Bytes::from(ret));
    let rig = TestRig::new(provider);

    let mut module = DeploymentModule::new("Mod");
    module.accounts = vec![sender()];
    module.futures.push(Future {
        id: FutureId::new("Mod", "peek"),
        after: vec![],
        kind: FutureKind::StaticCall {
            target: AddressRef::Address {
                address: Address::with_last_byte(0x01),
            },
            function_name: "totalSupply".to_string(),
            args: vec![],
            from: None,
            result_word: Some(1),
        },
    });

    let result = rig.deployer.deploy(&module).await?;
    assert!(result.is_successful());

    let state = rig.deployer.state().await?;
    let exec = state.get(&FutureId::new("Mod", "peek")).unwrap();
    match exec.result.as_ref().unwrap() {
        kiln_engine::FutureResult::Data { data } => assert_eq!(data[31], 7),
        other => panic!("unexpected result {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn event_argument_is_read_from_the_emitters_receipt() -> Result<()> {
    let provider = MockProvider::new(CHAIN_ID);
    let mut word = vec![0u8; 32];
    word[31] = 0x2a;
    provider.emit_next(vec![kiln_engine::provider::LogEntry {
        address: Address::with_last_byte(0x01),
        topics: vec![],
        data: Bytes::from(word),
    }]);
    let rig = TestRig::new(provider);

    let mut module = DeploymentModule::new("Mod");
    module.accounts = vec![sender()];
    module.futures.push(Future {
        id: FutureId::new("Mod", "poke"),
        after: vec![],
        kind: FutureKind::SendData {
            to: AddressRef::Address {
                address: Address::with_last_byte(0x01),
            },
            data: Bytes::new(),
            value: U256::from(1u64),
            from: None,
        },
    });
    module.futures.push(Future {
        id: FutureId::new("Mod", "read"),
        after: vec![],
        kind: FutureKind::ReadEventArgument {
            emitter: FutureId::new("Mod", "poke"),
            event_name: "Poked".to_string(),
            argument: kiln_engine::ArgumentSlot::Data { word: 0 },
            event_index: 0,
        },
    });

    let result = rig.deployer.deploy(&module).await?;
    assert!(result.is_successful());

    let state = rig.deployer.state().await?;
    let exec = state.get(&FutureId::new("Mod", "read")).unwrap();
    match exec.result.as_ref().unwrap() {
        kiln_engine::FutureResult::Data { data } => assert_eq!(data[31], 0x2a),
        other => panic!("unexpected result {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn validation_problems_short_circuit_before_any_journaling() -> Result<()> {
    let rig = TestRig::new(MockProvider::new(CHAIN_ID));

    let mut module = token_module();
    module.accounts.clear();

    let result = rig.deployer.deploy(&module).await?;
    assert!(matches!(result, DeploymentResult::ValidationError(_)));
    assert!(rig.journal.messages().is_empty());
    assert_eq!(rig.provider.sent_count(), 0);
    Ok(())
}
