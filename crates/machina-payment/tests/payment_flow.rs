//! End-to-end payment flows against the simulated chain.

use assert_matches::assert_matches;
use futures::StreamExt;
use machina_core::{
    MachinaError, MachineIndex, ProviderError, TokenAmount, TxErrorKind, TxSlot, TxStatus,
};
use machina_payment::{
    FlowStep, FlowUpdate, MemoryStore, NotificationKind, NotificationService, PaymentOrchestrator,
};
use machina_testkit::{amount, ChainEvent, SubmissionKind, TestEnv, OPERATOR, REGISTRY, USER};
use std::sync::Arc;
use std::time::Duration;

fn orchestrator(env: &TestEnv) -> PaymentOrchestrator {
    PaymentOrchestrator::new(&env.effects(), &env.config).unwrap()
}

async fn collect(handle: &mut machina_payment::PaymentFlowHandle) -> Vec<FlowUpdate> {
    handle.updates().collect().await
}

#[tokio::test]
async fn first_time_user_is_airdropped_before_paying() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));

    let mut handle = orchestrator(&env).start("1", USER).unwrap();
    let updates = collect(&mut handle).await;
    let receipt = handle.outcome().await.unwrap();

    assert_eq!(receipt.airdrop_amount, Some(amount("0.11")));
    assert_eq!(receipt.price, amount("0.1"));
    assert!(receipt.approve_hash.is_none());

    let airdrops = env.chain.submissions_of(SubmissionKind::NativeTransfer);
    assert_eq!(airdrops.len(), 1);
    assert_eq!(airdrops[0].from, OPERATOR);
    assert_eq!(airdrops[0].request.to, USER);
    assert_eq!(airdrops[0].request.value, amount("0.11").base_units());

    // The airdrop is mined before useMachine is sent.
    let airdrop_hash = receipt.airdrop_hash.unwrap();
    let events = env.chain.events();
    let confirmed = events
        .iter()
        .position(|e| *e == ChainEvent::Confirmed { hash: airdrop_hash })
        .unwrap();
    let used = events
        .iter()
        .position(|e| {
            matches!(
                e,
                ChainEvent::Submitted {
                    kind: SubmissionKind::UseMachine,
                    ..
                }
            )
        })
        .unwrap();
    assert!(confirmed < used);

    assert!(env.chain.has_used(1, USER));
    assert_eq!(env.chain.native_balance_of(USER), amount("0.01"));
    assert_eq!(env.chain.native_balance_of(REGISTRY), amount("0.1"));

    assert_matches!(updates.last(), Some(FlowUpdate::Completed(_)));
    assert!(updates.contains(&FlowUpdate::Confirmed {
        slot: TxSlot::Airdrop,
        hash: airdrop_hash,
    }));
    assert_eq!(
        env.chain.submissions().len(),
        2,
        "one airdrop and one useMachine"
    );
}

#[tokio::test]
async fn returning_user_without_funds_stops_before_submitting() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    env.chain.mark_used(1, USER);
    env.chain.set_native_balance(USER, amount("0.05"));

    let mut handle = orchestrator(&env).start("1", USER).unwrap();
    let updates = collect(&mut handle).await;
    let err = handle.outcome().await.unwrap_err();

    assert_eq!(
        err,
        MachinaError::InsufficientBalance {
            balance: amount("0.05"),
            required: amount("0.1"),
        }
    );
    let message = err.user_message();
    assert!(message.contains("0.05"));
    assert!(message.contains("0.1"));

    assert!(env.chain.submissions().is_empty());
    assert_matches!(
        updates.last(),
        Some(FlowUpdate::Failed(failure)) if failure.step == FlowStep::CheckingBalance
    );
}

#[tokio::test]
async fn returning_user_with_funds_pays_without_airdrop() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    env.chain.mark_used(1, USER);
    env.chain.set_native_balance(USER, amount("1"));

    let receipt = orchestrator(&env).run("1", USER).await.unwrap();

    assert!(receipt.airdrop_hash.is_none());
    assert!(env
        .chain
        .submissions_of(SubmissionKind::NativeTransfer)
        .is_empty());
    assert_eq!(env.chain.native_balance_of(USER), amount("0.9"));
}

#[tokio::test]
async fn rejected_payment_is_not_retried() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    env.chain.mark_used(1, USER);
    env.chain.set_native_balance(USER, amount("1"));
    env.chain.fail_next(
        SubmissionKind::UseMachine,
        ProviderError::new(Some(4001), "User rejected the request."),
    );

    let orchestrator = orchestrator(&env);
    let err = orchestrator.run("1", USER).await.unwrap_err();

    assert_eq!(err.tx_kind(), Some(TxErrorKind::UserRejected));
    assert_eq!(err.user_message(), "Transaction was rejected.");
    assert_eq!(env.chain.submissions_of(SubmissionKind::UseMachine).len(), 1);
    assert!(env.time.sleeps().is_empty());

    let state = orchestrator.transaction_state(TxSlot::UseMachine);
    assert_eq!(state.status, TxStatus::Error);
    assert_eq!(
        state.user_friendly_error.as_deref(),
        Some("Transaction was rejected.")
    );
}

#[tokio::test]
async fn transient_failures_back_off_and_recover() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    env.chain.mark_used(1, USER);
    env.chain.set_native_balance(USER, amount("1"));
    env.chain.fail_next(
        SubmissionKind::UseMachine,
        ProviderError::message("intrinsic gas too low"),
    );
    env.chain.fail_next(
        SubmissionKind::UseMachine,
        ProviderError::message("header not found"),
    );

    let mut handle = orchestrator(&env).start("1", USER).unwrap();
    let updates = collect(&mut handle).await;
    handle.outcome().await.unwrap();

    assert_eq!(
        env.time.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
    assert_eq!(env.chain.submissions_of(SubmissionKind::UseMachine).len(), 3);

    let retries: Vec<u32> = updates
        .iter()
        .filter_map(|u| match u {
            FlowUpdate::Retrying {
                slot: TxSlot::UseMachine,
                next_attempt,
                ..
            } => Some(*next_attempt),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![2, 3]);
}

#[tokio::test]
async fn transient_failures_give_up_after_three_attempts() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    env.chain.mark_used(1, USER);
    env.chain.set_native_balance(USER, amount("1"));
    for _ in 0..3 {
        env.chain.fail_next(
            SubmissionKind::UseMachine,
            ProviderError::message("out of gas"),
        );
    }

    let err = orchestrator(&env).run("1", USER).await.unwrap_err();

    assert_eq!(err.tx_kind(), Some(TxErrorKind::Gas));
    assert_eq!(env.chain.submissions_of(SubmissionKind::UseMachine).len(), 3);
    assert_eq!(env.time.sleeps().len(), 2);
}

#[tokio::test]
async fn duplicate_flow_is_refused_while_first_runs() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    env.chain.mark_used(1, USER);
    env.chain.set_native_balance(USER, amount("1"));
    env.chain.hold_receipts();

    let orchestrator = orchestrator(&env);
    let first = orchestrator.start("1", USER).unwrap();
    assert_matches!(
        orchestrator.start("1", USER),
        Err(MachinaError::FlowInProgress { user, .. }) if user == USER
    );

    env.chain.release_receipts();
    first.outcome().await.unwrap();
    assert_eq!(env.chain.submissions_of(SubmissionKind::UseMachine).len(), 1);

    // The claim is released once the flow finishes.
    env.chain.set_native_balance(USER, amount("1"));
    orchestrator.run("1", USER).await.unwrap();
    assert_eq!(env.chain.submissions_of(SubmissionKind::UseMachine).len(), 2);
}

#[tokio::test]
async fn token_mode_approves_only_when_allowance_is_short() {
    let env = TestEnv::token_approval();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    env.chain.mark_used(1, USER);
    env.chain.set_token_balance(USER, amount("1"));

    let orchestrator = orchestrator(&env);
    let receipt = orchestrator.run("1", USER).await.unwrap();
    assert!(receipt.approve_hash.is_some());
    assert_eq!(env.chain.submissions_of(SubmissionKind::Approve).len(), 1);

    let use_machine = env.chain.submissions_of(SubmissionKind::UseMachine);
    assert_eq!(use_machine.len(), 1);
    assert!(use_machine[0].request.value.is_zero());
    assert_eq!(env.chain.token_balance_of(USER), amount("0.9"));

    env.chain.set_allowance(USER, REGISTRY, amount("5"));
    let receipt = orchestrator.run("1", USER).await.unwrap();
    assert!(receipt.approve_hash.is_none());
    assert_eq!(env.chain.submissions_of(SubmissionKind::Approve).len(), 1);
    assert_eq!(env.chain.allowance_of(USER, REGISTRY), amount("4.9"));
}

#[tokio::test]
async fn token_mode_airdrops_tokens_to_first_time_user() {
    let env = TestEnv::token_approval();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));

    let receipt = orchestrator(&env).run("1", USER).await.unwrap();

    assert_eq!(receipt.airdrop_amount, Some(amount("0.11")));
    let transfers = env.chain.submissions_of(SubmissionKind::TokenTransfer);
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].from, OPERATOR);
    assert_eq!(env.chain.token_balance_of(USER), amount("0.01"));
    assert_eq!(env.chain.token_balance_of(REGISTRY), amount("0.1"));
}

#[tokio::test]
async fn missing_wallet_fails_first_step() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    let env = env.clone().with_user_wallet(env.chain.disconnected_wallet());

    let mut handle = orchestrator(&env).start("1", USER).unwrap();
    let updates = collect(&mut handle).await;

    assert_eq!(handle.outcome().await.unwrap_err(), MachinaError::NoWallet);
    assert_eq!(
        updates,
        vec![
            FlowUpdate::Step(FlowStep::CheckingWallet),
            FlowUpdate::Failed(machina_payment::FlowFailure::new(
                FlowStep::CheckingWallet,
                MachinaError::NoWallet
            )),
        ]
    );
}

#[tokio::test]
async fn other_account_is_refused() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    let other = alloy_primitives::Address::repeat_byte(0x22);
    let env = env.clone().with_user_wallet(env.chain.wallet(other));

    let err = orchestrator(&env).run("1", USER).await.unwrap_err();
    assert_eq!(
        err,
        MachinaError::WrongAccount {
            connected: other,
            requested: USER,
        }
    );
    assert!(env.chain.submissions().is_empty());
}

#[tokio::test]
async fn wallet_on_wrong_network_is_switched() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    let wallet = env.chain.wallet(USER).on_network(1);
    let env = env.clone().with_user_wallet(wallet.clone());

    orchestrator(&env).run("1", USER).await.unwrap();
    assert_eq!(wallet.switch_requests(), vec![env.chain.chain_id()]);
}

#[tokio::test]
async fn refused_network_switch_fails_flow() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    let wallet = env.chain.wallet(USER).on_network(1);
    wallet.refuse_switch(ProviderError::new(Some(4001), "User rejected the request."));
    let env = env.clone().with_user_wallet(wallet);

    let err = orchestrator(&env).run("1", USER).await.unwrap_err();
    assert_eq!(err.tx_kind(), Some(TxErrorKind::UserRejected));
    assert!(env.chain.submissions().is_empty());
}

#[tokio::test]
async fn unknown_machine_is_not_found() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));

    let err = orchestrator(&env).run("7", USER).await.unwrap_err();
    assert_eq!(
        err,
        MachinaError::MachineNotFound {
            index: MachineIndex::from(7u64)
        }
    );
    assert!(env.chain.submissions().is_empty());
}

#[tokio::test]
async fn unparseable_id_fails_at_start() {
    let env = TestEnv::native();
    assert_matches!(
        orchestrator(&env).start("machine-one", USER),
        Err(MachinaError::InvalidMachineId { .. })
    );
}

#[tokio::test]
async fn retry_clears_failed_slot_and_pays() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    env.chain.mark_used(1, USER);
    env.chain.set_native_balance(USER, amount("1"));
    env.chain.fail_next(
        SubmissionKind::UseMachine,
        ProviderError::new(Some(4001), "User rejected the request."),
    );

    let orchestrator = orchestrator(&env);
    orchestrator.run("1", USER).await.unwrap_err();
    assert_eq!(
        orchestrator.transaction_state(TxSlot::UseMachine).status,
        TxStatus::Error
    );

    let handle = orchestrator.retry("1", USER).unwrap();
    handle.outcome().await.unwrap();
    assert_eq!(
        orchestrator.transaction_state(TxSlot::UseMachine).status,
        TxStatus::Success
    );
}

#[tokio::test]
async fn outcomes_are_posted_as_notifications() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    let notifications = Arc::new(NotificationService::new(Arc::new(MemoryStore::new())));
    let orchestrator = orchestrator(&env).with_notifications(notifications.clone());

    orchestrator.run("1", USER).await.unwrap();

    let feed = notifications.notifications().await;
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].title, "Transaction Complete");
    assert_eq!(feed[0].message, "Successfully paid 0.1 PEAQ to Robo Cafe");
    assert_eq!(feed[1].title, "Funds Received");

    env.chain.set_native_balance(USER, TokenAmount::ZERO);
    orchestrator.run("1", USER).await.unwrap_err();
    let feed = notifications.notifications().await;
    assert_eq!(feed[0].kind, NotificationKind::System);
    assert_eq!(feed[0].title, "Payment Failed");
}

#[tokio::test]
async fn retry_after_airdrop_does_not_airdrop_again() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    env.chain.fail_next(
        SubmissionKind::UseMachine,
        ProviderError::new(Some(4001), "User rejected the request."),
    );

    let orchestrator = orchestrator(&env);
    let err = orchestrator.run("1", USER).await.unwrap_err();
    assert_eq!(err.tx_kind(), Some(TxErrorKind::UserRejected));
    assert!(!env.chain.has_used(1, USER));
    assert_eq!(env.chain.native_balance_of(USER), amount("0.11"));

    let mut handle = orchestrator.retry("1", USER).unwrap();
    let updates = collect(&mut handle).await;
    let receipt = handle.outcome().await.unwrap();

    assert!(receipt.airdrop_hash.is_none());
    assert!(receipt.airdrop_amount.is_none());
    assert_eq!(
        env.chain.submissions_of(SubmissionKind::NativeTransfer).len(),
        1
    );
    assert!(!updates.iter().any(|u| matches!(
        u,
        FlowUpdate::Confirmed {
            slot: TxSlot::Airdrop,
            ..
        }
    )));
    assert!(env.chain.has_used(1, USER));
    assert_eq!(env.chain.native_balance_of(USER), amount("0.01"));
}

#[tokio::test]
async fn first_time_token_user_with_balance_skips_airdrop() {
    let env = TestEnv::token_approval();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    env.chain.set_token_balance(USER, amount("0.5"));

    let receipt = orchestrator(&env).run("1", USER).await.unwrap();

    assert!(receipt.airdrop_hash.is_none());
    assert!(env
        .chain
        .submissions_of(SubmissionKind::TokenTransfer)
        .is_empty());
    assert_eq!(env.chain.token_balance_of(USER), amount("0.4"));
}

async fn submit_once_failing_with(message: &str) -> (TestEnv, MachinaError) {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    env.chain.mark_used(1, USER);
    env.chain.set_native_balance(USER, amount("1"));
    env.chain
        .fail_next(SubmissionKind::UseMachine, ProviderError::message(message));

    let err = orchestrator(&env).run("1", USER).await.unwrap_err();
    (env, err)
}

#[tokio::test]
async fn insufficient_funds_is_submitted_once() {
    let (env, err) =
        submit_once_failing_with("insufficient funds for gas * price + value").await;

    assert_eq!(err.tx_kind(), Some(TxErrorKind::InsufficientFunds));
    assert_eq!(env.chain.submissions_of(SubmissionKind::UseMachine).len(), 1);
    assert!(env.time.sleeps().is_empty());
}

#[tokio::test]
async fn already_known_is_not_resent() {
    let (env, err) = submit_once_failing_with("already known").await;

    assert_eq!(err.tx_kind(), Some(TxErrorKind::AlreadyKnown));
    assert_eq!(env.chain.submissions_of(SubmissionKind::UseMachine).len(), 1);
    assert!(env.time.sleeps().is_empty());
}

#[tokio::test]
async fn failed_payment_posts_transaction_failure() {
    let env = TestEnv::native();
    env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
    env.chain.fail_next(
        SubmissionKind::UseMachine,
        ProviderError::new(Some(4001), "User rejected the request."),
    );
    let notifications = Arc::new(NotificationService::new(Arc::new(MemoryStore::new())));
    let orchestrator = orchestrator(&env).with_notifications(notifications.clone());

    orchestrator.run("1", USER).await.unwrap_err();

    let feed = notifications.notifications().await;
    let titles: Vec<_> = feed.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["Transaction Failed", "Funds Received"]);
    assert_eq!(feed[0].kind, NotificationKind::Transaction);
    assert_eq!(feed[0].message, "Failed to pay 0.1 PEAQ to Robo Cafe");
}
