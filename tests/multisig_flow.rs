use alloy_primitives::{address, Address, Bytes, U256};
use alloy_sol_types::SolCall;
use deploy_orchestrator::events::{query_events, EventInterface};
use deploy_orchestrator::features::abi::{ICustomProxy, SUBMISSION_EVENT};
use deploy_orchestrator::test_support::{block_on_with_spin, MockChain, MOCK_GAS_ESTIMATE};
use deploy_orchestrator::{MultisigOrchestrator, OrchestratorError};

const WALLET: Address = address!("189ecd23e9e34cfc07bfc3b7f5711a23f43f8a57");
const OWNER_1: Address = address!("1111111111111111111111111111111111111111");
const OWNER_2: Address = address!("2222222222222222222222222222222222222222");
const OWNER_3: Address = address!("3333333333333333333333333333333333333333");
const PROXY: Address = address!("9000000000000000000000000000000000000001");
const OLD_LOGIC: Address = address!("1000000000000000000000000000000000000002");
const NEW_LOGIC: Address = address!("2000000000000000000000000000000000000003");

fn two_of_three() -> MockChain {
    MockChain::new()
        .with_account(OWNER_1)
        .with_account(OWNER_2)
        .with_account(OWNER_3)
        .with_multisig(WALLET, &[OWNER_1, OWNER_2, OWNER_3], 2)
        .with_proxy(PROXY, WALLET, OLD_LOGIC)
}

fn set_implementation(implementation: Address) -> Bytes {
    Bytes::from(ICustomProxy::setImplementationCall { implementation }.abi_encode())
}

#[test]
fn submit_confirm_executes_at_threshold() {
    let chain = two_of_three();
    let multisig = MultisigOrchestrator::new(&chain, WALLET);

    let tx_id = block_on_with_spin(multisig.submit(
        PROXY,
        U256::ZERO,
        set_implementation(NEW_LOGIC),
        OWNER_1,
    ))
    .expect("submission should succeed");

    let pending = block_on_with_spin(multisig.status(tx_id)).expect("status should load");
    assert!(!pending.executed);
    assert!(pending.confirmation_count >= U256::from(1u64));
    assert_eq!(chain.implementation_of(PROXY), Some(OLD_LOGIC));

    let executed = block_on_with_spin(multisig.confirm(tx_id, OWNER_3))
        .expect("confirmation should succeed")
        .status
        .expect("status should be read back");
    assert!(executed.executed);
    assert_eq!(executed.confirmations, vec![OWNER_1, OWNER_3]);
    assert_eq!(chain.implementation_of(PROXY), Some(NEW_LOGIC));

    let padded = MOCK_GAS_ESTIMATE + MOCK_GAS_ESTIMATE * 3 / 10;
    assert!(chain
        .sent_transactions()
        .iter()
        .all(|sent| sent.success && sent.gas_limit == Some(padded)));
}

#[test]
fn revoked_transaction_needs_fresh_confirmations() {
    let chain = two_of_three();
    let multisig = MultisigOrchestrator::new(&chain, WALLET);

    let tx_id = block_on_with_spin(multisig.submit(
        PROXY,
        U256::ZERO,
        set_implementation(NEW_LOGIC),
        OWNER_1,
    ))
    .expect("submission should succeed");
    let revoked = block_on_with_spin(multisig.revoke(tx_id, OWNER_1))
        .expect("revoke should succeed")
        .status
        .expect("status should be read back");
    assert_eq!(revoked.confirmation_count, U256::ZERO);

    let one = block_on_with_spin(multisig.confirm(tx_id, OWNER_2))
        .expect("confirm should succeed")
        .status
        .expect("status should be read back");
    assert!(!one.executed);
    let two = block_on_with_spin(multisig.confirm(tx_id, OWNER_3))
        .expect("confirm should succeed")
        .status
        .expect("status should be read back");
    assert!(two.executed);
    assert_eq!(chain.implementation_of(PROXY), Some(NEW_LOGIC));
}

#[test]
fn executed_transaction_cannot_be_revoked() {
    let chain = two_of_three();
    let multisig = MultisigOrchestrator::new(&chain, WALLET);

    let tx_id = block_on_with_spin(multisig.submit(
        PROXY,
        U256::ZERO,
        set_implementation(NEW_LOGIC),
        OWNER_1,
    ))
    .expect("submission should succeed");
    block_on_with_spin(multisig.confirm(tx_id, OWNER_2)).expect("confirm should succeed");

    let error = block_on_with_spin(multisig.revoke(tx_id, OWNER_1))
        .expect_err("executed transactions are immutable");
    assert!(matches!(error, OrchestratorError::ChainCallFailed { .. }));
    let status = block_on_with_spin(multisig.status(tx_id)).expect("status should load");
    assert!(status.executed);
    assert_eq!(status.confirmation_count, U256::from(2u64));
}

#[test]
fn submission_history_is_queryable() {
    let chain = two_of_three();
    let multisig = MultisigOrchestrator::new(&chain, WALLET);

    for implementation in [NEW_LOGIC, OLD_LOGIC] {
        block_on_with_spin(multisig.submit(
            PROXY,
            U256::ZERO,
            set_implementation(implementation),
            OWNER_2,
        ))
        .expect("submission should succeed");
    }

    let submission = EventInterface::parse(SUBMISSION_EVENT).expect("signature should parse");
    let history = block_on_with_spin(query_events(&chain, WALLET, &submission, 0, None))
        .expect("log query should succeed");
    let ids = history
        .iter()
        .map(|event| event.uint("transactionId").expect("id should decode"))
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![U256::ZERO, U256::from(1u64)]);

    let first_block_only =
        block_on_with_spin(query_events(&chain, WALLET, &submission, 0, Some(1)))
            .expect("log query should succeed");
    assert_eq!(first_block_only.len(), 1);
}
