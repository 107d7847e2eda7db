//! End-to-end tests for the Fae transaction engine.
//!
//! These exercise the full orchestration path: input dispatch with nonce
//! and trust checks, reward injection, body execution, escrow closure,
//! and commit, plus the failure path, where a transaction must poison
//! its entry and leave every other byte of storage alone.
//!
//! Each test builds its own storage from a genesis transaction. No shared
//! state, no ordering dependencies.

use std::collections::BTreeSet;

use fae_engine::error::{EngineError, EscrowError, InputError, StorageError};
use fae_engine::escrow::EscrowId;
use fae_engine::runtime::{one_shot, CallCtx, ContractCode, Outcome};
use fae_engine::transaction::{run_transaction, Reward, TxRequest};
use fae_engine::value::Dynamic;
use fae_engine::{ContractId, Keypair, PublicKey, Storage, TransactionId};

// ---------------------------------------------------------------------------
// Test Contracts
// ---------------------------------------------------------------------------

/// Echoes its integer argument forever.
#[derive(Clone)]
struct Identity;

impl ContractCode for Identity {
    fn call(
        self: Box<Self>,
        _ctx: &mut CallCtx<'_>,
        arg: Dynamic,
    ) -> Result<Outcome, EngineError> {
        Ok(Outcome::Release {
            value: arg,
            next: Box::new(Identity),
        })
    }

    fn boxed_clone(&self) -> Box<dyn ContractCode> {
        Box::new(Identity)
    }
}

/// Always returns the same integer, forever.
#[derive(Clone)]
struct Constant(i64);

impl ContractCode for Constant {
    fn call(
        self: Box<Self>,
        _ctx: &mut CallCtx<'_>,
        arg: Dynamic,
    ) -> Result<Outcome, EngineError> {
        arg.decode::<()>()?;
        let n = self.0;
        Ok(Outcome::Release {
            value: Dynamic::new(n),
            next: self,
        })
    }

    fn boxed_clone(&self) -> Box<dyn ContractCode> {
        Box::new(self.clone())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn signer() -> PublicKey {
    Keypair::from_seed(&[42u8; 32]).public_key()
}

fn tx(label: &str) -> TransactionId {
    TransactionId::derive(label.as_bytes())
}

/// Seed a storage with a genesis transaction publishing a single
/// [`Identity`] contract; returns storage and the contract's ID.
fn seed_identity(label: &str) -> (Storage, ContractId) {
    let mut storage = Storage::new();
    let genesis = tx(label);
    run_transaction::<(), (), _>(
        &mut storage,
        TxRequest::new(genesis, signer()),
        |ctx, ()| ctx.new_contract::<i64, i64>(vec![], BTreeSet::new(), Box::new(Identity)),
    )
    .unwrap();
    (storage, ContractId::TransactionOutput(genesis, 0))
}

// ---------------------------------------------------------------------------
// 1. Literal identity
// ---------------------------------------------------------------------------

#[test]
fn literal_identity() {
    let (mut storage, c) = seed_identity("e2e-1");
    let result = run_transaction::<(i64,), i64, _>(
        &mut storage,
        TxRequest::new(tx("e2e-1-run"), signer()).literal(c.clone(), 7i64),
        |_ctx, (n,)| Ok(n + 1),
    )
    .unwrap();
    assert_eq!(result, 8);

    let entry = storage.entry(&tx("e2e-1-run")).unwrap();
    assert_eq!(entry.input_order().unwrap(), &[c.shorten()]);
    assert!(entry.outputs().unwrap().is_empty());
    assert_eq!(storage.slot(&c).unwrap().nonce(), 1);
}

// ---------------------------------------------------------------------------
// 2 & 3. Trusted chaining
// ---------------------------------------------------------------------------

fn seed_chain(label: &str, b_trusts_a: bool) -> (Storage, ContractId, ContractId) {
    // A is published first so its ID is known for B's trust set; both
    // come from the same genesis.
    let genesis = tx(label);
    let a = ContractId::TransactionOutput(genesis, 0);
    let trusts = if b_trusts_a {
        BTreeSet::from([a.shorten()])
    } else {
        BTreeSet::new()
    };
    let mut storage = Storage::new();
    run_transaction::<(), (), _>(
        &mut storage,
        TxRequest::new(genesis, signer()),
        move |ctx, ()| {
            ctx.new_contract::<(), i64>(vec![], BTreeSet::new(), Box::new(Constant(42)))?;
            ctx.new_contract::<i64, i64>(vec![], trusts, Box::new(Identity))
        },
    )
    .unwrap();
    (storage, a, ContractId::TransactionOutput(genesis, 1))
}

#[test]
fn trusted_chaining_accepted() {
    let (mut storage, a, b) = seed_chain("e2e-2", true);
    let result = run_transaction::<(i64, i64), i64, _>(
        &mut storage,
        TxRequest::new(tx("e2e-2-run"), signer())
            .literal(a, ())
            .trusted(b, 0),
        |_ctx, (_first, second)| Ok(second),
    )
    .unwrap();
    assert_eq!(result, 42);
}

#[test]
fn trusted_chaining_rejected() {
    let (mut storage, a, b) = seed_chain("e2e-3", false);
    let run = tx("e2e-3-run");
    let err = run_transaction::<(i64, i64), i64, _>(
        &mut storage,
        TxRequest::new(run, signer())
            .literal(a.clone(), ())
            .trusted(b.clone(), 0),
        |_ctx, (_first, second)| Ok(second),
    )
    .unwrap_err();
    assert_eq!(
        err,
        InputError::UntrustedInput {
            contract: b,
            source_contract: a,
        }
        .into()
    );
    assert!(storage.entry(&run).unwrap().is_poisoned());
}

// ---------------------------------------------------------------------------
// 4. Escrow conservation violation
// ---------------------------------------------------------------------------

#[test]
fn open_escrow_poisons_and_leaks_nothing() {
    let (mut storage, _c) = seed_identity("e2e-4");
    let genesis = tx("e2e-4");
    let before: Vec<_> = storage.transaction_ids().copied().collect();
    let genesis_before = fae_engine::show_transaction(&storage, &genesis).unwrap();
    let run = tx("e2e-4-run");

    let err = run_transaction::<(), i64, _>(
        &mut storage,
        TxRequest::new(run, signer()),
        |ctx, ()| {
            let _leaked: EscrowId<(), u64> =
                ctx.new_escrow(vec![], one_shot(|_ctx, ()| Ok(1u64)))?;
            Ok(0)
        },
    )
    .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Escrow(EscrowError::OpenEscrows(ref open)) if open.len() == 1
    ));

    // Exactly one new transaction ID: the poisoned entry. The
    // pre-existing entry renders byte-identically.
    let after: Vec<_> = storage.transaction_ids().copied().collect();
    assert_eq!(after.len(), before.len() + 1);
    assert!(after.contains(&run));
    assert_eq!(
        fae_engine::show_transaction(&storage, &genesis).unwrap(),
        genesis_before
    );

    let entry = storage.entry(&run).unwrap();
    assert_eq!(entry.result().unwrap_err(), err);
    assert_eq!(entry.outputs().unwrap_err(), err);
}

// ---------------------------------------------------------------------------
// 5. Reward injection
// ---------------------------------------------------------------------------

#[test]
fn reward_escrow_injected_and_spendable() {
    let mut storage = Storage::new();
    let result = run_transaction::<(EscrowId<(), Reward>,), Reward, _>(
        &mut storage,
        TxRequest::new(tx("e2e-5"), signer()).reward(),
        |ctx, (reward,)| ctx.use_escrow(&reward, ()),
    )
    .unwrap();
    assert_eq!(result, Reward);
}

#[test]
fn non_reward_transaction_gets_no_extra_input() {
    let mut storage = Storage::new();
    // The body declares one input but none are supplied and no reward is
    // injected.
    let err = run_transaction::<(EscrowId<(), Reward>,), i64, _>(
        &mut storage,
        TxRequest::new(tx("e2e-5b"), signer()),
        |_ctx, _| Ok(0),
    )
    .unwrap_err();
    assert_eq!(
        err,
        InputError::NotEnoughInputs {
            expected: 1,
            actual: 0
        }
        .into()
    );
}

// ---------------------------------------------------------------------------
// 6. Nonce check
// ---------------------------------------------------------------------------

#[test]
fn wrong_nonce_assertion_fails() {
    let (mut storage, c) = seed_identity("e2e-6");
    // Call the contract twice to advance its nonce to 2.
    for i in 0..2 {
        run_transaction::<(i64,), i64, _>(
            &mut storage,
            TxRequest::new(tx(&format!("e2e-6-{i}")), signer()).literal(c.clone(), 1i64),
            |_ctx, (n,)| Ok(n),
        )
        .unwrap();
    }
    assert_eq!(storage.slot(&c).unwrap().nonce(), 2);

    let err = run_transaction::<(i64,), i64, _>(
        &mut storage,
        TxRequest::new(tx("e2e-6-bad"), signer()).literal(c.clone().at_nonce(1), 1i64),
        |_ctx, (n,)| Ok(n),
    )
    .unwrap_err();
    assert_eq!(
        err,
        StorageError::BadNonce {
            id: c.clone(),
            actual: 2,
            claimed: 1,
        }
        .into()
    );

    // The failed transaction did not advance the nonce, so the correct
    // assertion is still 2 and dispatches fine.
    run_transaction::<(i64,), i64, _>(
        &mut storage,
        TxRequest::new(tx("e2e-6-good"), signer()).literal(c.at_nonce(2), 1i64),
        |_ctx, (n,)| Ok(n),
    )
    .unwrap();
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn identical_runs_produce_identical_audit_bytes() {
    let run = || {
        let (mut storage, c) = seed_identity("e2e-det");
        run_transaction::<(i64,), i64, _>(
            &mut storage,
            TxRequest::new(tx("e2e-det-run"), signer()).literal(c, 9i64),
            |ctx, (n,)| {
                let coin: EscrowId<(), u64> =
                    ctx.new_escrow(vec![], one_shot(|_ctx, ()| Ok(3u64)))?;
                let three = ctx.use_escrow(&coin, ())?;
                Ok(n + three as i64)
            },
        )
        .unwrap();
        storage.audit()
    };
    assert_eq!(run(), run());
}

// ---------------------------------------------------------------------------
// Boundary behaviors
// ---------------------------------------------------------------------------

#[test]
fn chained_reference_to_later_input_fails() {
    let (mut storage, c) = seed_identity("e2e-chain-range");
    let err = run_transaction::<(i64,), i64, _>(
        &mut storage,
        TxRequest::new(tx("e2e-chain-range-run"), signer()).trusted(c.clone(), 0),
        |_ctx, (n,)| Ok(n),
    )
    .unwrap_err();
    assert_eq!(err, InputError::BadChainedInput(c, 0).into());
}

#[test]
fn empty_inputs_empty_body() {
    let mut storage = Storage::new();
    let result = run_transaction::<(), i64, _>(
        &mut storage,
        TxRequest::new(tx("e2e-empty"), signer()),
        |_ctx, ()| Ok(5),
    )
    .unwrap();
    assert_eq!(result, 5);
}

#[test]
fn duplicate_transaction_id_is_rejected_without_poisoning() {
    let mut storage = Storage::new();
    let id = tx("e2e-dup");
    run_transaction::<(), i64, _>(&mut storage, TxRequest::new(id, signer()), |_ctx, ()| {
        Ok(1)
    })
    .unwrap();
    let err = run_transaction::<(), i64, _>(
        &mut storage,
        TxRequest::new(id, signer()),
        |_ctx, ()| Ok(2),
    )
    .unwrap_err();
    assert_eq!(err, StorageError::BadTransactionId(id).into());
    // The original committed entry is untouched.
    assert_eq!(
        storage
            .entry(&id)
            .unwrap()
            .result()
            .unwrap()
            .clone()
            .decode::<i64>()
            .unwrap(),
        1
    );
}

// ---------------------------------------------------------------------------
// Index stability & input outputs
// ---------------------------------------------------------------------------

#[test]
fn spending_one_output_leaves_sibling_indices_alone() {
    let genesis = tx("e2e-stable");
    let mut storage = Storage::new();
    run_transaction::<(), (), _>(
        &mut storage,
        TxRequest::new(genesis, signer()),
        |ctx, ()| {
            for n in 0..3i64 {
                ctx.new_contract::<(), i64>(
                    vec![],
                    BTreeSet::new(),
                    one_shot(move |_ctx, ()| Ok(n * 10)),
                )?;
            }
            Ok(())
        },
    )
    .unwrap();

    // Spend output 1 (a one-shot: its call spends it).
    let middle = ContractId::TransactionOutput(genesis, 1);
    run_transaction::<(i64,), i64, _>(
        &mut storage,
        TxRequest::new(tx("e2e-stable-spend"), signer()).literal(middle.clone(), ()),
        |_ctx, (n,)| Ok(n),
    )
    .unwrap();

    let spent = storage.slot(&middle).unwrap();
    assert!(spent.is_spent());
    assert_eq!(spent.nonce(), 1);
    for i in [0usize, 2] {
        let slot = storage
            .slot(&ContractId::TransactionOutput(genesis, i))
            .unwrap();
        assert!(!slot.is_spent());
        assert_eq!(slot.nonce(), 0);
    }
}

#[test]
fn input_published_contracts_reachable_after_commit() {
    // A contract that publishes a new contract during its call; the
    // publication is attributed to the input and dispatchable later via
    // the InputOutput path.
    let (mut storage, publisher) = {
        let genesis = tx("e2e-inout");
        let mut storage = Storage::new();
        run_transaction::<(), (), _>(
            &mut storage,
            TxRequest::new(genesis, signer()),
            |ctx, ()| {
                ctx.new_contract::<(), i64>(
                    vec![],
                    BTreeSet::new(),
                    one_shot(|ctx: &mut CallCtx<'_>, ()| {
                        ctx.new_contract::<(), i64>(
                            vec![],
                            BTreeSet::new(),
                            one_shot(|_ctx, ()| Ok(77i64)),
                        )?;
                        Ok(0i64)
                    }),
                )
            },
        )
        .unwrap();
        (storage, ContractId::TransactionOutput(genesis, 0))
    };

    let run = tx("e2e-inout-run");
    run_transaction::<(i64,), i64, _>(
        &mut storage,
        TxRequest::new(run, signer()).literal(publisher.clone(), ()),
        |_ctx, (n,)| Ok(n),
    )
    .unwrap();

    // The transaction's own outputs are empty; the publication belongs to
    // the input.
    let entry = storage.entry(&run).unwrap();
    assert!(entry.outputs().unwrap().is_empty());
    let record = &entry.input_outputs().unwrap()[&publisher.shorten()];
    assert_eq!(record.outputs.len(), 1);

    // And it is dispatchable under the InputOutput contract ID.
    let inner = ContractId::InputOutput(run, publisher.shorten(), 0);
    let got = run_transaction::<(i64,), i64, _>(
        &mut storage,
        TxRequest::new(tx("e2e-inout-call"), signer()).literal(inner, ()),
        |_ctx, (n,)| Ok(n),
    )
    .unwrap();
    assert_eq!(got, 77);
}
