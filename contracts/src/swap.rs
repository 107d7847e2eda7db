//! # Two-Party Swap
//!
//! An atomic exchange between two parties who never have to trust each
//! other, built on nothing but escrow linearity. The protocol is three
//! calls, typically one per transaction:
//!
//! 1. **First deposit.** Party one pays a coin in. The swap absorbs its
//!    backing and releases nothing.
//! 2. **Second deposit.** Party two pays a coin in and immediately
//!    receives party one's coin back out.
//! 3. **Claim.** Party one calls with an empty payment and the swap
//!    spends itself, paying out party two's coin.
//!
//! At every point each coin's backing entry is in exactly one escrow map:
//! the depositor's transaction frame, the swap's own map, or the
//! counterparty's frame. There is no state in which value is duplicated
//! or stranded; aborting mid-protocol leaves the swap holding the
//! deposits, exactly as escrowed exchanges should.
//!
//! All three phases speak [`Payment`], so the contract's declared types
//! stay fixed: deposits are singleton payments, the claim is an empty
//! one.

use fae_engine::error::{EngineError, InputError};
use fae_engine::runtime::{CallCtx, ContractCode, Outcome};
use fae_engine::value::{Dynamic, FaeValue};
use fae_engine::ShortContractId;
use std::collections::BTreeSet;

use crate::mint::{Coin, Payment};

fn single(payment: Payment) -> Result<Coin, EngineError> {
    let mut coins = payment.into_iter();
    match (coins.next(), coins.next()) {
        (Some(coin), None) => Ok(coin),
        _ => Err(InputError::MalformedValue(Payment::type_tag()).into()),
    }
}

fn empty(payment: Payment) -> Result<(), EngineError> {
    if payment.is_empty() {
        Ok(())
    } else {
        Err(InputError::MalformedValue(Payment::type_tag()).into())
    }
}

/// Phase one: waiting for the first deposit.
#[derive(Clone)]
struct AwaitFirst;

impl ContractCode for AwaitFirst {
    fn call(
        self: Box<Self>,
        _ctx: &mut CallCtx<'_>,
        arg: Dynamic,
    ) -> Result<Outcome, EngineError> {
        let first = single(arg.decode()?)?;
        Ok(Outcome::Release {
            value: Dynamic::new(Payment::new()),
            next: Box::new(AwaitSecond { first }),
        })
    }

    fn boxed_clone(&self) -> Box<dyn ContractCode> {
        Box::new(self.clone())
    }
}

/// Phase two: holding the first deposit, waiting for the second.
#[derive(Clone)]
struct AwaitSecond {
    first: Coin,
}

impl ContractCode for AwaitSecond {
    fn call(
        self: Box<Self>,
        _ctx: &mut CallCtx<'_>,
        arg: Dynamic,
    ) -> Result<Outcome, EngineError> {
        let second = single(arg.decode()?)?;
        Ok(Outcome::Release {
            value: Dynamic::new(vec![self.first]),
            next: Box::new(PayFirst { second }),
        })
    }

    fn boxed_clone(&self) -> Box<dyn ContractCode> {
        Box::new(self.clone())
    }
}

/// Phase three: holding the second deposit for party one to claim.
#[derive(Clone)]
struct PayFirst {
    second: Coin,
}

impl ContractCode for PayFirst {
    fn call(
        self: Box<Self>,
        _ctx: &mut CallCtx<'_>,
        arg: Dynamic,
    ) -> Result<Outcome, EngineError> {
        empty(arg.decode()?)?;
        Ok(Outcome::Spend {
            value: Dynamic::new(vec![self.second]),
        })
    }

    fn boxed_clone(&self) -> Box<dyn ContractCode> {
        Box::new(self.clone())
    }
}

/// Publish a fresh swap into the current output scope.
///
/// `trusts` should contain the short IDs of the contracts whose payments
/// the swap will accept as chained deposits, typically the mint.
pub fn publish_swap(
    ctx: &mut CallCtx<'_>,
    trusts: BTreeSet<ShortContractId>,
) -> Result<(), EngineError> {
    ctx.new_contract::<Payment, Payment>(vec![], trusts, Box::new(AwaitFirst))
}
