//! # Coin Mint
//!
//! The simplest value-issuing contract: every call takes a face value and
//! releases a freshly minted [`Coin`]: an escrow that pays out its face
//! value once, to whoever spends it. Scarcity comes from the engine, not
//! from bookkeeping here: the coin's backing entry exists in exactly one
//! escrow map at a time, so a coin cannot be copied, only moved.
//!
//! The mint itself never terminates; each call releases a continuation
//! that remembers the running total issued.

use fae_engine::error::EngineError;
use fae_engine::runtime::{one_shot, CallCtx, ContractCode, Outcome};
use fae_engine::value::Dynamic;
use fae_engine::EscrowId;
use std::collections::BTreeSet;

use fae_engine::ShortContractId;

/// A coin: an escrow redeemable exactly once for its face value.
pub type Coin = EscrowId<(), u64>;

/// The payment shape all reference contracts speak: a list of coins,
/// usually a singleton. A list rather than a bare coin so that deposit
/// and claim phases of multi-step protocols can share one declared type.
pub type Payment = Vec<Coin>;

/// The mint's resumable state.
#[derive(Clone)]
struct Mint {
    issued: u64,
}

impl ContractCode for Mint {
    fn call(
        self: Box<Self>,
        ctx: &mut CallCtx<'_>,
        arg: Dynamic,
    ) -> Result<Outcome, EngineError> {
        let amount: u64 = arg.decode()?;
        let coin: Coin =
            ctx.new_escrow(vec![], one_shot(move |_ctx, ()| Ok(amount)))?;
        Ok(Outcome::Release {
            value: Dynamic::new(vec![coin]),
            next: Box::new(Mint {
                issued: self.issued + amount,
            }),
        })
    }

    fn boxed_clone(&self) -> Box<dyn ContractCode> {
        Box::new(self.clone())
    }
}

/// Publish a mint into the current output scope.
///
/// The mint takes a `u64` face value and returns a singleton [`Payment`].
pub fn publish_mint(
    ctx: &mut CallCtx<'_>,
    trusts: BTreeSet<ShortContractId>,
) -> Result<(), EngineError> {
    ctx.new_contract::<u64, Payment>(vec![], trusts, Box::new(Mint { issued: 0 }))
}

/// Spend a coin for its face value.
pub fn redeem(ctx: &mut CallCtx<'_>, coin: &Coin) -> Result<u64, EngineError> {
    ctx.use_escrow(coin, ())
}
