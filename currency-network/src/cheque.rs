//! Off-chain signed cheques
//!
//! A cheque authorizes a direct, fee-free transfer of `amount` from `from`
//! to `to` until mtime `expires_on`. It is signed over
//! `keccak256(from ‖ to ‖ uint32 amount ‖ uint32 expires_on)` and can be
//! cashed exactly once.

use crate::{
    crypto::{self, KeyPair, Signature},
    ledger::TrustlineLedger,
    transfer::{PathTransferEngine, TransferReceipt},
    types::{validate_value, Address, Hash32},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Digest a cheque author signs
pub fn cheque_digest(from: Address, to: Address, amount: u64, expires_on: u64) -> Result<Hash32> {
    let amount = validate_value("cheque amount", amount)? as u32;
    let expires_on = validate_value("cheque expiry", expires_on)? as u32;

    let mut packed = Vec::with_capacity(20 + 20 + 4 + 4);
    packed.extend_from_slice(from.as_bytes());
    packed.extend_from_slice(to.as_bytes());
    packed.extend_from_slice(&amount.to_be_bytes());
    packed.extend_from_slice(&expires_on.to_be_bytes());
    Ok(crypto::keccak256(&packed))
}

/// A signed balance claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cheque {
    /// Payer and signer
    pub from: Address,
    /// Payee
    pub to: Address,
    /// Value to move
    pub amount: u64,
    /// Last valid mtime
    pub expires_on: u64,
    /// Signature of `from` over the cheque digest
    pub signature: Signature,
}

impl Cheque {
    /// Write and sign a cheque with the payer's key
    pub fn sign(keypair: &KeyPair, to: Address, amount: u64, expires_on: u64) -> Result<Self> {
        let from = keypair.address();
        let digest = cheque_digest(from, to, amount, expires_on)?;
        Ok(Self {
            from,
            to,
            amount,
            expires_on,
            signature: keypair.sign_digest(&digest),
        })
    }

    fn tuple(&self) -> (Address, Address, u64, u64) {
        (self.from, self.to, self.amount, self.expires_on)
    }
}

/// Validates and cashes cheques, remembering every consumed one
#[derive(Debug, Clone, Default)]
pub struct ChequeRedeemer {
    redeemed: HashSet<(Address, Address, u64, u64)>,
}

impl ChequeRedeemer {
    /// Redeemer with no history
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the cheque's tuple has been cashed
    pub fn is_redeemed(&self, cheque: &Cheque) -> bool {
        self.redeemed.contains(&cheque.tuple())
    }

    /// Number of cashed cheques
    pub fn redeemed_count(&self) -> usize {
        self.redeemed.len()
    }

    /// Cash `cheque` at mtime `now`
    pub fn redeem(
        &mut self,
        ledger: &mut TrustlineLedger,
        engine: &PathTransferEngine,
        now: u64,
        cheque: &Cheque,
    ) -> Result<TransferReceipt> {
        if cheque.from == cheque.to {
            return Err(Error::SelfTransfer(cheque.from));
        }
        let digest = cheque_digest(cheque.from, cheque.to, cheque.amount, cheque.expires_on)?;

        let signer = crypto::recover(&digest, &cheque.signature)?;
        if signer != cheque.from {
            return Err(Error::InvalidSignature(format!(
                "cheque of {} signed by {}",
                cheque.from, signer
            )));
        }

        if cheque.expires_on < now {
            return Err(Error::ChequeExpired {
                expires_on: cheque.expires_on,
                now,
            });
        }
        if self.is_redeemed(cheque) {
            return Err(Error::ChequeAlreadyRedeemed);
        }

        let receipt = engine.execute(ledger, cheque.from, cheque.to, cheque.amount, 0, &[cheque.to])?;
        self.redeemed.insert(cheque.tuple());

        tracing::info!(
            from = %cheque.from,
            to = %cheque.to,
            amount = cheque.amount,
            expires_on = cheque.expires_on,
            "Cheque redeemed"
        );
        Ok(receipt)
    }
}
