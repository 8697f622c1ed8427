//! Signed exchange orders
//!
//! An order is identified by the Keccak-256 of its tightly packed fields,
//! addresses as 20 bytes and numbers as 32-byte big-endian words:
//!
//! ```text
//! exchange ‖ maker ‖ taker ‖ makerAsset ‖ takerAsset ‖ feeRecipient ‖
//! makerAmount ‖ takerAmount ‖ makerFee ‖ takerFee ‖ expiration ‖ salt
//! ```
//!
//! The maker signs that hash as an Ethereum personal message.

use crate::amount::U256;
use currency_network::{
    crypto::{self, KeyPair, Signature},
    Address, Hash32,
};
use serde::{Deserialize, Serialize};

/// An offer to trade `maker_amount` of one asset for `taker_amount` of another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Exchange the order is meant for
    pub exchange: Address,
    /// Account offering `maker_asset`
    pub maker: Address,
    /// Only account allowed to fill, or zero for anyone
    pub taker: Address,
    /// Asset the maker gives
    pub maker_asset: Address,
    /// Asset the maker wants
    pub taker_asset: Address,
    /// Receiver of fees, or zero for none
    pub fee_recipient: Address,
    /// Total amount of `maker_asset` offered
    #[serde(with = "crate::amount")]
    pub maker_amount: U256,
    /// Total amount of `taker_asset` wanted
    #[serde(with = "crate::amount")]
    pub taker_amount: U256,
    /// Fee the maker pays for a complete fill
    #[serde(with = "crate::amount")]
    pub maker_fee: U256,
    /// Fee the taker pays for a complete fill
    #[serde(with = "crate::amount")]
    pub taker_fee: U256,
    /// Unix second from which the order is void
    #[serde(with = "crate::amount")]
    pub expiration: U256,
    /// Distinguishes otherwise identical orders
    #[serde(with = "crate::amount")]
    pub salt: U256,
}

impl Order {
    /// Canonical order hash
    pub fn hash(&self) -> Hash32 {
        let mut packed = Vec::with_capacity(6 * 20 + 6 * 32);
        for address in [
            self.exchange,
            self.maker,
            self.taker,
            self.maker_asset,
            self.taker_asset,
            self.fee_recipient,
        ] {
            packed.extend_from_slice(address.as_bytes());
        }
        for value in [
            self.maker_amount,
            self.taker_amount,
            self.maker_fee,
            self.taker_fee,
            self.expiration,
            self.salt,
        ] {
            packed.extend_from_slice(&value.to_be_bytes::<32>());
        }
        crypto::keccak256(&packed)
    }

    /// Hash as 0x-prefixed hex
    pub fn hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.hash()))
    }

    /// Sign the order hash as a personal message
    pub fn sign(&self, keypair: &KeyPair) -> Signature {
        keypair.sign_personal(&self.hash())
    }

    /// Signer of `signature` over this order, if it recovers at all
    pub fn signer(&self, signature: &Signature) -> Option<Address> {
        let digest = crypto::personal_message_hash(&self.hash());
        crypto::recover(&digest, signature).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order {
            exchange: Address::from_low_u64(0xe8c4),
            maker: Address::from_low_u64(1),
            taker: Address::ZERO,
            maker_asset: Address::from_low_u64(0x70),
            taker_asset: Address::from_low_u64(0x7e57),
            fee_recipient: Address::ZERO,
            maker_amount: U256::from(100u64),
            taker_amount: U256::from(50u64),
            maker_fee: U256::ZERO,
            taker_fee: U256::ZERO,
            expiration: U256::from(1234u64),
            salt: U256::from(1234u64),
        }
    }

    #[test]
    fn test_hash_packs_fields() {
        let order = order();
        let mut packed = Vec::new();
        packed.extend_from_slice(order.exchange.as_bytes());
        packed.extend_from_slice(order.maker.as_bytes());
        packed.extend_from_slice(&[0u8; 20]);
        packed.extend_from_slice(order.maker_asset.as_bytes());
        packed.extend_from_slice(order.taker_asset.as_bytes());
        packed.extend_from_slice(&[0u8; 20]);
        for value in [100u8, 50, 0, 0] {
            let mut word = [0u8; 32];
            word[31] = value;
            packed.extend_from_slice(&word);
        }
        for _ in 0..2 {
            let mut word = [0u8; 32];
            word[30] = 0x04;
            word[31] = 0xd2;
            packed.extend_from_slice(&word);
        }
        assert_eq!(packed.len(), 312);
        assert_eq!(order.hash(), crypto::keccak256(&packed));
    }

    #[test]
    fn test_hash_depends_on_every_field() {
        let base = order();
        assert_eq!(base.hash(), order().hash());

        let mut changed = order();
        changed.salt += U256::from(1u64);
        assert_ne!(base.hash(), changed.hash());

        let mut changed = order();
        changed.fee_recipient = Address::from_low_u64(9);
        assert_ne!(base.hash(), changed.hash());

        let mut changed = order();
        changed.exchange = Address::from_low_u64(0xe8c5);
        assert_ne!(base.hash(), changed.hash());
    }

    #[test]
    fn test_sign_recovers_maker() {
        let keypair = KeyPair::generate();
        let mut order = order();
        order.maker = keypair.address();
        let signature = order.sign(&keypair);
        assert_eq!(order.signer(&signature), Some(keypair.address()));

        order.salt = U256::from(1u64);
        assert_ne!(order.signer(&signature), Some(keypair.address()));
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(order()).unwrap();
        assert_eq!(json["makerAmount"], "100");
        assert_eq!(
            json["feeRecipient"],
            "0x0000000000000000000000000000000000000000"
        );
        let parsed: Order = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, order());
    }

    #[test]
    fn test_full_width_words() {
        let mut wide = order();
        wide.salt = U256::MAX;
        wide.maker_amount = U256::from(100_000_000_000_000_000_000u128);

        let mut json = serde_json::to_value(order()).unwrap();
        json["salt"] = format!("0x{}", "f".repeat(64)).into();
        json["makerAmount"] = "100000000000000000000".into();
        let parsed: Order = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, wide);

        let mut packed = Vec::new();
        for address in [
            wide.exchange,
            wide.maker,
            wide.taker,
            wide.maker_asset,
            wide.taker_asset,
            wide.fee_recipient,
        ] {
            packed.extend_from_slice(address.as_bytes());
        }
        let mut maker_amount = [0u8; 32];
        maker_amount[16..].copy_from_slice(&100_000_000_000_000_000_000u128.to_be_bytes());
        packed.extend_from_slice(&maker_amount);
        for value in [50u8, 0, 0] {
            let mut word = [0u8; 32];
            word[31] = value;
            packed.extend_from_slice(&word);
        }
        let mut expiration = [0u8; 32];
        expiration[30] = 0x04;
        expiration[31] = 0xd2;
        packed.extend_from_slice(&expiration);
        packed.extend_from_slice(&[0xff; 32]);
        assert_eq!(parsed.hash(), crypto::keccak256(&packed));
    }
}
