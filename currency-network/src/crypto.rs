//! Cryptographic operations for the network
//!
//! This module provides:
//! - Keccak-256 hashing
//! - secp256k1 signer recovery from `(v, r, s)` signatures
//! - Address derivation and key pairs for producing signatures
//!
//! Everything here is pure and reproducible off-system: a signature made by
//! any standard Ethereum signer over the same digest recovers the same
//! address.

use crate::{
    types::{Address, Hash32},
    Error, Result,
};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, PublicKey, SecretKey, SECP256K1,
};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n";

/// Recoverable ECDSA signature triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Recovery byte (27/28, or 0/1)
    pub v: u8,
    /// r component
    pub r: Hash32,
    /// s component
    pub s: Hash32,
}

impl Signature {
    /// Create from components
    pub fn new(v: u8, r: Hash32, s: Hash32) -> Self {
        Self { v, r, s }
    }

    /// Parse the 65-byte `r ‖ s ‖ v` encoding
    pub fn from_rsv(bytes: &[u8; 65]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Self { v: bytes[64], r, s }
    }

    /// 65-byte `r ‖ s ‖ v` encoding
    pub fn to_rsv(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    fn recovery_id(&self) -> Result<RecoveryId> {
        let id = match self.v {
            0 | 1 => self.v as i32,
            27 | 28 => (self.v - 27) as i32,
            other => {
                return Err(Error::InvalidSignature(format!(
                    "unsupported recovery byte {}",
                    other
                )))
            }
        };
        RecoveryId::from_i32(id).map_err(|e| Error::InvalidSignature(e.to_string()))
    }
}

/// Keccak-256 of arbitrary bytes
pub fn keccak256(data: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Digest signed by `personal_sign`: keccak256 of the prefixed message
pub fn personal_message_hash(message: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX);
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// Address of a public key: last 20 bytes of keccak256 over the uncompressed point
pub fn address_of(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address::from_bytes(bytes)
}

/// Recover the signer of a 32-byte digest
pub fn recover(digest: &Hash32, signature: &Signature) -> Result<Address> {
    let recovery_id = signature.recovery_id()?;
    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&signature.r);
    compact[32..].copy_from_slice(&signature.s);

    let recoverable = RecoverableSignature::from_compact(&compact, recovery_id)
        .map_err(|e| Error::InvalidSignature(e.to_string()))?;
    let message = Message::from_digest(*digest);
    let public_key = SECP256K1
        .recover_ecdsa(&message, &recoverable)
        .map_err(|e| Error::InvalidSignature(e.to_string()))?;

    Ok(address_of(&public_key))
}

/// True iff `signature` over `digest` recovers to `expected`
pub fn verify(digest: &Hash32, signature: &Signature, expected: &Address) -> bool {
    matches!(recover(digest, signature), Ok(signer) if signer == *expected)
}

/// secp256k1 key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        loop {
            if let Ok(keypair) = Self::from_secret_bytes(&rand::random::<[u8; 32]>()) {
                return keypair;
            }
        }
    }

    /// Create from a 32-byte secret - deterministic
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self> {
        let secret_key = SecretKey::from_slice(secret)
            .map_err(|e| Error::ValueDomain(format!("invalid secret key: {}", e)))?;
        let public_key = PublicKey::from_secret_key(SECP256K1, &secret_key);
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    /// Address controlled by this key
    pub fn address(&self) -> Address {
        address_of(&self.public_key)
    }

    /// Sign a raw 32-byte digest; `v` is 27 or 28
    pub fn sign_digest(&self, digest: &Hash32) -> Signature {
        let message = Message::from_digest(*digest);
        let (recovery_id, compact) = SECP256K1
            .sign_ecdsa_recoverable(&message, &self.secret_key)
            .serialize_compact();

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&compact[..32]);
        s.copy_from_slice(&compact[32..]);
        Signature {
            v: 27 + recovery_id.to_i32() as u8,
            r,
            s,
        }
    }

    /// Sign `message` the way `personal_sign` does
    pub fn sign_personal(&self, message: &[u8]) -> Signature {
        self.sign_digest(&personal_message_hash(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode32(s: &str) -> Hash32 {
        hex::decode(s).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_address_of_secret_one() {
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let keypair = KeyPair::from_secret_bytes(&secret).unwrap();
        assert_eq!(
            keypair.address(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".parse().unwrap()
        );
    }

    #[test]
    fn test_known_personal_sign_vector() {
        let signature = Signature::new(
            0x1c,
            decode32("b91467e570a6466aa9e9876cbcd013baba02900b8979d43fe208a4a4f339f5fd"),
            decode32("6007e74cd82e037b800186422fc2da167c747ef045e5d18a5f5d4300f8e1a029"),
        );
        let digest = personal_message_hash(b"Some data");
        assert_eq!(
            hex::encode(digest),
            "1da44b586eb0729ff70a73c326926f6ed5a25f5b056e7f47fbc6e58d86871655"
        );

        let signer = recover(&digest, &signature).unwrap();
        assert_eq!(
            signer,
            "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23".parse().unwrap()
        );
    }

    #[test]
    fn test_sign_and_recover() {
        let keypair = KeyPair::generate();
        let digest = keccak256(b"cheque");
        let signature = keypair.sign_digest(&digest);

        assert!(signature.v == 27 || signature.v == 28);
        assert_eq!(recover(&digest, &signature).unwrap(), keypair.address());
        assert!(verify(&digest, &signature, &keypair.address()));

        let other = keccak256(b"other cheque");
        assert!(!verify(&other, &signature, &keypair.address()));
    }

    #[test]
    fn test_recovery_byte_forms() {
        let keypair = KeyPair::generate();
        let digest = keccak256(b"order");
        let mut signature = keypair.sign_digest(&digest);
        signature.v -= 27;
        assert_eq!(recover(&digest, &signature).unwrap(), keypair.address());

        signature.v = 5;
        assert!(matches!(
            recover(&digest, &signature),
            Err(Error::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_rsv_encoding() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign_personal(b"hello");
        assert_eq!(Signature::from_rsv(&signature.to_rsv()), signature);
    }
}
