//! Local secp256k1 signing for deployer and multisig owner identities.
//!
//! `LocalKeySigner` implements `SignerPort` with a private key held in
//! process memory. It signs 32-byte transaction hashes and returns the
//! compact 64-byte `r || s` signature; the chain client recovers the
//! y-parity itself by matching the recovered address against
//! `derive_address`.

// ── Imports ──────────────────────────────────────────────────────────────────
use alloy_primitives::Address;
use async_trait::async_trait;
use k256::ecdsa::{SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

// ── Ports ────────────────────────────────────────────────────────────────────

#[async_trait(?Send)]
pub trait SignerPort {
    /// Sign a 0x-prefixed 32-byte hash; returns the 0x-prefixed compact signature.
    async fn sign_message(&self, message_hash: &str) -> Result<String, String>;
}

pub trait SignerAdapter: SignerPort {
    fn derive_address(&self) -> Address;
}

// ── Adapter ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct LocalKeySigner {
    key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for LocalKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeySigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl LocalKeySigner {
    /// Build a signer from a 0x-prefixed (or bare) 32-byte hex private key.
    pub fn from_hex_key(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let without_prefix = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(without_prefix, &mut bytes)
            .map_err(|error| format!("private key must be 32 bytes of hex: {error}"))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|error| format!("invalid secp256k1 private key: {error}"))?;
        let address = address_from_verifying_key(key.verifying_key());
        Ok(Self { key, address })
    }
}

#[async_trait(?Send)]
impl SignerPort for LocalKeySigner {
    async fn sign_message(&self, message_hash: &str) -> Result<String, String> {
        let parsed_hash = parse_message_hash(message_hash)?;
        let (signature, _recovery_id) = self
            .key
            .sign_prehash_recoverable(&parsed_hash)
            .map_err(|error| format!("failed to sign message hash: {error}"))?;
        Ok(format!("0x{}", hex::encode(signature.to_bytes())))
    }
}

impl SignerAdapter for LocalKeySigner {
    fn derive_address(&self) -> Address {
        self.address
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Ethereum address of an uncompressed secp256k1 public key:
/// the last 20 bytes of keccak256 over the 64-byte `x || y` encoding.
pub(crate) fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let uncompressed = key.to_encoded_point(false);
    let digest = Keccak256::digest(&uncompressed.as_bytes()[1..]);
    Address::from_slice(&digest[12..32])
}

fn parse_message_hash(raw: &str) -> Result<[u8; 32], String> {
    let without_prefix = raw
        .trim()
        .strip_prefix("0x")
        .ok_or_else(|| "message hash must be 0x-prefixed hex".to_string())?;
    let mut out = [0u8; 32];
    hex::decode_to_slice(without_prefix, &mut out)
        .map_err(|error| format!("message hash must be 32 bytes of hex: {error}"))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::block_on_with_spin;
    use alloy_primitives::address;

    // Well-known first development account of anvil/hardhat.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn derives_checksum_address_of_dev_account() {
        let signer = LocalKeySigner::from_hex_key(DEV_KEY).expect("dev key should parse");
        assert_eq!(
            signer.derive_address(),
            address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266")
        );
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(LocalKeySigner::from_hex_key("0x1234").is_err());
        assert!(LocalKeySigner::from_hex_key(&format!("0x{}", "00".repeat(32))).is_err());
    }

    #[test]
    fn signs_hash_into_compact_signature() {
        let signer = LocalKeySigner::from_hex_key(DEV_KEY).expect("dev key should parse");
        let signature = block_on_with_spin(signer.sign_message(&format!("0x{}", "ab".repeat(32))))
            .expect("signing should succeed");
        assert!(signature.starts_with("0x"));
        assert_eq!(signature.len(), 2 + 128);
    }

    #[test]
    fn refuses_unprefixed_or_short_hashes() {
        let signer = LocalKeySigner::from_hex_key(DEV_KEY).expect("dev key should parse");
        assert!(block_on_with_spin(signer.sign_message(&"ab".repeat(32))).is_err());
        assert!(block_on_with_spin(signer.sign_message("0xabcd")).is_err());
    }

    #[test]
    fn debug_output_hides_the_private_key() {
        let signer = LocalKeySigner::from_hex_key(DEV_KEY).expect("dev key should parse");
        let rendered = format!("{signer:?}");
        assert!(!rendered.contains("ac0974bec39a17e36ba4a6b4d238ff944bacb478"));
    }
}
