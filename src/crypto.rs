//! Cryptographic primitives for LedgerChain

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use ripemd::Ripemd160;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Version byte prefixed to every encoded address.
pub const ADDRESS_VERSION: u8 = 0x00;

/// Number of checksum bytes appended to an encoded address.
pub const ADDRESS_CHECKSUM_LEN: usize = 4;

pub const PUB_KEY_HASH_SIZE: usize = 20;

/// RIPEMD160(SHA256(public key)): the value outputs are locked to.
pub type PubKeyHash = [u8; PUB_KEY_HASH_SIZE];

pub fn hash_pub_key(public_key: &[u8]) -> PubKeyHash {
    let sha = Sha256::digest(public_key);
    Ripemd160::digest(sha).into()
}

fn checksum(payload: &[u8]) -> [u8; ADDRESS_CHECKSUM_LEN] {
    let first = Sha256::digest(payload);
    let second = Sha256::digest(first);
    let mut out = [0u8; ADDRESS_CHECKSUM_LEN];
    out.copy_from_slice(&second[..ADDRESS_CHECKSUM_LEN]);
    out
}

/// Base58Check-encodes a public-key hash as `version || hash || checksum`.
pub fn encode_address(pub_key_hash: &PubKeyHash) -> String {
    let mut payload = Vec::with_capacity(1 + PUB_KEY_HASH_SIZE + ADDRESS_CHECKSUM_LEN);
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(pub_key_hash);
    let sum = checksum(&payload);
    payload.extend_from_slice(&sum);
    bs58::encode(payload).into_string()
}

/// Decodes a Base58Check address back to the public-key hash it names.
pub fn decode_address(address: &str) -> Result<PubKeyHash, ChainError> {
    let payload = bs58::decode(address)
        .into_vec()
        .map_err(|e| ChainError::InvalidAddress(format!("{}: {}", address, e)))?;

    let expected_len = 1 + PUB_KEY_HASH_SIZE + ADDRESS_CHECKSUM_LEN;
    if payload.len() != expected_len {
        return Err(ChainError::InvalidAddress(format!(
            "{}: expected {} decoded bytes, got {}",
            address,
            expected_len,
            payload.len()
        )));
    }

    let (body, sum) = payload.split_at(payload.len() - ADDRESS_CHECKSUM_LEN);
    if checksum(body).as_slice() != sum {
        return Err(ChainError::InvalidAddress(format!("{}: checksum mismatch", address)));
    }
    if body[0] != ADDRESS_VERSION {
        return Err(ChainError::InvalidAddress(format!(
            "{}: unsupported version byte {:#04x}",
            address, body[0]
        )));
    }

    let mut hash = [0u8; PUB_KEY_HASH_SIZE];
    hash.copy_from_slice(&body[1..]);
    Ok(hash)
}

pub fn validate_address(address: &str) -> bool {
    decode_address(address).is_ok()
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Result<Self, ChainError> {
        let secret_key = SecretKey::new(&mut OsRng);
        Ok(Self::from_secret_key(secret_key))
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::CryptoError(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::CryptoError(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    pub fn from_secret_hex(hex_str: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| ChainError::CryptoError(format!("Invalid secret key hex: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Returns the KeyPair's public key as a compressed byte array.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    pub fn pub_key_hash(&self) -> PubKeyHash {
        hash_pub_key(&self.public_key_bytes())
    }

    /// The Base58Check address outputs for this key are locked to.
    pub fn address(&self) -> String {
        encode_address(&self.pub_key_hash())
    }

    /// Signs a message (which is first hashed using SHA-256) and returns the compact signature bytes.
    pub fn sign(&self, message: &[u8]) -> [u8; COMPACT_SIGNATURE_SIZE] {
        let digest: [u8; 32] = Sha256::digest(message).into();
        let message = Message::from_digest(digest);
        SECP256K1_CONTEXT
            .sign_ecdsa(&message, &self.secret_key)
            .serialize_compact()
    }
}

/// Verifies an ECDSA signature given the raw public key bytes, message, and signature bytes.
pub fn verify_signature(
    public_key_bytes: &[u8],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), ChainError> {
    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            public_key_bytes.len()
        )));
    }
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let public_key = PublicKey::from_slice(public_key_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key: {}", e)))?;

    let digest: [u8; 32] = Sha256::digest(message).into();
    let message = Message::from_digest(digest);

    let signature = Signature::from_compact(signature_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::CryptoError("Signature verification failed".to_string()))
}
