//! Cryptographic primitives for weft.
//!
//! Wraps recoverable secp256k1 signing and keccak256 hashing with strong types.
//! Identities are addresses derived from public keys, so a verifier never needs
//! the signer's key in advance: it recovers the key from the signature.

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;

use crate::error::CoreError;
use crate::types::{Address, EventHash, ADDRESS_LEN};

/// Length of a recoverable signature: r || s || recovery id.
pub const SIGNATURE_LEN: usize = 65;

/// Length of an uncompressed SEC1 public key.
pub const PUBLIC_KEY_LEN: usize = 65;

const EVENT_HASH_DOMAIN: &[u8] = b"weft-event-v0:";

/// Compute keccak256 of the given data.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Hash the canonical bytes of an event body into its identifier.
///
/// Format: keccak256(domain || len_le64 || body).
pub fn hash_event_body(body: &[u8]) -> EventHash {
    let mut hasher = Keccak256::new();
    hasher.update(EVENT_HASH_DOMAIN);
    hasher.update((body.len() as u64).to_le_bytes());
    hasher.update(body);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    EventHash(out)
}

/// An uncompressed secp256k1 public key (0x04 || x || y).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let mut arr = [0u8; PUBLIC_KEY_LEN];
        arr.copy_from_slice(point.as_bytes());
        Self(arr)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Derive the address: last 20 bytes of keccak256 over x || y.
    pub fn address(&self) -> Address {
        let hash = keccak256(&self.0[1..]);
        let mut addr = [0u8; ADDRESS_LEN];
        addr.copy_from_slice(&hash[32 - ADDRESS_LEN..]);
        Address(addr)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..18])
    }
}

/// A 65-byte recoverable secp256k1 signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; SIGNATURE_LEN]);

impl Signature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Recover the public key that produced this signature over `prehash`.
    pub fn recover(&self, prehash: &[u8; 32]) -> Result<PublicKey, CoreError> {
        let sig = EcdsaSignature::from_slice(&self.0[..64]).map_err(|_| CoreError::RecoveryFailed)?;
        let recovery_id = RecoveryId::from_byte(self.0[64]).ok_or(CoreError::RecoveryFailed)?;
        let key = VerifyingKey::recover_from_prehash(prehash, &sig, recovery_id)
            .map_err(|_| CoreError::RecoveryFailed)?;
        Ok(PublicKey::from_verifying_key(&key))
    }

    /// The zero signature (invalid, used as placeholder).
    pub const ZERO: Self = Self([0u8; SIGNATURE_LEN]);
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        let arr: [u8; SIGNATURE_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| de::Error::invalid_length(bytes.len(), &"65 signature bytes"))?;
        Ok(Self(arr))
    }
}

/// A secp256k1 signing key.
#[derive(Clone)]
pub struct Wallet {
    signing_key: SigningKey,
}

impl Wallet {
    /// Generate a new random wallet.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// Create from a 32-byte secret scalar.
    ///
    /// Fails for the zero scalar and values at or above the curve order.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CoreError> {
        let signing_key = SigningKey::from_slice(seed).map_err(|_| CoreError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(self.signing_key.verifying_key())
    }

    /// Get the address of this wallet.
    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    /// Sign a 32-byte digest, producing a recoverable signature.
    pub fn sign_prehash(&self, prehash: &[u8; 32]) -> Result<Signature, CoreError> {
        let (sig, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(prehash)
            .map_err(|e| CoreError::SigningFailed(e.to_string()))?;
        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recovery_id.to_byte();
        Ok(Signature(out))
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wallet({})", self.address())
    }
}
