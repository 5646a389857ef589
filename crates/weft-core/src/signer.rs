//! Signer contexts: who is signing, and on whose behalf.
//!
//! A context either signs directly with the creator's wallet, or signs with a
//! short-lived delegate wallet that the creator has bound to itself with a
//! [`DelegateSig`] carrying an expiry.

use serde::{Deserialize, Serialize};

use crate::crypto::{keccak256, PublicKey, Signature, Wallet};
use crate::error::CoreError;
use crate::types::Address;

const DELEGATE_DOMAIN: &[u8] = b"weft-delegate-v0:";

/// The digest a creator signs to authorize a delegate key until `expiry_ms`.
///
/// Format: keccak256(domain || delegate_pubkey || expiry_ms_be).
pub fn delegate_binding_hash(delegate: &PublicKey, expiry_ms: i64) -> [u8; 32] {
    let mut message = Vec::with_capacity(DELEGATE_DOMAIN.len() + 65 + 8);
    message.extend_from_slice(DELEGATE_DOMAIN);
    message.extend_from_slice(delegate.as_bytes());
    message.extend_from_slice(&expiry_ms.to_be_bytes());
    keccak256(&message)
}

/// A creator's signature binding a delegate key, with its expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelegateSig {
    /// Creator's signature over [`delegate_binding_hash`].
    pub signature: Signature,
    /// Epoch milliseconds after which the delegation is void.
    pub expiry_ms: i64,
}

/// The identity used to author events.
#[derive(Debug, Clone)]
pub struct SignerContext {
    signer: Wallet,
    creator_address: Address,
    delegate_sig: Option<DelegateSig>,
}

impl SignerContext {
    /// Sign directly as the wallet's own address.
    pub fn direct(wallet: Wallet) -> Self {
        Self {
            creator_address: wallet.address(),
            signer: wallet,
            delegate_sig: None,
        }
    }

    /// Sign with `delegate` on behalf of `primary` until `expiry_ms`.
    pub fn delegated(
        primary: &Wallet,
        delegate: Wallet,
        expiry_ms: i64,
    ) -> Result<Self, CoreError> {
        let binding = delegate_binding_hash(&delegate.public_key(), expiry_ms);
        let signature = primary.sign_prehash(&binding)?;
        Ok(Self {
            signer: delegate,
            creator_address: primary.address(),
            delegate_sig: Some(DelegateSig {
                signature,
                expiry_ms,
            }),
        })
    }

    /// The address events are attributed to.
    pub fn creator_address(&self) -> Address {
        self.creator_address
    }

    /// The delegation, if this context signs on someone's behalf.
    pub fn delegate_sig(&self) -> Option<&DelegateSig> {
        self.delegate_sig.as_ref()
    }

    /// Sign an event hash with the active key.
    pub fn sign(&self, hash: &[u8; 32]) -> Result<Signature, CoreError> {
        self.signer.sign_prehash(hash)
    }
}
