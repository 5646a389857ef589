//! Event validation: integrity, structure and authorship.

use std::collections::BTreeSet;

use crate::error::ValidationError;
use crate::event::Event;
use crate::signer::delegate_binding_hash;

/// Validate an event fully: structure, hash integrity and authorship.
///
/// `now_ms` is the clock that delegate expiry is checked against.
pub fn validate_event(event: &Event, now_ms: i64) -> Result<(), ValidationError> {
    validate_event_structure(event)?;
    verify_authorship(event, now_ms)
}

/// Validate an event's hash and predecessor shape without touching signatures.
///
/// This performs:
/// - Hash recomputation over the body
/// - Inception must have no predecessors
/// - Every other event must have at least one predecessor
/// - Predecessors must be distinct
pub fn validate_event_structure(event: &Event) -> Result<(), ValidationError> {
    if event.compute_hash() != event.hash {
        return Err(ValidationError::HashMismatch);
    }

    let prevs = event.prev_events();
    if event.is_inception() {
        if !prevs.is_empty() {
            return Err(ValidationError::StreamBadEvent(
                "inception must not have prev events".into(),
            ));
        }
    } else if prevs.is_empty() {
        return Err(ValidationError::StreamBadHashes(format!(
            "{} event {} has no prev events",
            event.payload().name(),
            event.hash
        )));
    }

    let distinct: BTreeSet<_> = prevs.iter().collect();
    if distinct.len() != prevs.len() {
        return Err(ValidationError::StreamBadHashes(format!(
            "event {} lists a prev event twice",
            event.hash
        )));
    }

    Ok(())
}

/// Check that the event's signer is its declared creator.
///
/// Without a delegate signature the key recovered from the event signature
/// must hash to the creator address. With one, the recovered key is the
/// delegate, and the delegate signature must recover to the creator over the
/// binding of that delegate key and expiry.
pub fn verify_authorship(event: &Event, now_ms: i64) -> Result<(), ValidationError> {
    let signer = event
        .signature
        .recover(event.hash.as_bytes())
        .map_err(|_| ValidationError::InvalidSignature)?;

    match &event.body.delegate_sig {
        None => {
            if signer.address() != event.creator() {
                return Err(ValidationError::InvalidSignature);
            }
        }
        Some(delegate) => {
            let binding = delegate_binding_hash(&signer, delegate.expiry_ms);
            let primary = delegate
                .signature
                .recover(&binding)
                .map_err(|_| ValidationError::DelegateSigMismatch)?;
            if primary.address() != event.creator() {
                return Err(ValidationError::DelegateSigMismatch);
            }
            if now_ms >= delegate.expiry_ms {
                return Err(ValidationError::DelegateSigExpired {
                    expiry_ms: delegate.expiry_ms,
                    now_ms,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Signature, Wallet};
    use crate::event::{make_event, EventBuilder, Inception, Payload};
    use crate::signer::SignerContext;
    use crate::stream::{StreamId, StreamKind};
    use crate::types::EventHash;

    fn wallet(seed: u8) -> Wallet {
        Wallet::from_seed(&[seed; 32]).unwrap()
    }

    fn message(ctx: &SignerContext) -> Event {
        let prev = EventHash::from_bytes([0x11; 32]);
        make_event(ctx, Payload::Message { text: "hello".into() }, &[prev]).unwrap()
    }

    #[test]
    fn test_valid_direct_event() {
        let ctx = SignerContext::direct(wallet(0x42));
        assert!(validate_event(&message(&ctx), 0).is_ok());
    }

    #[test]
    fn test_tampered_payload_fails_hash() {
        let ctx = SignerContext::direct(wallet(0x42));
        let mut event = message(&ctx);
        event.body.payload = Payload::Message { text: "hellO".into() };
        assert_eq!(validate_event(&event, 0), Err(ValidationError::HashMismatch));
    }

    #[test]
    fn test_tampered_hash_fails() {
        let ctx = SignerContext::direct(wallet(0x42));
        let mut event = message(&ctx);
        event.hash.0[0] ^= 0xff;
        assert_eq!(validate_event(&event, 0), Err(ValidationError::HashMismatch));
    }

    #[test]
    fn test_tampered_signature_fails() {
        let ctx = SignerContext::direct(wallet(0x42));
        let mut event = message(&ctx);
        event.signature = Signature::ZERO;
        assert_eq!(validate_event(&event, 0), Err(ValidationError::InvalidSignature));

        let other = message(&SignerContext::direct(wallet(0x43)));
        let mut swapped = message(&ctx);
        swapped.signature = other.signature;
        assert_eq!(verify_authorship(&swapped, 0), Err(ValidationError::InvalidSignature));
    }

    #[test]
    fn test_delegated_event_valid_before_expiry() {
        let ctx = SignerContext::delegated(&wallet(0x42), wallet(0x43), 10_000).unwrap();
        let event = message(&ctx);
        assert_eq!(event.creator(), wallet(0x42).address());
        assert!(validate_event(&event, 9_999).is_ok());
    }

    #[test]
    fn test_delegated_event_expired() {
        let ctx = SignerContext::delegated(&wallet(0x42), wallet(0x43), 10_000).unwrap();
        let event = message(&ctx);
        assert_eq!(
            validate_event(&event, 10_000),
            Err(ValidationError::DelegateSigExpired {
                expiry_ms: 10_000,
                now_ms: 10_000
            })
        );
    }

    #[test]
    fn test_delegate_bound_to_other_creator() {
        // Delegation made by 0x44, but events claim 0x42
        let ctx = SignerContext::delegated(&wallet(0x44), wallet(0x43), 10_000).unwrap();
        let mut event = EventBuilder::new(Payload::Message { text: "x".into() })
            .prev_events([EventHash::from_bytes([0x11; 32])])
            .sign(&ctx)
            .unwrap();
        event.body.creator_address = wallet(0x42).address();
        event.hash = event.compute_hash();
        event.signature = wallet(0x43).sign_prehash(event.hash.as_bytes()).unwrap();

        assert_eq!(validate_event(&event, 0), Err(ValidationError::DelegateSigMismatch));
    }

    #[test]
    fn test_structure_rejects_prevless_message() {
        let ctx = SignerContext::direct(wallet(0x42));
        let event = make_event::<EventHash>(&ctx, Payload::Message { text: "x".into() }, &[])
            .unwrap();
        assert!(matches!(
            validate_event_structure(&event),
            Err(ValidationError::StreamBadHashes(_))
        ));
    }

    #[test]
    fn test_structure_rejects_inception_with_prevs() {
        let ctx = SignerContext::direct(wallet(0x42));
        let inception = Payload::Inception(Inception {
            stream_id: StreamId::unique_space(),
            kind: StreamKind::Space,
            space_id: None,
            properties: None,
        });
        let event = make_event(&ctx, inception, &[EventHash::from_bytes([1; 32])]).unwrap();
        assert!(matches!(
            validate_event_structure(&event),
            Err(ValidationError::StreamBadEvent(_))
        ));
    }
}
