//! Provider-signed event envelopes
//!
//! The payment provider signs every event with Ed25519; the platform holds
//! only the verifying key. `ProviderSigner` is the provider-side
//! counterpart, used by tests and local tooling to produce valid
//! envelopes.

use crate::error::WebhookError;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer as DalekSigner, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// One inbound payment event, as delivered by the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Provider-assigned event id (stable across delivery retries)
    pub event_id: String,
    /// Event type, e.g. "checkout.session.completed"
    pub event_type: String,
    pub created_at: DateTime<Utc>,
    /// Event-type-specific metadata
    pub payload: serde_json::Value,
    /// Hex-encoded Ed25519 signature over the canonical payload bytes
    pub signature: String,
}

/// The portion of an envelope covered by the signature
#[derive(Serialize)]
struct SignablePayload<'a> {
    event_id: &'a str,
    event_type: &'a str,
    created_at: &'a DateTime<Utc>,
    payload: &'a serde_json::Value,
}

impl EventEnvelope {
    /// Serialize to canonical JSON bytes for signing/verification
    fn signable_bytes(&self) -> Vec<u8> {
        let payload = SignablePayload {
            event_id: &self.event_id,
            event_type: &self.event_type,
            created_at: &self.created_at,
            payload: &self.payload,
        };
        serde_json::to_vec(&payload).expect("SignablePayload serialization should never fail")
    }
}

/// Verifies provider signatures at the ingestion boundary
pub struct ProviderVerifier {
    provider: String,
    verifying_key: VerifyingKey,
}

impl ProviderVerifier {
    /// Create from the provider's hex-encoded public key
    pub fn from_hex(provider: impl Into<String>, hex_key: &str) -> Result<Self, WebhookError> {
        let provider = provider.into();
        let bytes = hex::decode(hex_key).map_err(|e| WebhookError::InvalidSignature {
            reason: format!("Invalid public key hex: {}", e),
        })?;

        let key_array: [u8; 32] =
            bytes
                .try_into()
                .map_err(|_| WebhookError::InvalidSignature {
                    reason: "Public key must be 32 bytes".to_string(),
                })?;

        let verifying_key =
            VerifyingKey::from_bytes(&key_array).map_err(|e| WebhookError::InvalidSignature {
                reason: format!("Invalid public key: {}", e),
            })?;

        Ok(Self {
            provider,
            verifying_key,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Verify an envelope's signature against the canonical payload bytes
    pub fn verify(&self, envelope: &EventEnvelope) -> Result<(), WebhookError> {
        let sig_bytes =
            hex::decode(&envelope.signature).map_err(|e| WebhookError::InvalidSignature {
                reason: format!("Invalid signature hex: {}", e),
            })?;

        let sig_array: [u8; 64] =
            sig_bytes
                .try_into()
                .map_err(|_| WebhookError::InvalidSignature {
                    reason: "Signature must be 64 bytes".to_string(),
                })?;

        let signature = Signature::from_bytes(&sig_array);
        self.verifying_key
            .verify(&envelope.signable_bytes(), &signature)
            .map_err(|_| WebhookError::InvalidSignature {
                reason: "Signature verification failed".to_string(),
            })
    }
}

/// Provider-side signer - the counterpart of `ProviderVerifier`.
///
/// The platform never signs events; this exists so tests and local tooling
/// can produce envelopes the verifier accepts.
pub struct ProviderSigner {
    signing_key: SigningKey,
}

impl ProviderSigner {
    /// Generate a new random signing key
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// The matching verifying key, hex-encoded
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Build a signed envelope
    pub fn sign(
        &self,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> EventEnvelope {
        let mut envelope = EventEnvelope {
            event_id: event_id.into(),
            event_type: event_type.into(),
            created_at: Utc::now(),
            payload,
            signature: String::new(),
        };
        let signature = self.signing_key.sign(&envelope.signable_bytes());
        envelope.signature = hex::encode(signature.to_bytes());
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let signer = ProviderSigner::generate();
        let verifier = ProviderVerifier::from_hex("payprov", &signer.public_key_hex()).unwrap();

        let envelope = signer.sign(
            "evt_1",
            "checkout.session.completed",
            json!({"user_id": "alice"}),
        );
        assert!(verifier.verify(&envelope).is_ok());
    }

    #[test]
    fn test_tampered_payload_fails_verification() {
        let signer = ProviderSigner::generate();
        let verifier = ProviderVerifier::from_hex("payprov", &signer.public_key_hex()).unwrap();

        let mut envelope = signer.sign(
            "evt_1",
            "checkout.session.completed",
            json!({"coins_amount": 100}),
        );
        envelope.payload = json!({"coins_amount": 1_000_000});

        let result = verifier.verify(&envelope);
        assert!(matches!(
            result,
            Err(WebhookError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let signer = ProviderSigner::generate();
        let other = ProviderSigner::generate();
        let verifier = ProviderVerifier::from_hex("payprov", &other.public_key_hex()).unwrap();

        let envelope = signer.sign("evt_1", "payment.failed", json!({}));
        assert!(verifier.verify(&envelope).is_err());
    }

    #[test]
    fn test_garbage_signature_is_rejected() {
        let signer = ProviderSigner::generate();
        let verifier = ProviderVerifier::from_hex("payprov", &signer.public_key_hex()).unwrap();

        let mut envelope = signer.sign("evt_1", "payment.failed", json!({}));
        envelope.signature = "deadbeef".to_string();
        assert!(verifier.verify(&envelope).is_err());
    }
}
