//! Transport envelope codec
//!
//! An [`EncodingWrapper`] carries a typed JSON payload as
//! `base64(encrypt*(deflate(json)))`. The kind tag travels inside the
//! compressed JSON and is validated on decode, so a session blob can
//! never be replayed as a workflow task.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::{EncodingError, ThandResult};

/// Discriminator for what an envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    WorkflowTask,
    Session,
    SessionLocal,
    Auth,
    WorkflowSignal,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::WorkflowTask => "workflow_task",
            PayloadKind::Session => "session",
            PayloadKind::SessionLocal => "session_local",
            PayloadKind::Auth => "auth",
            PayloadKind::WorkflowSignal => "workflow_signal",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encryption stage applied between deflate and base64. Stages run in
/// order on encode and in reverse on decode. No cipher ships here; the
/// deployment wires one in.
pub trait Encryptor: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncodingError>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EncodingError>;
}

/// The transport envelope: a kind tag plus an arbitrary JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EncodingWrapper {
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub data: serde_json::Value,
}

impl EncodingWrapper {
    /// Wrap a serializable payload under the given kind tag.
    pub fn new<T: Serialize>(kind: PayloadKind, payload: &T) -> ThandResult<Self> {
        let data = serde_json::to_value(payload).map_err(|err| EncodingError::Json {
            reason: err.to_string(),
        })?;
        Ok(Self { kind, data })
    }

    /// Deserialize the payload back out.
    pub fn payload<T: DeserializeOwned>(&self) -> ThandResult<T> {
        serde_json::from_value(self.data.clone())
            .map_err(|err| {
                EncodingError::Json {
                    reason: err.to_string(),
                }
                .into()
            })
    }

    /// JSON-encode, deflate, run the encryptor pipeline, base64.
    pub fn encode(&self, encryptors: &[Arc<dyn Encryptor>]) -> ThandResult<String> {
        let json = serde_json::to_vec(self).map_err(|err| EncodingError::Json {
            reason: err.to_string(),
        })?;

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&json)
            .and_then(|_| encoder.finish())
            .map_err(|err| EncodingError::Deflate {
                reason: err.to_string(),
            })
            .and_then(|mut bytes| {
                for encryptor in encryptors {
                    bytes = encryptor.encrypt(&bytes)?;
                }
                Ok(BASE64.encode(bytes))
            })
            .map_err(Into::into)
    }

    /// Reverse [`encode`](Self::encode) and require the expected kind tag.
    pub fn decode(
        blob: &str,
        expected: PayloadKind,
        encryptors: &[Arc<dyn Encryptor>],
    ) -> ThandResult<Self> {
        let mut bytes = BASE64.decode(blob.trim()).map_err(|err| EncodingError::Base64 {
            reason: err.to_string(),
        })?;

        for encryptor in encryptors.iter().rev() {
            bytes = encryptor.decrypt(&bytes)?;
        }

        let mut json = Vec::new();
        DeflateDecoder::new(bytes.as_slice())
            .read_to_end(&mut json)
            .map_err(|err| EncodingError::Deflate {
                reason: err.to_string(),
            })?;

        let wrapper: EncodingWrapper =
            serde_json::from_slice(&json).map_err(|err| EncodingError::Json {
                reason: err.to_string(),
            })?;

        if wrapper.kind != expected {
            return Err(EncodingError::KindMismatch {
                expected: expected.as_str().to_string(),
                found: wrapper.kind.as_str().to_string(),
            }
            .into());
        }

        Ok(wrapper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Byte-reversing "cipher" exercising the pipeline seam.
    struct Mirror;

    impl Encryptor for Mirror {
        fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncodingError> {
            Ok(plaintext.iter().rev().copied().collect())
        }

        fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EncodingError> {
            Ok(ciphertext.iter().rev().copied().collect())
        }
    }

    #[test]
    fn test_round_trip() {
        let wrapper = EncodingWrapper::new(
            PayloadKind::Session,
            &serde_json::json!({"user": "alice@example.com"}),
        )
        .expect("wrap");
        let blob = wrapper.encode(&[]).expect("encode");
        let decoded = EncodingWrapper::decode(&blob, PayloadKind::Session, &[]).expect("decode");
        assert_eq!(decoded, wrapper);
    }

    #[test]
    fn test_round_trip_with_encryptor() {
        let pipeline: Vec<Arc<dyn Encryptor>> = vec![Arc::new(Mirror)];
        let wrapper =
            EncodingWrapper::new(PayloadKind::Auth, &serde_json::json!({"n": 7})).expect("wrap");
        let blob = wrapper.encode(&pipeline).expect("encode");

        // Without the pipeline the deflate stream is garbage.
        assert!(EncodingWrapper::decode(&blob, PayloadKind::Auth, &[]).is_err());

        let decoded =
            EncodingWrapper::decode(&blob, PayloadKind::Auth, &pipeline).expect("decode");
        assert_eq!(decoded.data["n"], 7);
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let wrapper = EncodingWrapper::new(PayloadKind::SessionLocal, &serde_json::json!({}))
            .expect("wrap");
        let blob = wrapper.encode(&[]).expect("encode");
        let err = EncodingWrapper::decode(&blob, PayloadKind::WorkflowTask, &[])
            .expect_err("must reject");
        assert!(err.to_string().contains("invalid session type"));
    }

    #[test]
    fn test_payload_extraction() {
        #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
        struct Note {
            text: String,
        }
        let note = Note {
            text: "renew".to_string(),
        };
        let wrapper = EncodingWrapper::new(PayloadKind::WorkflowSignal, &note).expect("wrap");
        assert_eq!(wrapper.payload::<Note>().expect("payload"), note);
    }
}
