use secp256k1::{ecdsa, All, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use crate::common::error::TradeError;

pub trait SignatureService: Send + Sync {
    fn pub_key(&self) -> Vec<u8>;

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, TradeError>;

    fn verify(&self, pub_key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool, TradeError>;
}

// ECDSA over the SHA-256 digest of the data. Signatures are DER encoded
pub struct Secp256k1SignatureService {
    secp: Secp256k1<All>,
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl Secp256k1SignatureService {
    pub fn new(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secp,
            secret_key,
            public_key,
        }
    }

    fn digest(data: &[u8]) -> Result<Message, TradeError> {
        let digest = Sha256::digest(data);
        Ok(Message::from_slice(digest.as_slice())?)
    }
}

impl SignatureService for Secp256k1SignatureService {
    fn pub_key(&self) -> Vec<u8> {
        self.public_key.serialize().to_vec()
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, TradeError> {
        let message = Self::digest(data)?;
        let signature = self.secp.sign_ecdsa(&message, &self.secret_key);
        Ok(signature.serialize_der().to_vec())
    }

    fn verify(&self, pub_key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool, TradeError> {
        let message = Self::digest(data)?;
        let public_key = PublicKey::from_slice(pub_key)?;
        let signature = ecdsa::Signature::from_der(signature)?;
        Ok(self
            .secp
            .verify_ecdsa(&message, &signature, &public_key)
            .is_ok())
    }
}
