//! Parses an Arweave JSON Web Key file into an RSA key pair and signs /
//! verifies transaction pre-images with RSA-PSS(SHA-256).
//!
//! Grounded on `race-storage::crypto::ArweaveKey`, which does the same JWK
//! parsing and signing; renamed to `Wallet` and moved onto the shared
//! `codec` base64 helpers rather than a private copy of them.

use crate::codec::{b64_decode, b64_encode};
use crate::error::Result;
use openssl::{
    bn::BigNum,
    hash::MessageDigest,
    pkey::{PKey, Private},
    rsa::{Padding, Rsa},
    sha,
    sign::{Signer, Verifier},
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// BigNum components of an RSA private key as carried in a JWK.
struct KeyComponents {
    n: Vec<u8>,
    e: Vec<u8>,
    d: Vec<u8>,
    p: Vec<u8>,
    q: Vec<u8>,
    dp: Vec<u8>,
    dq: Vec<u8>,
    qi: Vec<u8>,
}

impl KeyComponents {
    fn from_jwk(jwk: &JsonWebKey) -> Result<Self> {
        Ok(Self {
            n: b64_decode(&jwk.n)?,
            e: b64_decode(&jwk.e)?,
            d: b64_decode(&jwk.d)?,
            p: b64_decode(&jwk.p)?,
            q: b64_decode(&jwk.q)?,
            dp: b64_decode(&jwk.dp)?,
            dq: b64_decode(&jwk.dq)?,
            qi: b64_decode(&jwk.qi)?,
        })
    }
}

/// JSON Web Key per <https://docs.arweave.org/developers/arweave-node-server/http-api#key-format>.
#[derive(Debug, Serialize, Deserialize, Clone)]
struct JsonWebKey {
    #[allow(dead_code)]
    kty: String,
    #[allow(dead_code)]
    ext: bool,
    n: String,
    e: String,
    d: String,
    p: String,
    q: String,
    dp: String,
    dq: String,
    qi: String,
}

impl JsonWebKey {
    fn to_rsa_keypair(&self) -> Result<PKey<Private>> {
        let KeyComponents { n, e, d, p, q, dp, dq, qi } = KeyComponents::from_jwk(self)?;
        let rsa = Rsa::from_private_components(
            BigNum::from_slice(&n)?,
            BigNum::from_slice(&e)?,
            BigNum::from_slice(&d)?,
            BigNum::from_slice(&p)?,
            BigNum::from_slice(&q)?,
            BigNum::from_slice(&dp)?,
            BigNum::from_slice(&dq)?,
            BigNum::from_slice(&qi)?,
        )?;
        Ok(PKey::from_rsa(rsa)?)
    }
}

/// An Arweave wallet's RSA key pair, able to sign and verify transaction
/// pre-images and derive the wallet's address from its modulus.
#[derive(Debug)]
pub struct Wallet {
    modulus: Vec<u8>,
    keypair: PKey<Private>,
}

impl Wallet {
    /// Loads a wallet from a JWK file on disk.
    pub fn from_jwk_file(path: impl AsRef<Path>) -> Result<Self> {
        let jwk_json = fs::read_to_string(path)?;
        Self::from_jwk_json(&jwk_json)
    }

    /// Parses a wallet from JWK JSON text.
    pub fn from_jwk_json(jwk_json: &str) -> Result<Self> {
        let jwk: JsonWebKey = serde_json::from_str(jwk_json)?;
        let modulus = b64_decode(&jwk.n)?;
        let keypair = jwk.to_rsa_keypair()?;
        Ok(Self { modulus, keypair })
    }

    /// The RSA modulus `n`, as used in the `owner` field of a transaction.
    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// The wallet's address: `b64url(sha256(modulus))`.
    pub fn address(&self) -> Result<String> {
        Ok(b64_encode(&sha::sha256(&self.modulus)))
    }

    /// Signs `message` with RSA-PSS(SHA-256).
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.keypair)?;
        signer.set_rsa_padding(Padding::PKCS1_PSS)?;
        signer.update(message)?;
        Ok(signer.sign_to_vec()?)
    }

    /// Verifies an RSA-PSS(SHA-256) signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool> {
        let mut verifier = Verifier::new(MessageDigest::sha256(), &self.keypair)?;
        verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
        verifier.update(message)?;
        Ok(verifier.verify(signature)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::rsa::Rsa;

    /// Builds a throwaway in-memory wallet so tests don't depend on a real
    /// wallet file being present on disk.
    fn test_wallet() -> anyhow::Result<Wallet> {
        let rsa = Rsa::generate(2048)?;
        let n = b64_encode(&rsa.n().to_vec());
        let e = b64_encode(&rsa.e().to_vec());
        let d = b64_encode(&rsa.d().to_vec());
        let p = b64_encode(&rsa.p().unwrap().to_vec());
        let q = b64_encode(&rsa.q().unwrap().to_vec());
        let dp = b64_encode(&rsa.dmp1().unwrap().to_vec());
        let dq = b64_encode(&rsa.dmq1().unwrap().to_vec());
        let qi = b64_encode(&rsa.iqmp().unwrap().to_vec());

        let jwk_json = format!(
            r#"{{"kty":"RSA","ext":true,"n":"{n}","e":"{e}","d":"{d}","p":"{p}","q":"{q}","dp":"{dp}","dq":"{dq}","qi":"{qi}"}}"#
        );
        Ok(Wallet::from_jwk_json(&jwk_json)?)
    }

    #[test]
    fn test_sign_verify_roundtrip() -> anyhow::Result<()> {
        let wallet = test_wallet()?;
        let message = b"arweave";
        let signature = wallet.sign(message)?;
        assert!(wallet.verify(message, &signature)?);
        Ok(())
    }

    #[test]
    fn test_tampered_signature_rejected() -> anyhow::Result<()> {
        let wallet = test_wallet()?;
        let message = b"arweave";
        let mut signature = wallet.sign(message)?;
        let last = signature.len() - 1;
        signature[last] ^= 0xFF;
        assert!(!wallet.verify(message, &signature)?);
        Ok(())
    }

    #[test]
    fn test_address_is_hash_of_modulus() -> anyhow::Result<()> {
        let wallet = test_wallet()?;
        let expected = b64_encode(&sha::sha256(wallet.modulus()));
        assert_eq!(wallet.address()?, expected);
        Ok(())
    }
}
