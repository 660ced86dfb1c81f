//! Token-signing protocol operations for the tollgate server.
//!
//! This crate is a thin layer over the Ristretto VOPRF primitives: the
//! server-side half of the blinded-token protocol. A client blinds a batch
//! of fresh tokens and submits them for signing; [`approve_tokens`] signs
//! the batch under one issuer key and produces a batch DLEQ proof that
//! every token was signed under that same key, so clients can detect a
//! tagging attack. At redemption time the client presents the token
//! preimage together with an HMAC over its request payload, keyed by the
//! shared verification key; [`verify_token_redemption`] rederives that key
//! from the preimage under each candidate signing key and checks the MAC.
//!
//! The cryptographic types (`SigningKey`, `TokenPreimage`,
//! `VerificationSignature`, …) are re-exported from
//! `challenge-bypass-ristretto` and are text-serialisable (base64), which
//! is how signing keys are persisted and preimages are recorded in the
//! redemption ledger.

use challenge_bypass_ristretto::errors::TokenError;
use hmac::Hmac;
use rand::rngs::OsRng;
use sha2::Sha512;
use thiserror::Error;

pub use challenge_bypass_ristretto::voprf::{
    BatchDLEQProof, BlindedToken, PublicKey, SignedToken, SigningKey, Token, TokenPreimage,
    UnblindedToken, VerificationKey, VerificationSignature,
};

/// The MAC instantiation shared with clients for redemption signatures.
pub type HmacSha512 = Hmac<Sha512>;

/// Errors produced by the protocol operations.
#[derive(Debug, Error)]
pub enum VoprfError {
    /// A blinded token was malformed or proof construction failed.
    #[error("could not sign the blinded tokens")]
    Signing(#[from] TokenError),

    /// No candidate signing key verified the redemption.
    #[error("token redemption failed verification")]
    Unverified,
}

/// Generate a fresh random signing key.
pub fn random_signing_key() -> SigningKey {
    let mut rng = OsRng;
    SigningKey::random(&mut rng)
}

/// Sign a batch of blinded tokens under `signing_key`.
///
/// Returns the signed tokens in request order together with a batch DLEQ
/// proof binding all of them to `signing_key`'s public key.
pub fn approve_tokens(
    blinded_tokens: &[BlindedToken],
    signing_key: &SigningKey,
) -> Result<(Vec<SignedToken>, BatchDLEQProof), VoprfError> {
    let mut rng = OsRng;

    let signed_tokens = blinded_tokens
        .iter()
        .map(|blinded| signing_key.sign(blinded))
        .collect::<Result<Vec<SignedToken>, TokenError>>()?;

    let batch_proof =
        BatchDLEQProof::new::<Sha512, _>(&mut rng, blinded_tokens, &signed_tokens, signing_key)?;

    Ok((signed_tokens, batch_proof))
}

/// Verify a redemption request against a set of candidate signing keys.
///
/// The preimage is rederived into an unblinded token under each key in
/// turn; the first key whose derived verification key authenticates
/// `signature` over `payload` accepts the redemption. The HMAC comparison
/// inside the crypto crate is constant-time.
pub fn verify_token_redemption(
    preimage: &TokenPreimage,
    signature: &VerificationSignature,
    payload: &[u8],
    signing_keys: &[&SigningKey],
) -> Result<(), VoprfError> {
    for signing_key in signing_keys {
        let unblinded_token = signing_key.rederive_unblinded_token(preimage);
        let verification_key = unblinded_token.derive_verification_key::<Sha512>();

        if verification_key.verify::<HmacSha512>(signature, payload) {
            return Ok(());
        }
    }

    Err(VoprfError::Unverified)
}
