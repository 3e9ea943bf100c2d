//! Compact JSON Web Token serialization
//!
//! Credentials issued by this crate appear as a three-part base64-encoded
//! string, where each part is separated by a `.`.
//!
//! ```text
//! eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.eyJqdGkiOiIuLi4iLCJ1c2VyX2lwIjoiMS4yLjMuNCJ9.<signature>
//! ```
//!
//! The first section is the header, naming the HMAC algorithm used. The
//! second section is the claims payload. Nothing in either section should be
//! trusted before the signature, the third section, has been verified.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error,
    hmac::{SigningAlgorithm, SigningKey},
};

const TOKEN_TYPE: &str = "JWT";

/// Minimal set of headers for the credentials issued here
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Headers {
    alg: SigningAlgorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

impl Headers {
    /// Constructs JWT headers, to be signed by the specified algorithm
    pub fn new(alg: SigningAlgorithm) -> Self {
        Self {
            alg,
            typ: Some(TOKEN_TYPE.to_owned()),
        }
    }

    /// The algorithm named by the header
    #[must_use]
    pub fn alg(&self) -> SigningAlgorithm {
        self.alg
    }
}

/// Serializes `headers` and `payload` and signs them with `key`
///
/// # Errors
///
/// If serialization of either the header or payload fails.
pub fn encode<P: Serialize>(
    headers: &Headers,
    payload: &P,
    key: &SigningKey,
) -> Result<String, error::JwtSigningError> {
    let h_raw = serde_json::to_vec(headers).map_err(error::malformed_jwt_header)?;
    let p_raw = serde_json::to_vec(payload).map_err(error::malformed_jwt_payload)?;

    let expected_len = encoded_len(h_raw.len())
        + encoded_len(p_raw.len())
        + encoded_len(headers.alg.signature_size())
        + 2;

    let mut message = String::with_capacity(expected_len);
    URL_SAFE_NO_PAD.encode_string(&h_raw, &mut message);
    message.push('.');
    URL_SAFE_NO_PAD.encode_string(&p_raw, &mut message);

    let signature = key.sign(headers.alg, message.as_bytes());

    message.push('.');
    URL_SAFE_NO_PAD.encode_string(&signature, &mut message);

    debug_assert_eq!(message.len(), expected_len);

    Ok(message)
}

fn encoded_len(raw_len: usize) -> usize {
    base64::encoded_len(raw_len, false).unwrap_or_default()
}

/// A decomposed JWT
///
/// The header has been decoded so that it can be checked against
/// expectations. The payload and signature are still in their encoded form.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Decomposed<'a> {
    header: Headers,
    message: &'a str,
    payload: &'a str,
    signature: &'a str,
}

macro_rules! expect_two {
    ($iter:expr) => {{
        let mut i = $iter;
        match (i.next(), i.next(), i.next()) {
            (Some(first), Some(second), None) => Some((first, second)),
            _ => None,
        }
    }};
}

/// Decomposes a compact JWT into its parts, decoding only the header
///
/// # Errors
///
/// Returns an error if the token does not have three sections or if the
/// header is not a valid JSON header naming a supported algorithm.
pub fn decompose(token: &str) -> Result<Decomposed<'_>, error::JwtVerifyError> {
    let (signature, message) =
        expect_two!(token.rsplitn(2, '.')).ok_or_else(error::malformed_jwt)?;
    let (payload, h_str) = expect_two!(message.rsplitn(2, '.')).ok_or_else(error::malformed_jwt)?;
    let h_raw = URL_SAFE_NO_PAD
        .decode(h_str)
        .map_err(error::malformed_jwt_header)?;
    let header: Headers = serde_json::from_slice(&h_raw).map_err(error::malformed_jwt_header)?;

    Ok(Decomposed {
        header,
        message,
        payload,
        signature,
    })
}

impl<'a> Decomposed<'a> {
    /// The algorithm named by the untrusted header
    #[must_use]
    pub fn alg(&self) -> SigningAlgorithm {
        self.header.alg
    }

    /// The untrusted header of the JWT
    ///
    /// **WARNING:** *This header has not been validated and should not be trusted.*
    pub fn untrusted_header(&self) -> &Headers {
        &self.header
    }

    /// The encoded signature section of the JWT
    #[must_use]
    pub fn untrusted_signature(&self) -> &'a str {
        self.signature
    }

    /// Decodes the claims without checking the signature
    ///
    /// **WARNING:** *These claims have not been validated and should not be trusted.*
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not decode into `C`.
    pub fn untrusted_claims<C: DeserializeOwned>(&self) -> Result<C, error::JwtVerifyError> {
        let p_raw = URL_SAFE_NO_PAD
            .decode(self.payload)
            .map_err(error::malformed_jwt_payload)?;

        let claims = serde_json::from_slice(&p_raw).map_err(error::malformed_jwt_payload)?;

        Ok(claims)
    }

    /// Verifies the signature with `key` and decodes the claims
    ///
    /// The token is rejected without computing a signature if its header does
    /// not name exactly `expected`.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is not `expected`, the signature is
    /// malformed or does not match, or the payload does not decode into `C`.
    pub fn verify<C: DeserializeOwned>(
        &self,
        key: &SigningKey,
        expected: SigningAlgorithm,
    ) -> Result<C, error::JwtVerifyError> {
        if self.header.alg != expected {
            return Err(error::incompatible_algorithm(self.header.alg).into());
        }

        let signature = URL_SAFE_NO_PAD
            .decode(self.signature)
            .map_err(error::malformed_jwt_signature)?;

        key.verify(expected, self.message.as_bytes(), &signature)?;

        self.untrusted_claims()
    }
}
