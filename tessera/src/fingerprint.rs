//! Salted one-way fingerprints of refresh token signatures
//!
//! Only the signature section of a refresh token is hashed. It is the part
//! that cannot be produced without the signing key, so holding a matching
//! token proves possession of the exact credential that was issued.

use std::num::NonZeroU32;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::{
    pbkdf2,
    rand::{SecureRandom, SystemRandom},
};

use crate::{
    braids::{Fingerprint, FingerprintRef, RefreshTokenRef},
    error::{self, FingerprintError},
};

const SCHEME_PREFIX: &str = "$pbkdf2-sha256$i=";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const DEFAULT_ITERATIONS: NonZeroU32 = NonZeroU32::MIN.saturating_add(999);

/// Computes and checks refresh token fingerprints
#[derive(Clone, Debug)]
pub struct Fingerprinter {
    iterations: NonZeroU32,
    rng: SystemRandom,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::with_iterations(DEFAULT_ITERATIONS)
    }
}

impl Fingerprinter {
    /// A fingerprinter using the given PBKDF2 iteration count for new hashes
    ///
    /// Verification always uses the count recorded in the stored hash.
    pub fn with_iterations(iterations: NonZeroU32) -> Self {
        Self {
            iterations,
            rng: SystemRandom::new(),
        }
    }

    /// The iteration count used for new hashes
    #[inline]
    pub fn iterations(&self) -> NonZeroU32 {
        self.iterations
    }

    /// Hashes the signature section of `token` under a fresh random salt
    ///
    /// # Errors
    ///
    /// If the token has fewer than three sections or no salt could be
    /// generated.
    pub fn fingerprint(&self, token: &RefreshTokenRef) -> Result<Fingerprint, FingerprintError> {
        let signature = signature_section(token)?;

        let mut salt = [0u8; SALT_LEN];
        self.rng
            .fill(&mut salt)
            .map_err(|_| error::unexpected("random number generator failure"))?;

        let mut hash = [0u8; HASH_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            &salt,
            signature.as_bytes(),
            &mut hash,
        );

        let encoded = format!(
            "{}{}${}${}",
            SCHEME_PREFIX,
            self.iterations,
            URL_SAFE_NO_PAD.encode(salt),
            URL_SAFE_NO_PAD.encode(hash),
        );

        Ok(Fingerprint::new(encoded))
    }

    /// Checks that `token` is the one `fingerprint` was computed from
    ///
    /// # Errors
    ///
    /// If the token has fewer than three sections, the stored fingerprint
    /// cannot be parsed, or the token does not match.
    pub fn verify(
        &self,
        fingerprint: &FingerprintRef,
        token: &RefreshTokenRef,
    ) -> Result<(), FingerprintError> {
        let signature = signature_section(token)?;
        let parsed = ParsedFingerprint::parse(fingerprint.as_str())?;

        pbkdf2::verify(
            pbkdf2::PBKDF2_HMAC_SHA256,
            parsed.iterations,
            &parsed.salt,
            signature.as_bytes(),
            &parsed.hash,
        )
        .map_err(|_| FingerprintError::Mismatch)
    }
}

fn signature_section(token: &RefreshTokenRef) -> Result<&str, FingerprintError> {
    token
        .as_str()
        .split('.')
        .nth(2)
        .ok_or(FingerprintError::MissingSignature)
}

struct ParsedFingerprint {
    iterations: NonZeroU32,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

impl ParsedFingerprint {
    fn parse(raw: &str) -> Result<Self, FingerprintError> {
        let rest = raw
            .strip_prefix(SCHEME_PREFIX)
            .ok_or(FingerprintError::MalformedHash)?;

        let mut parts = rest.split('$');
        let (iterations, salt, hash) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(i), Some(s), Some(h), None) => (i, s, h),
            _ => return Err(FingerprintError::MalformedHash),
        };

        let iterations = iterations
            .parse::<NonZeroU32>()
            .map_err(|_| FingerprintError::MalformedHash)?;
        let salt = URL_SAFE_NO_PAD
            .decode(salt)
            .map_err(|_| FingerprintError::MalformedHash)?;
        let hash = URL_SAFE_NO_PAD
            .decode(hash)
            .map_err(|_| FingerprintError::MalformedHash)?;

        if hash.len() != HASH_LEN {
            return Err(FingerprintError::MalformedHash);
        }

        Ok(Self {
            iterations,
            salt,
            hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    const TOKEN: &str = "aGVhZGVy.cGF5bG9hZA.c2lnbmF0dXJl";

    fn fast() -> Fingerprinter {
        Fingerprinter::with_iterations(NonZeroU32::MIN)
    }

    #[test]
    fn fingerprint_verifies_against_same_token() -> Result<()> {
        let fp = Fingerprinter::default();
        let token = RefreshTokenRef::from_str(TOKEN);

        let hash = fp.fingerprint(token)?;
        assert!(hash.as_str().starts_with("$pbkdf2-sha256$i=1000$"));
        fp.verify(&hash, token)?;
        Ok(())
    }

    #[test]
    fn salts_differ_between_calls() -> Result<()> {
        let fp = fast();
        let token = RefreshTokenRef::from_str(TOKEN);

        let a = fp.fingerprint(token)?;
        let b = fp.fingerprint(token)?;
        assert_ne!(a, b);
        fp.verify(&a, token)?;
        fp.verify(&b, token)?;
        Ok(())
    }

    #[test]
    fn only_the_signature_is_bound() -> Result<()> {
        let fp = fast();
        let hash = fp.fingerprint(RefreshTokenRef::from_str(TOKEN))?;

        fp.verify(&hash, RefreshTokenRef::from_str("other.header.c2lnbmF0dXJl"))?;
        assert!(matches!(
            fp.verify(&hash, RefreshTokenRef::from_str("aGVhZGVy.cGF5bG9hZA.c2lnbmF0dXJm")),
            Err(FingerprintError::Mismatch)
        ));
        Ok(())
    }

    #[test]
    fn tokens_without_signature_are_rejected() -> Result<()> {
        let fp = fast();
        let short = RefreshTokenRef::from_str("aGVhZGVy.cGF5bG9hZA");

        assert!(matches!(
            fp.fingerprint(short),
            Err(FingerprintError::MissingSignature)
        ));

        let hash = fp.fingerprint(RefreshTokenRef::from_str(TOKEN))?;
        assert!(matches!(
            fp.verify(&hash, short),
            Err(FingerprintError::MissingSignature)
        ));
        Ok(())
    }

    #[test]
    fn stored_iterations_are_honoured() -> Result<()> {
        let token = RefreshTokenRef::from_str(TOKEN);
        let hash = Fingerprinter::default().fingerprint(token)?;

        fast().verify(&hash, token)?;
        Ok(())
    }

    #[test]
    fn malformed_hashes_are_reported() {
        let fp = fast();
        let token = RefreshTokenRef::from_str(TOKEN);

        for raw in [
            "",
            "$2a$04$somebcryptlookingvalue",
            "$pbkdf2-sha256$i=0$c2FsdA$aGFzaA",
            "$pbkdf2-sha256$i=10$c2FsdA",
            "$pbkdf2-sha256$i=10$c2FsdA$aGFzaA",
            "$pbkdf2-sha256$i=10$!!$aGFzaA$extra",
        ] {
            assert!(
                matches!(
                    fp.verify(FingerprintRef::from_str(raw), token),
                    Err(FingerprintError::MalformedHash)
                ),
                "expected {:?} to be rejected",
                raw
            );
        }
    }
}
