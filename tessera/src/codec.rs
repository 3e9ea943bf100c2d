//! Signing and verification of access and refresh tokens

use std::net::IpAddr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::{
    braids::{
        AccessToken, AccessTokenRef, Identity, InstanceId, InstanceIdRef, RefreshToken,
        RefreshTokenRef, TransportToken, TransportTokenRef,
    },
    clock::{Clock, DurationSecs, System, UnixTime},
    error,
    hmac::{SigningAlgorithm, SigningKey},
    jwt,
};

const ACCESS_ALGORITHM: SigningAlgorithm = SigningAlgorithm::HS512;
const REFRESH_ALGORITHM: SigningAlgorithm = SigningAlgorithm::HS256;

/// Claims carried by an access token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    sub: Identity,
    jti: InstanceId,
    user_ip: IpAddr,
    exp: UnixTime,
}

impl AccessClaims {
    /// The principal the token was issued to
    #[inline]
    pub fn identity(&self) -> Identity {
        self.sub
    }

    /// The unique identifier of this token
    #[inline]
    pub fn jti(&self) -> &InstanceIdRef {
        &self.jti
    }

    /// The address of the request that was issued this token
    #[inline]
    pub fn source_address(&self) -> IpAddr {
        self.user_ip
    }

    /// When the token stops being current
    #[inline]
    pub fn expires_at(&self) -> UnixTime {
        self.exp
    }
}

/// Claims carried by a refresh token
///
/// A refresh token names no principal and has no expiry of its own. Both
/// are held by the record stored alongside it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    jti: InstanceId,
    user_ip: IpAddr,
}

impl RefreshClaims {
    /// The unique identifier of this token
    #[inline]
    pub fn jti(&self) -> &InstanceIdRef {
        &self.jti
    }

    /// The address of the request that was issued this token
    #[inline]
    pub fn source_address(&self) -> IpAddr {
        self.user_ip
    }
}

/// The outcome of verifying an authentic access token
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessStatus {
    /// The token has not yet expired
    Current(AccessClaims),
    /// The signature is valid but the expiry has passed
    Expired(AccessClaims),
}

impl AccessStatus {
    /// The verified claims, regardless of expiry
    #[inline]
    pub fn claims(&self) -> &AccessClaims {
        match self {
            Self::Current(c) | Self::Expired(c) => c,
        }
    }

    /// Takes the verified claims, regardless of expiry
    #[inline]
    pub fn into_claims(self) -> AccessClaims {
        match self {
            Self::Current(c) | Self::Expired(c) => c,
        }
    }

    /// Whether the token's expiry has passed
    #[inline]
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }
}

/// Lifetimes given to newly issued credentials
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifetimeConfig {
    access: DurationSecs,
    refresh: DurationSecs,
}

impl LifetimeConfig {
    /// Constructs a new lifetime configuration
    pub const fn new(access: DurationSecs, refresh: DurationSecs) -> Self {
        Self { access, refresh }
    }

    /// How long an access token stays current
    #[inline]
    pub fn access(&self) -> DurationSecs {
        self.access
    }

    /// How long a refresh record stays redeemable
    #[inline]
    pub fn refresh(&self) -> DurationSecs {
        self.refresh
    }
}

impl Default for LifetimeConfig {
    /// Fifteen minute access tokens and one day refresh records
    fn default() -> Self {
        Self::new(DurationSecs(15 * 60), DurationSecs(24 * 60 * 60))
    }
}

/// Issues and verifies credentials with a single signing key
///
/// Access tokens are always signed with HS512 and refresh tokens with HS256.
/// Verification accepts only the algorithm matching the credential type, so a
/// refresh token can never be presented as an access token or vice versa.
#[derive(Clone, Debug)]
pub struct CredentialCodec<C = System> {
    key: SigningKey,
    lifetimes: LifetimeConfig,
    clock: C,
}

impl CredentialCodec {
    /// A codec using the system clock and the default lifetimes
    pub fn new(key: SigningKey) -> Self {
        Self {
            key,
            lifetimes: LifetimeConfig::default(),
            clock: System,
        }
    }
}

impl<C> CredentialCodec<C> {
    /// Overrides the lifetimes given to new credentials
    pub fn with_lifetimes(self, lifetimes: LifetimeConfig) -> Self {
        Self { lifetimes, ..self }
    }

    /// Uses the provided clock for all expiry decisions
    pub fn with_clock<D: Clock>(self, clock: D) -> CredentialCodec<D> {
        CredentialCodec {
            key: self.key,
            lifetimes: self.lifetimes,
            clock,
        }
    }

    /// The lifetimes given to new credentials
    #[inline]
    pub fn lifetimes(&self) -> LifetimeConfig {
        self.lifetimes
    }
}

impl<C: Clock> CredentialCodec<C> {
    /// The current time according to the codec's clock
    #[inline]
    pub fn now(&self) -> UnixTime {
        self.clock.now()
    }

    /// The absolute expiry for a refresh record created now
    #[inline]
    pub fn refresh_expiry(&self) -> UnixTime {
        self.now() + self.lifetimes.refresh
    }

    /// Signs a new access token for `identity` bound to `source_address`
    ///
    /// Returns the token together with its freshly generated `jti`.
    ///
    /// # Errors
    ///
    /// If the claims cannot be serialized.
    pub fn issue_access(
        &self,
        identity: Identity,
        source_address: IpAddr,
    ) -> Result<(AccessToken, InstanceId), error::JwtSigningError> {
        let claims = AccessClaims {
            sub: identity,
            jti: InstanceId::generate(),
            user_ip: source_address,
            exp: self.now() + self.lifetimes.access,
        };

        let token = jwt::encode(&jwt::Headers::new(ACCESS_ALGORITHM), &claims, &self.key)?;

        Ok((AccessToken::new(token), claims.jti))
    }

    /// Signs a new refresh token bound to `source_address`
    ///
    /// Returns the token together with its freshly generated `jti`.
    ///
    /// # Errors
    ///
    /// If the claims cannot be serialized.
    pub fn issue_refresh(
        &self,
        source_address: IpAddr,
    ) -> Result<(RefreshToken, InstanceId), error::JwtSigningError> {
        let claims = RefreshClaims {
            jti: InstanceId::generate(),
            user_ip: source_address,
        };

        let token = jwt::encode(&jwt::Headers::new(REFRESH_ALGORITHM), &claims, &self.key)?;

        Ok((RefreshToken::new(token), claims.jti))
    }

    /// Verifies an access token and reports whether it is still current
    ///
    /// A token is current through its final second and expired only once
    /// `exp < now`.
    ///
    /// # Errors
    ///
    /// If the token is malformed, not signed with HS512, carries a bad
    /// signature, or its claims do not decode.
    pub fn verify_access(
        &self,
        token: &AccessTokenRef,
    ) -> Result<AccessStatus, error::InvalidCredential> {
        let claims: AccessClaims =
            jwt::decompose(token.as_str())?.verify(&self.key, ACCESS_ALGORITHM)?;

        if claims.exp < self.now() {
            Ok(AccessStatus::Expired(claims))
        } else {
            Ok(AccessStatus::Current(claims))
        }
    }
}

impl<C> CredentialCodec<C> {
    /// Checks that `token` is shaped like a refresh token and reads its
    /// claims
    ///
    /// The section count, the header's algorithm and the payload are checked.
    /// The signature is left untouched, so the returned claims must not be
    /// trusted.
    ///
    /// # Errors
    ///
    /// If the token does not have three sections, its header does not name
    /// HS256, or its payload does not decode.
    pub fn inspect_refresh(
        &self,
        token: &RefreshTokenRef,
    ) -> Result<RefreshClaims, error::InvalidCredential> {
        let decomposed = jwt::decompose(token.as_str())?;

        if decomposed.alg() != REFRESH_ALGORITHM {
            return Err(error::JwtVerifyError::from(error::incompatible_algorithm(
                decomposed.alg(),
            ))
            .into());
        }

        Ok(decomposed.untrusted_claims()?)
    }

    /// Verifies a refresh token's own signature and returns the address it
    /// was issued to
    ///
    /// # Errors
    ///
    /// If the token is malformed, not signed with HS256, carries a bad
    /// signature, or its claims do not decode.
    pub fn extract_source_address(
        &self,
        token: &RefreshTokenRef,
    ) -> Result<IpAddr, error::InvalidCredential> {
        let claims: RefreshClaims =
            jwt::decompose(token.as_str())?.verify(&self.key, REFRESH_ALGORITHM)?;

        Ok(claims.user_ip)
    }
}

impl RefreshTokenRef {
    /// Encodes this token in the form handed to clients
    pub fn encode_transport(&self) -> TransportToken {
        TransportToken::new(URL_SAFE_NO_PAD.encode(self.as_str()))
    }
}

impl TransportTokenRef {
    /// Recovers the refresh token from its transport form
    ///
    /// # Errors
    ///
    /// If the value is not unpadded base64url or does not decode to UTF-8.
    pub fn decode(&self) -> Result<RefreshToken, error::MalformedTransport> {
        let raw = URL_SAFE_NO_PAD
            .decode(self.as_str())
            .map_err(error::malformed_transport)?;
        let token = String::from_utf8(raw).map_err(error::malformed_transport)?;

        Ok(RefreshToken::new(token))
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;
    use crate::clock::TestClock;

    const ADDR: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(1, 2, 3, 4));

    fn codec() -> Result<(CredentialCodec<TestClock>, TestClock)> {
        let clock = TestClock::new(UnixTime(1_700_000_000));
        let codec = CredentialCodec::new(SigningKey::new(b"codec-test-key".to_vec())?)
            .with_clock(clock.clone());
        Ok((codec, clock))
    }

    #[test]
    fn access_token_carries_identity_and_address() -> Result<()> {
        let (codec, _) = codec()?;
        let identity = Identity::new_v4();

        let (token, jti) = codec.issue_access(identity, ADDR)?;
        let status = codec.verify_access(&token)?;

        assert!(!status.is_expired());
        let claims = status.into_claims();
        assert_eq!(claims.identity(), identity);
        assert_eq!(claims.jti(), &*jti);
        assert_eq!(claims.source_address(), ADDR);
        assert_eq!(claims.expires_at(), UnixTime(1_700_000_900));
        Ok(())
    }

    #[test]
    fn access_token_is_current_through_final_second() -> Result<()> {
        let (codec, clock) = codec()?;
        let (token, _) = codec.issue_access(Identity::new_v4(), ADDR)?;

        clock.advance(DurationSecs(900));
        assert!(!codec.verify_access(&token)?.is_expired());

        clock.advance(DurationSecs(1));
        let status = codec.verify_access(&token)?;
        assert!(status.is_expired());
        assert_eq!(status.claims().source_address(), ADDR);
        Ok(())
    }

    #[test]
    fn refresh_token_is_not_an_access_token() -> Result<()> {
        let (codec, _) = codec()?;
        let (refresh, _) = codec.issue_refresh(ADDR)?;
        let presented = AccessTokenRef::from_str(refresh.as_str());

        let err = codec.verify_access(presented).unwrap_err();
        assert!(err.reason().is_incompatible_alg());
        Ok(())
    }

    #[test]
    fn access_token_is_not_a_refresh_token() -> Result<()> {
        let (codec, _) = codec()?;
        let (access, _) = codec.issue_access(Identity::new_v4(), ADDR)?;
        let presented = RefreshTokenRef::from_str(access.as_str());

        assert!(codec.inspect_refresh(presented).is_err());
        assert!(codec.extract_source_address(presented).is_err());
        Ok(())
    }

    #[test]
    fn other_keys_are_rejected() -> Result<()> {
        let (codec, _) = codec()?;
        let other = CredentialCodec::new(SigningKey::new(b"another-key".to_vec())?);

        let (token, _) = other.issue_access(Identity::new_v4(), ADDR)?;
        let err = codec.verify_access(&token).unwrap_err();
        assert!(err.reason().is_signature_mismatch());

        let (refresh, _) = other.issue_refresh(ADDR)?;
        assert!(codec.inspect_refresh(&refresh).is_ok());
        assert!(codec.extract_source_address(&refresh).is_err());
        Ok(())
    }

    #[test]
    fn refresh_token_reports_its_address() -> Result<()> {
        let (codec, _) = codec()?;
        let v6: IpAddr = "2001:db8::1".parse()?;
        let (refresh, _) = codec.issue_refresh(v6)?;

        assert_eq!(codec.extract_source_address(&refresh)?, v6);
        Ok(())
    }

    #[test]
    fn inspection_ignores_signature_contents() -> Result<()> {
        let (codec, _) = codec()?;
        let (refresh, _) = codec.issue_refresh(ADDR)?;
        let mangled = format!("{}!!", refresh.as_str());

        let claims = codec.inspect_refresh(RefreshTokenRef::from_str(&mangled))?;
        assert_eq!(claims.source_address(), ADDR);
        assert!(codec
            .inspect_refresh(RefreshTokenRef::from_str("only.two"))
            .is_err());
        Ok(())
    }

    #[test]
    fn transport_form_round_trips() -> Result<()> {
        let (codec, _) = codec()?;
        let (refresh, _) = codec.issue_refresh(ADDR)?;

        let transport = refresh.encode_transport();
        assert!(!transport.as_str().contains('='));
        assert!(!transport.as_str().contains('.'));
        assert_eq!(
            transport.as_str(),
            URL_SAFE_NO_PAD.encode(refresh.as_str())
        );

        assert_eq!(transport.decode()?, refresh);
        Ok(())
    }

    #[test]
    fn bad_transport_forms_are_rejected() {
        assert!(TransportTokenRef::from_str("not base64!").decode().is_err());
        assert!(TransportTokenRef::from_str("AA==").decode().is_err());
        // 0xff 0xfe is valid base64 but not UTF-8
        assert!(TransportTokenRef::from_str("__4").decode().is_err());
    }

    #[test]
    fn refresh_expiry_follows_lifetimes() -> Result<()> {
        let (codec, _) = codec()?;
        let codec = codec.with_lifetimes(LifetimeConfig::new(DurationSecs(60), DurationSecs(120)));

        assert_eq!(codec.refresh_expiry(), UnixTime(1_700_000_120));
        assert_eq!(codec.lifetimes().access(), DurationSecs(60));
        Ok(())
    }
}
