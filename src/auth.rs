use crate::error::RagError;

use base64::engine::{general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Snowflake rejects key-pair tokens that live longer than an hour.
const TOKEN_LIFETIME_MINUTES: i64 = 59;

/// Claims of a Snowflake key-pair JWT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs short-lived RS256 tokens for key-pair authentication.
pub struct KeyPairSigner {
    /// `ACCOUNT.USER`, both upper-cased.
    qualified_user: String,
    /// `SHA256:<base64 digest of the public key DER>`.
    fingerprint: String,
    encoding_key: EncodingKey,
}

impl KeyPairSigner {
    /// Parses an unencrypted PKCS#8 or PKCS#1 PEM key and derives the
    /// public key fingerprint Snowflake registered for the user.
    pub fn new(account: &str, user: &str, private_key_pem: &str) -> Result<Self, RagError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_key_pem))
            .map_err(|e| RagError::AuthError(format!("Failed to parse private key: {}", e)))?;

        let public_der = private_key
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| RagError::AuthError(format!("Failed to encode public key: {}", e)))?;
        let fingerprint = format!("SHA256:{}", BASE64.encode(Sha256::digest(public_der.as_bytes())));

        let private_der = private_key
            .to_pkcs1_der()
            .map_err(|e| RagError::AuthError(format!("Failed to encode private key: {}", e)))?;
        let encoding_key = EncodingKey::from_rsa_der(private_der.as_bytes());

        Ok(Self {
            qualified_user: format!("{}.{}", account_identifier(account), user.to_uppercase()),
            fingerprint,
            encoding_key,
        })
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn claims_at(&self, now: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            iss: format!("{}.{}", self.qualified_user, self.fingerprint),
            sub: self.qualified_user.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(TOKEN_LIFETIME_MINUTES)).timestamp(),
        }
    }

    /// Signs a token valid from now.
    pub fn sign(&self) -> Result<String, RagError> {
        self.sign_at(Utc::now())
    }

    pub fn sign_at(&self, now: DateTime<Utc>) -> Result<String, RagError> {
        let claims = self.claims_at(now);
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)?)
    }
}

/// The account part of the JWT claims: upper-cased, without the region
/// or cloud suffix of a locator such as `xy12345.us-east-2.aws`.
pub fn account_identifier(account: &str) -> String {
    account
        .split('.')
        .next()
        .unwrap_or(account)
        .trim()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_suffix_is_dropped() {
        assert_eq!(account_identifier("xy12345.us-east-2.aws"), "XY12345");
        assert_eq!(account_identifier("myorg-cuenta"), "MYORG-CUENTA");
        assert_eq!(account_identifier("xy12345.global"), "XY12345");
    }

    #[test]
    fn garbage_key_is_an_auth_error() {
        match KeyPairSigner::new("xy12345", "analista", "not a pem") {
            Err(RagError::AuthError(msg)) => assert!(msg.contains("private key")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("a malformed key must not be accepted"),
        }
    }
}
