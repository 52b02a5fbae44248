// crates/signet-core/src/crypto/jwt.rs
// ============================================================================
// Module: JWT Signing
// Description: ES256 signing key set, access-token claims, and JWKS document.
// Purpose: Mint and verify access tokens with rotatable asymmetric keys.
// Dependencies: jsonwebtoken, rcgen, sha2, base64, serde
// ============================================================================

//! ## Overview
//! Access tokens are ES256 JWTs. The signing key set holds one or more P-256
//! key pairs: new tokens are signed with the newest key (its `kid` in the
//! header), verification accepts any listed key, and the public halves are
//! published as a JWKS document. Key pairs are generated at startup or loaded
//! from persisted state; rotation prepends a fresh key and keeps the old ones
//! for verification only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use jsonwebtoken::decode;
use jsonwebtoken::decode_header;
use jsonwebtoken::encode;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;

use crate::crypto::CryptoError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Length of a SEC1 uncompressed P-256 point.
const SEC1_POINT_BYTES: usize = 65;
/// Coordinate length within the point.
const COORDINATE_BYTES: usize = 32;

// ============================================================================
// SECTION: Claims
// ============================================================================

/// Token issuance mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenMode {
    /// Interactive user token from a code or refresh grant.
    User,
    /// Machine-to-machine token from the client credentials grant.
    M2m,
}

/// Access token claims.
///
/// # Invariants
/// - `aud` equals the client id; `iss` equals the issuer URL.
/// - `roles`/`permissions` are present only when RBAC enrichment ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer URL.
    pub iss: String,
    /// Subject identifier.
    pub sub: String,
    /// Audience (client id).
    pub aud: String,
    /// Issue time in unix seconds.
    pub iat: i64,
    /// Expiry time in unix seconds.
    pub exp: i64,
    /// Token identifier.
    pub jti: String,
    /// Subject type label.
    #[serde(rename = "type")]
    pub subject_type: String,
    /// Opaque subject claims bag.
    pub properties: Value,
    /// Issuance mode.
    pub mode: TokenMode,
    /// Issuing tenant.
    pub tenant_id: String,
    /// Client identifier.
    pub client_id: String,
    /// Space-separated granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Role names from RBAC enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    /// Qualified permission names from RBAC enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

// ============================================================================
// SECTION: JWKS
// ============================================================================

/// One published JSON Web Key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (`EC`).
    pub kty: String,
    /// Curve name (`P-256`).
    pub crv: String,
    /// X coordinate, base64url.
    pub x: String,
    /// Y coordinate, base64url.
    pub y: String,
    /// Key identifier.
    pub kid: String,
    /// Signature algorithm (`ES256`).
    pub alg: String,
    /// Key use (`sig`).
    #[serde(rename = "use")]
    pub key_use: String,
}

/// JWKS document served at `/.well-known/jwks.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwksDocument {
    /// Published keys, newest first.
    pub keys: Vec<Jwk>,
}

// ============================================================================
// SECTION: Key Material
// ============================================================================

/// One signing key pair.
#[derive(Debug, Clone)]
struct KeyMaterial {
    /// Key identifier (SHA-256 of the public point, hex).
    kid: String,
    /// PKCS#8 DER private key.
    pkcs8_der: Vec<u8>,
    /// SEC1 uncompressed public point.
    public_point: Vec<u8>,
}

impl KeyMaterial {
    /// Splits the public point into base64url coordinates.
    fn coordinates(&self) -> Result<(String, String), CryptoError> {
        if self.public_point.len() != SEC1_POINT_BYTES || self.public_point[0] != 0x04 {
            return Err(CryptoError::SigningKey("malformed public point".to_string()));
        }
        let x = &self.public_point[1..=COORDINATE_BYTES];
        let y = &self.public_point[1 + COORDINATE_BYTES..];
        Ok((URL_SAFE_NO_PAD.encode(x), URL_SAFE_NO_PAD.encode(y)))
    }
}

/// Serialized key form for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredKey {
    /// Key identifier.
    kid: String,
    /// Signature algorithm label.
    alg: String,
    /// PKCS#8 DER private key, standard base64.
    private_der: String,
    /// SEC1 uncompressed public point, standard base64.
    public_point: String,
}

/// Serialized key set form for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredKeySet {
    /// Keys, newest first.
    keys: Vec<StoredKey>,
}

// ============================================================================
// SECTION: Signing Key Set
// ============================================================================

/// Rotatable ES256 signing key set.
///
/// # Invariants
/// - `keys` is non-empty and ordered newest first; signing always uses
///   `keys[0]`, verification accepts any entry.
#[derive(Debug, Clone)]
pub struct SigningKeySet {
    /// Key materials, newest first.
    keys: Vec<KeyMaterial>,
}

impl SigningKeySet {
    /// Generates a key set with one fresh P-256 key pair.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SigningKey`] when generation fails.
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self {
            keys: vec![generate_key()?],
        })
    }

    /// Prepends a fresh key pair; existing keys remain for verification.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SigningKey`] when generation fails.
    pub fn rotate(&mut self) -> Result<(), CryptoError> {
        let key = generate_key()?;
        self.keys.insert(0, key);
        Ok(())
    }

    /// Returns the `kid` of the signing (newest) key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SigningKey`] when the set is empty.
    pub fn signing_kid(&self) -> Result<&str, CryptoError> {
        self.keys
            .first()
            .map(|key| key.kid.as_str())
            .ok_or_else(|| CryptoError::SigningKey("empty key set".to_string()))
    }

    /// Signs claims with the newest key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::TokenSignature`] when signing fails.
    pub fn sign(&self, claims: &AccessClaims) -> Result<String, CryptoError> {
        let key = self
            .keys
            .first()
            .ok_or_else(|| CryptoError::SigningKey("empty key set".to_string()))?;
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(key.kid.clone());
        let encoding_key = EncodingKey::from_ec_der(&key.pkcs8_der);
        encode(&header, claims, &encoding_key)
            .map_err(|err| CryptoError::TokenSignature(err.to_string()))
    }

    /// Verifies a token against any listed key.
    ///
    /// The issuer is always enforced; the audience only when supplied.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::TokenSignature`] for unknown `kid`, bad
    /// signatures, or failed claim validation.
    pub fn verify(
        &self,
        token: &str,
        expected_issuer: &str,
        expected_audience: Option<&str>,
    ) -> Result<AccessClaims, CryptoError> {
        let header =
            decode_header(token).map_err(|err| CryptoError::TokenSignature(err.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| CryptoError::TokenSignature("token missing kid".to_string()))?;
        let key = self
            .keys
            .iter()
            .find(|key| key.kid == kid)
            .ok_or_else(|| CryptoError::TokenSignature(format!("unknown kid: {kid}")))?;
        let (x, y) = key.coordinates()?;
        let decoding_key = DecodingKey::from_ec_components(&x, &y)
            .map_err(|err| CryptoError::TokenSignature(err.to_string()))?;
        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_issuer(&[expected_issuer]);
        match expected_audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        decode::<AccessClaims>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| CryptoError::TokenSignature(err.to_string()))
    }

    /// Returns the JWKS document for the public halves.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SigningKey`] when a public point is malformed.
    pub fn jwks(&self) -> Result<JwksDocument, CryptoError> {
        let mut keys = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            let (x, y) = key.coordinates()?;
            keys.push(Jwk {
                kty: "EC".to_string(),
                crv: "P-256".to_string(),
                x,
                y,
                kid: key.kid.clone(),
                alg: "ES256".to_string(),
                key_use: "sig".to_string(),
            });
        }
        Ok(JwksDocument { keys })
    }

    /// Serializes the key set for persistence.
    #[must_use]
    pub fn to_stored(&self) -> StoredKeySet {
        StoredKeySet {
            keys: self
                .keys
                .iter()
                .map(|key| StoredKey {
                    kid: key.kid.clone(),
                    alg: "ES256".to_string(),
                    private_der: BASE64.encode(&key.pkcs8_der),
                    public_point: BASE64.encode(&key.public_point),
                })
                .collect(),
        }
    }

    /// Restores a key set from persisted state.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SigningKey`] when the stored form is invalid.
    pub fn from_stored(stored: &StoredKeySet) -> Result<Self, CryptoError> {
        if stored.keys.is_empty() {
            return Err(CryptoError::SigningKey("empty stored key set".to_string()));
        }
        let mut keys = Vec::with_capacity(stored.keys.len());
        for key in &stored.keys {
            if key.alg != "ES256" {
                return Err(CryptoError::SigningKey(format!("unsupported alg: {}", key.alg)));
            }
            let pkcs8_der = BASE64
                .decode(&key.private_der)
                .map_err(|_| CryptoError::SigningKey("invalid private key encoding".to_string()))?;
            let public_point = BASE64
                .decode(&key.public_point)
                .map_err(|_| CryptoError::SigningKey("invalid public point encoding".to_string()))?;
            keys.push(KeyMaterial {
                kid: key.kid.clone(),
                pkcs8_der,
                public_point,
            });
        }
        Ok(Self { keys })
    }
}

/// Generates one fresh P-256 key pair with a point-derived `kid`.
fn generate_key() -> Result<KeyMaterial, CryptoError> {
    let pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)
        .map_err(|err| CryptoError::SigningKey(err.to_string()))?;
    let public_point = pair.public_key_raw().to_vec();
    let kid = hex_digest(&public_point);
    Ok(KeyMaterial {
        kid,
        pkcs8_der: pair.serialize_der(),
        public_point,
    })
}

/// Returns the lowercase hex SHA-256 digest of `bytes`.
fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = std::fmt::Write::write_fmt(&mut out, format_args!("{byte:02x}"));
    }
    out
}
