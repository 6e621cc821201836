//! Online-mode authentication: the proxy's key pair, verification of the
//! client's encryption response, the session server hash and the
//! session service call.

use crate::protocol::packet::{
    login::{PlayerKey, SaltSignature},
    EncryptionResponse, EncryptionVerification, GameProfileProperty,
};
use anyhow::Context;
use async_trait::async_trait;
use rsa::{
    pkcs1v15::{Signature, VerifyingKey},
    pkcs8::{DecodePublicKey, EncodePublicKey},
    signature::Verifier,
    Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::net::IpAddr;
use uuid::Uuid;

const KEY_BITS: usize = 1024;

pub const MOJANG_SESSION_SERVER: &str = "https://sessionserver.mojang.com";

/// A player's identity as returned by the session server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameProfile {
    #[serde(with = "uuid::serde::simple")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub properties: Vec<GameProfileProperty>,
}

impl GameProfile {
    pub fn offline(name: &str) -> Self {
        Self {
            id: offline_uuid(name),
            name: name.to_owned(),
            properties: Vec::new(),
        }
    }
}

/// The RSA key pair the proxy uses for the login key exchange.
pub struct ServerKeyPair {
    private: RsaPrivateKey,
    public_der: Vec<u8>,
}

impl ServerKeyPair {
    pub fn generate() -> anyhow::Result<Self> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), KEY_BITS)
            .context("failed to generate server key pair")?;
        let public_der = RsaPublicKey::from(&private)
            .to_public_key_der()
            .context("failed to encode server public key")?
            .into_vec();
        Ok(Self {
            private,
            public_der,
        })
    }

    /// The public key in X.509 DER form, as sent in EncryptionRequest.
    pub fn public_der(&self) -> &[u8] {
        &self.public_der
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, AuthError> {
        self.private
            .decrypt(Pkcs1v15Encrypt, data)
            .map_err(AuthError::Decrypt)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to decrypt: {0}")]
    Decrypt(#[source] rsa::Error),
    #[error("verify token mismatch")]
    TokenMismatch,
    #[error("shared secret has {0} bytes, expected 16")]
    BadSecretLength(usize),
    #[error("signed verification without a player key")]
    MissingPlayerKey,
    #[error("invalid player key")]
    InvalidPlayerKey,
    #[error("bad verify token signature")]
    BadSignature,
}

/// Checks an EncryptionResponse against the token the proxy sent and
/// returns the shared secret.
pub fn verify_response(
    key_pair: &ServerKeyPair,
    response: &EncryptionResponse,
    verify_token: &[u8],
    player_key: Option<&PlayerKey>,
) -> Result<[u8; 16], AuthError> {
    match &response.verify {
        EncryptionVerification::Token(encrypted) => {
            if key_pair.decrypt(encrypted)? != verify_token {
                return Err(AuthError::TokenMismatch);
            }
        }
        EncryptionVerification::Signature(signature) => {
            let player_key = player_key.ok_or(AuthError::MissingPlayerKey)?;
            verify_salt_signature(player_key, verify_token, signature)?;
        }
    }

    let secret = key_pair.decrypt(&response.shared_secret)?;
    <[u8; 16]>::try_from(secret.as_slice()).map_err(|_| AuthError::BadSecretLength(secret.len()))
}

fn verify_salt_signature(
    player_key: &PlayerKey,
    verify_token: &[u8],
    signature: &SaltSignature,
) -> Result<(), AuthError> {
    let public = RsaPublicKey::from_public_key_der(&player_key.public_key)
        .map_err(|_| AuthError::InvalidPlayerKey)?;
    let mut message = verify_token.to_vec();
    message.extend_from_slice(&signature.salt.to_be_bytes());
    let signature =
        Signature::try_from(signature.signature.as_slice()).map_err(|_| AuthError::BadSignature)?;
    VerifyingKey::<Sha256>::new(public)
        .verify(&message, &signature)
        .map_err(|_| AuthError::BadSignature)
}

/// The server id hash sent to the session server: a SHA-1 digest printed
/// as a signed hexadecimal number.
pub fn server_hash(server_id: &str, shared_secret: &[u8], public_key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(shared_secret);
    hasher.update(public_key);
    signed_hex(hasher.finalize().into())
}

fn signed_hex(mut digest: [u8; 20]) -> String {
    let negative = digest[0] & 0x80 != 0;
    if negative {
        let mut carry = true;
        for byte in digest.iter_mut().rev() {
            *byte = !*byte;
            if carry {
                let (sum, overflow) = byte.overflowing_add(1);
                *byte = sum;
                carry = overflow;
            }
        }
    }
    let hex = hex::encode(digest);
    let digits = match hex.trim_start_matches('0') {
        "" => "0",
        digits => digits,
    };
    if negative {
        format!("-{digits}")
    } else {
        digits.to_owned()
    }
}

/// The UUID given to `name` when the proxy runs in offline mode.
pub fn offline_uuid(name: &str) -> Uuid {
    let mut bytes = md5::compute(format!("OfflinePlayer:{name}")).0;
    bytes[6] = (bytes[6] & 0x0f) | 0x30;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes)
}

/// Asks whether a player has joined with a given server hash.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// `Ok(None)` if the session server does not know the join.
    async fn has_joined(
        &self,
        username: &str,
        server_hash: &str,
        ip: Option<IpAddr>,
    ) -> anyhow::Result<Option<GameProfile>>;
}

/// The session service backed by Mojang's HTTP API.
pub struct MojangSessionService {
    client: reqwest::Client,
    base_url: String,
}

impl MojangSessionService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for MojangSessionService {
    fn default() -> Self {
        Self::new(MOJANG_SESSION_SERVER)
    }
}

#[async_trait]
impl SessionService for MojangSessionService {
    async fn has_joined(
        &self,
        username: &str,
        server_hash: &str,
        ip: Option<IpAddr>,
    ) -> anyhow::Result<Option<GameProfile>> {
        let mut request = self
            .client
            .get(format!("{}/session/minecraft/hasJoined", self.base_url))
            .query(&[("username", username), ("serverId", server_hash)]);
        if let Some(ip) = ip {
            request = request.query(&[("ip", ip.to_string())]);
        }
        let response = request.send().await.context("session server unreachable")?;
        match response.status() {
            reqwest::StatusCode::OK => Ok(Some(
                response
                    .json()
                    .await
                    .context("malformed session server response")?,
            )),
            reqwest::StatusCode::NO_CONTENT => Ok(None),
            status => anyhow::bail!("session server returned {status}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::{pkcs1v15::SigningKey, signature::SignatureEncoding, signature::Signer};

    #[test]
    fn server_hash_matches_known_digests() {
        assert_eq!(
            server_hash("Notch", &[], &[]),
            "4ed1f46bbe04bc756bcb17c0c7ce3e4632f06a48"
        );
        assert_eq!(
            server_hash("jeb_", &[], &[]),
            "-7c9d5b0044c130109a5d7b5fb5c317c02b4e28c1"
        );
        assert_eq!(
            server_hash("simon", &[], &[]),
            "88e16a1019277b15d58faf0541e11910eb756f6"
        );
    }

    #[test]
    fn offline_uuids_are_name_based() {
        let uuid = offline_uuid("Notch");
        assert_eq!(uuid.to_string(), "b50ad385-829d-3141-a216-7e7d7539ba7f");
        assert_eq!(uuid.get_version_num(), 3);
    }

    #[test]
    fn profiles_parse_undashed_ids() {
        let profile: GameProfile = serde_json::from_str(
            r#"{"id":"069a79f444e94726a5befca90e38aaf5","name":"Notch","properties":[{"name":"textures","value":"e30="}]}"#,
        )
        .unwrap();
        assert_eq!(profile.id.to_string(), "069a79f4-44e9-4726-a5be-fca90e38aaf5");
        assert_eq!(profile.properties[0].signature, None);
    }

    fn encrypt(key_pair: &ServerKeyPair, data: &[u8]) -> Vec<u8> {
        RsaPublicKey::from(&key_pair.private)
            .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, data)
            .unwrap()
    }

    #[test]
    fn token_response_yields_the_secret() {
        let key_pair = ServerKeyPair::generate().unwrap();
        let response = EncryptionResponse {
            shared_secret: encrypt(&key_pair, &[3; 16]),
            verify: EncryptionVerification::Token(encrypt(&key_pair, &[1, 2, 3, 4])),
        };
        assert_eq!(
            verify_response(&key_pair, &response, &[1, 2, 3, 4], None).unwrap(),
            [3; 16]
        );
        assert!(matches!(
            verify_response(&key_pair, &response, &[4, 3, 2, 1], None),
            Err(AuthError::TokenMismatch)
        ));

        let short = EncryptionResponse {
            shared_secret: encrypt(&key_pair, &[3; 8]),
            verify: EncryptionVerification::Token(encrypt(&key_pair, &[1, 2, 3, 4])),
        };
        assert!(matches!(
            verify_response(&key_pair, &short, &[1, 2, 3, 4], None),
            Err(AuthError::BadSecretLength(8))
        ));
    }

    #[test]
    fn salt_signature_is_checked_with_the_player_key() {
        let key_pair = ServerKeyPair::generate().unwrap();
        let player_private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let player_key = PlayerKey {
            expiry: 0,
            public_key: RsaPublicKey::from(&player_private)
                .to_public_key_der()
                .unwrap()
                .into_vec(),
            signature: Vec::new(),
        };
        let mut message = vec![9, 9, 9, 9];
        message.extend_from_slice(&42i64.to_be_bytes());
        let signature = SigningKey::<Sha256>::new(player_private).sign(&message).to_vec();

        let response = EncryptionResponse {
            shared_secret: encrypt(&key_pair, &[5; 16]),
            verify: EncryptionVerification::Signature(SaltSignature {
                salt: 42,
                signature,
            }),
        };
        assert!(verify_response(&key_pair, &response, &[9, 9, 9, 9], Some(&player_key)).is_ok());
        assert!(matches!(
            verify_response(&key_pair, &response, &[9, 9, 9, 8], Some(&player_key)),
            Err(AuthError::BadSignature)
        ));
        assert!(matches!(
            verify_response(&key_pair, &response, &[9, 9, 9, 9], None),
            Err(AuthError::MissingPlayerKey)
        ));
    }
}
