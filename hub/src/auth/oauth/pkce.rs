//! MCP client authorization server (§4.8.2): this hub acts as its own
//! RFC 7636 (PKCE) authorization-code issuer for MCP clients, rather than
//! federating to an upstream provider — there's no third-party identity
//! involved, just an MCP client proving it holds the verifier matching
//! the challenge it sent when the code was issued.
//!
//! Built on the same `oauth2` crate types `auth::oauth::entra` uses for
//! the client side, with an in-memory code/token store replacing what
//! the teacher optionally backs with Redis (§5, §9).

use std::time::{Duration, Instant};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use dashmap::DashMap;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const CODE_TTL: Duration = Duration::from_secs(5 * 60);
const TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeChallengeMethod {
    S256,
    Plain,
}

impl CodeChallengeMethod {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "S256" => Ok(Self::S256),
            "plain" => Ok(Self::Plain),
            other => Err(Error::Validation(format!("unsupported code_challenge_method '{other}'"))),
        }
    }
}

struct PendingAuthorization {
    client_id: String,
    redirect_uri: String,
    code_challenge: String,
    method: CodeChallengeMethod,
    scopes: Vec<String>,
    issued_at: Instant,
}

struct IssuedToken {
    client_id: String,
    scopes: Vec<String>,
    issued_at: Instant,
}

/// The access token a successful exchange hands back to the MCP client.
pub struct AccessTokenGrant {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub scopes: Vec<String>,
}

/// What a validated bearer token resolves to (§4.8.1 `AuthContext{type:
/// 'oauth', keyId: clientId, scopes}`).
pub struct ValidatedToken {
    pub client_id: String,
    pub scopes: Vec<String>,
}

/// In-memory authorization-code + access-token store for MCP's PKCE
/// flow. No refresh tokens are issued (§4.8.2).
#[derive(Default)]
pub struct McpAuthorizationServer {
    codes: DashMap<String, PendingAuthorization>,
    tokens: DashMap<String, IssuedToken>,
}

impl McpAuthorizationServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn random_token(byte_len: usize) -> String {
        let mut bytes = vec![0u8; byte_len];
        rand::rng().fill(bytes.as_mut_slice());
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Issues an authorization code bound to the client's PKCE challenge,
    /// valid for [`CODE_TTL`].
    pub fn issue_authorization_code(
        &self,
        client_id: &str,
        redirect_uri: &str,
        code_challenge: &str,
        method: CodeChallengeMethod,
        scopes: Vec<String>,
    ) -> String {
        self.sweep_expired_codes();
        let code = Self::random_token(32);
        self.codes.insert(
            code.clone(),
            PendingAuthorization {
                client_id: client_id.to_string(),
                redirect_uri: redirect_uri.to_string(),
                code_challenge: code_challenge.to_string(),
                method,
                scopes,
                issued_at: Instant::now(),
            },
        );
        code
    }

    /// Exchanges `code` for an access token, verifying the PKCE
    /// `code_verifier` against the challenge recorded at issuance time.
    /// The code is single-use: consumed on both success and failure.
    pub fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<AccessTokenGrant> {
        let (_, pending) = self
            .codes
            .remove(code)
            .ok_or_else(|| Error::Auth("unknown or already-used authorization code".to_string()))?;

        if pending.issued_at.elapsed() >= CODE_TTL {
            return Err(Error::Auth("authorization code has expired".to_string()));
        }
        if pending.redirect_uri != redirect_uri {
            return Err(Error::Auth("redirect_uri does not match the authorization request".to_string()));
        }
        if !Self::verify_challenge(&pending.code_challenge, pending.method, code_verifier) {
            return Err(Error::Auth("PKCE code_verifier does not match code_challenge".to_string()));
        }

        let access_token = Self::random_token(32);
        self.tokens.insert(
            access_token.clone(),
            IssuedToken {
                client_id: pending.client_id,
                scopes: pending.scopes.clone(),
                issued_at: Instant::now(),
            },
        );

        Ok(AccessTokenGrant {
            access_token,
            token_type: "Bearer",
            expires_in: TOKEN_TTL.as_secs(),
            scopes: pending.scopes,
        })
    }

    fn verify_challenge(challenge: &str, method: CodeChallengeMethod, verifier: &str) -> bool {
        match method {
            CodeChallengeMethod::Plain => challenge == verifier,
            CodeChallengeMethod::S256 => {
                let digest = Sha256::digest(verifier.as_bytes());
                URL_SAFE_NO_PAD.encode(digest) == challenge
            }
        }
    }

    /// Looks up a bearer token presented by an MCP client (§4.8.1 path 2).
    pub fn validate_access_token(&self, token: &str) -> Option<ValidatedToken> {
        let entry = self.tokens.get(token)?;
        if entry.issued_at.elapsed() >= TOKEN_TTL {
            drop(entry);
            self.tokens.remove(token);
            return None;
        }
        Some(ValidatedToken {
            client_id: entry.client_id.clone(),
            scopes: entry.scopes.clone(),
        })
    }

    fn sweep_expired_codes(&self) {
        self.codes.retain(|_, pending| pending.issued_at.elapsed() < CODE_TTL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s256_round_trip_succeeds() {
        let server = McpAuthorizationServer::new();
        let verifier = "a-high-entropy-verifier-string-at-least-43-chars-long";
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

        let code = server.issue_authorization_code(
            "mcp-client",
            "https://client.example.com/callback",
            &challenge,
            CodeChallengeMethod::S256,
            vec!["probe".to_string()],
        );

        let grant = server
            .exchange_code(&code, "https://client.example.com/callback", verifier)
            .unwrap();
        assert_eq!(grant.expires_in, TOKEN_TTL.as_secs());

        let validated = server.validate_access_token(&grant.access_token).unwrap();
        assert_eq!(validated.client_id, "mcp-client");
    }

    #[test]
    fn wrong_verifier_is_rejected() {
        let server = McpAuthorizationServer::new();
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(b"correct-verifier"));
        let code = server.issue_authorization_code(
            "mcp-client",
            "https://client.example.com/callback",
            &challenge,
            CodeChallengeMethod::S256,
            vec![],
        );
        let err = server
            .exchange_code(&code, "https://client.example.com/callback", "wrong-verifier")
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn code_is_single_use() {
        let server = McpAuthorizationServer::new();
        let verifier = "verifier-value";
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        let code = server.issue_authorization_code(
            "mcp-client",
            "https://client.example.com/callback",
            &challenge,
            CodeChallengeMethod::S256,
            vec![],
        );
        server
            .exchange_code(&code, "https://client.example.com/callback", verifier)
            .unwrap();
        let err = server
            .exchange_code(&code, "https://client.example.com/callback", verifier)
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }
}
