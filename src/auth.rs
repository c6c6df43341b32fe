use crate::attendance::error::{Rejection, StoreError};
use crate::attendance::policy::Policy;
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
}

pub trait CredentialVerifier {
    fn verify(&self, token: &str) -> Result<Identity, Rejection>;
}

pub trait AdminRegistry {
    fn is_admin(&self, email: &str) -> Result<bool, StoreError>;
}

pub fn sha256_hex(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Credentials and the admin registry as provisioned into the workspace.
/// Tokens are only ever stored as SHA-256 digests.
pub struct WorkspaceCredentials<'c> {
    conn: &'c Connection,
}

impl<'c> WorkspaceCredentials<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl CredentialVerifier for WorkspaceCredentials<'_> {
    fn verify(&self, token: &str) -> Result<Identity, Rejection> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Rejection::InvalidCredential);
        }
        let row: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT user_id, email FROM credentials WHERE token_sha256 = ?",
                [sha256_hex(token)],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(|e| StoreError::from(e).into_rejection("verify_credential"))?;
        match row {
            Some((user_id, email)) => Ok(Identity { user_id, email }),
            None => Err(Rejection::InvalidCredential),
        }
    }
}

impl AdminRegistry for WorkspaceCredentials<'_> {
    fn is_admin(&self, email: &str) -> Result<bool, StoreError> {
        let hit = self
            .conn
            .query_row(
                "SELECT 1 FROM admins WHERE lower(email) = lower(?)",
                [email],
                |r| r.get::<_, i64>(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ResetAuthorization<'a> {
    Token(&'a str),
    Secret(&'a str),
}

/// Who was allowed to run the reset, for the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetGrant {
    Admin(String),
    SharedSecret,
}

pub fn authorize_reset<V, A>(
    verifier: &V,
    admins: &A,
    policy: &Policy,
    auth: ResetAuthorization<'_>,
) -> Result<ResetGrant, Rejection>
where
    V: CredentialVerifier,
    A: AdminRegistry,
{
    match auth {
        ResetAuthorization::Secret(secret) => {
            let Some(expected) = policy.reset_secret_sha256.as_deref() else {
                tracing::warn!("reset secret presented but none is configured");
                return Err(Rejection::InvalidCredential);
            };
            if sha256_hex(secret.trim()).eq_ignore_ascii_case(expected) {
                Ok(ResetGrant::SharedSecret)
            } else {
                tracing::warn!("reset secret mismatch");
                Err(Rejection::InvalidCredential)
            }
        }
        ResetAuthorization::Token(token) => {
            let identity = verifier.verify(token)?;
            let email = identity.email.unwrap_or_default().to_ascii_lowercase();
            let suffix = format!("@{}", policy.admin_email_domain.to_ascii_lowercase());
            if email.is_empty() || !email.ends_with(&suffix) {
                tracing::warn!(user_id = %identity.user_id, "reset attempted from outside the admin domain");
                return Err(Rejection::UnauthorizedDomain);
            }
            if !admins
                .is_admin(&email)
                .map_err(|e| e.into_rejection("admin_lookup"))?
            {
                tracing::warn!(%email, "reset attempted by non-admin");
                return Err(Rejection::NotAdmin);
            }
            Ok(ResetGrant::Admin(email))
        }
    }
}
