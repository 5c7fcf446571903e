//! Core types shared by backends, portals and persistence.

use serde::{Deserialize, Serialize};

/// Identity-management operation dispatched through a backend.
///
/// Each known operation has a stable numeric code (`1..=18`). Codes outside
/// that range decode to [`Operator::Unknown`], which backends reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Authenticate,
    IdentifyUser,
    ChangePassword,
    AddKeySsh,
    AddKeyGpg,
    DeletePublicKey,
    AddMfaToken,
    DeleteMfaToken,
    AddApiKey,
    DeleteApiKey,
    GetPublicKeys,
    GetApiKeys,
    GetMfaTokens,
    AddUser,
    GetUsers,
    GetUser,
    DeleteUser,
    LookupApiKey,
    Unknown(u16),
}

impl Operator {
    /// Every known operation, in code order.
    pub const ALL: [Operator; 18] = [
        Operator::Authenticate,
        Operator::IdentifyUser,
        Operator::ChangePassword,
        Operator::AddKeySsh,
        Operator::AddKeyGpg,
        Operator::DeletePublicKey,
        Operator::AddMfaToken,
        Operator::DeleteMfaToken,
        Operator::AddApiKey,
        Operator::DeleteApiKey,
        Operator::GetPublicKeys,
        Operator::GetApiKeys,
        Operator::GetMfaTokens,
        Operator::AddUser,
        Operator::GetUsers,
        Operator::GetUser,
        Operator::DeleteUser,
        Operator::LookupApiKey,
    ];

    pub fn code(&self) -> u16 {
        match self {
            Operator::Unknown(code) => *code,
            known => Self::ALL
                .iter()
                .position(|op| op == known)
                .map(|idx| idx as u16 + 1)
                .unwrap_or(0),
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            1..=18 => Self::ALL[code as usize - 1],
            other => Operator::Unknown(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Authenticate => "authenticate",
            Operator::IdentifyUser => "identify_user",
            Operator::ChangePassword => "change_password",
            Operator::AddKeySsh => "add_key_ssh",
            Operator::AddKeyGpg => "add_key_gpg",
            Operator::DeletePublicKey => "delete_public_key",
            Operator::AddMfaToken => "add_mfa_token",
            Operator::DeleteMfaToken => "delete_mfa_token",
            Operator::AddApiKey => "add_api_key",
            Operator::DeleteApiKey => "delete_api_key",
            Operator::GetPublicKeys => "get_public_keys",
            Operator::GetApiKeys => "get_api_keys",
            Operator::GetMfaTokens => "get_mfa_tokens",
            Operator::AddUser => "add_user",
            Operator::GetUsers => "get_users",
            Operator::GetUser => "get_user",
            Operator::DeleteUser => "delete_user",
            Operator::LookupApiKey => "lookup_api_key",
            Operator::Unknown(_) => "unknown",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Unknown(code) => write!(f, "unknown({})", code),
            known => f.write_str(known.as_str()),
        }
    }
}

impl std::str::FromStr for Operator {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown operator: {}", s))
    }
}

// ============================================================================
// Request payloads
// ============================================================================

/// Payload carried by an operation. Which fields are required depends on the
/// operator; handlers report missing ones as `Error::MissingField`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub user: UserRequest,
    #[serde(default)]
    pub key: Option<KeyRequest>,
    #[serde(default)]
    pub mfa_token: Option<MfaTokenRequest>,
    #[serde(default)]
    pub api_key: Option<ApiKeyRequest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub old_password: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// SSH or GPG public key material, or the id of a key to delete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyRequest {
    pub id: Option<String>,
    pub payload: Option<String>,
    pub comment: Option<String>,
    /// Restricts `get_public_keys` to one kind of key
    pub usage: Option<KeyUsage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MfaTokenRequest {
    pub id: Option<String>,
    /// Base32 (no padding) shared secret
    pub secret: Option<String>,
    pub algorithm: Option<String>,
    pub period: Option<u64>,
    pub digits: Option<usize>,
    /// Current code proving the client holds the secret
    pub passcode: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeyRequest {
    pub id: Option<String>,
    /// Presented key, for lookups
    pub key: Option<String>,
    pub comment: Option<String>,
}

impl Request {
    pub fn for_user(username: impl Into<String>) -> Self {
        Self {
            user: UserRequest {
                username: Some(username.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.user.password = Some(password.into());
        self
    }

    pub fn with_old_password(mut self, password: impl Into<String>) -> Self {
        self.user.old_password = Some(password.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.user.email = Some(email.into());
        self
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.user.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_key(mut self, payload: impl Into<String>) -> Self {
        self.key.get_or_insert_with(KeyRequest::default).payload = Some(payload.into());
        self
    }

    pub fn with_key_id(mut self, id: impl Into<String>) -> Self {
        self.key.get_or_insert_with(KeyRequest::default).id = Some(id.into());
        self
    }

    pub fn with_key_usage(mut self, usage: KeyUsage) -> Self {
        self.key.get_or_insert_with(KeyRequest::default).usage = Some(usage);
        self
    }

    pub fn with_mfa_token(mut self, token: MfaTokenRequest) -> Self {
        self.mfa_token = Some(token);
        self
    }

    pub fn with_mfa_token_id(mut self, id: impl Into<String>) -> Self {
        self.mfa_token.get_or_insert_with(MfaTokenRequest::default).id = Some(id.into());
        self
    }

    pub fn with_api_key_id(mut self, id: impl Into<String>) -> Self {
        self.api_key.get_or_insert_with(ApiKeyRequest::default).id = Some(id.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key.get_or_insert_with(ApiKeyRequest::default).key = Some(key.into());
        self
    }

    pub fn with_api_key_comment(mut self, comment: impl Into<String>) -> Self {
        self.api_key.get_or_insert_with(ApiKeyRequest::default).comment = Some(comment.into());
        self
    }

    pub fn username(&self) -> Option<&str> {
        self.user.username.as_deref().filter(|s| !s.is_empty())
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Result of a successfully dispatched operation
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Response {
    Done,
    Authenticated(UserSummary),
    User(UserSummary),
    Users(Vec<UserSummary>),
    PublicKeys(Vec<PublicKey>),
    ApiKeys(Vec<ApiKey>),
    /// The plaintext secret is only ever returned here.
    ApiKeyIssued { key: ApiKey, secret: String },
    MfaTokens(Vec<MfaToken>),
}

// ============================================================================
// Credential records
// ============================================================================

/// A user and all of its credential material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub password_hash: Option<String>,
    pub password_updated_at: Option<i64>,
    #[serde(default)]
    pub public_keys: Vec<PublicKey>,
    #[serde(default)]
    pub mfa_tokens: Vec<MfaToken>,
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UserRecord {
    pub fn new(username: impl Into<String>, email: Option<String>, roles: Vec<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            email,
            roles,
            password_hash: None,
            password_updated_at: None,
            public_keys: Vec::new(),
            mfa_tokens: Vec::new(),
            api_keys: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp();
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
            has_password: self.password_hash.is_some(),
            public_key_count: self.public_keys.len(),
            mfa_token_count: self.mfa_tokens.len(),
            api_key_count: self.api_keys.len(),
            created_at: self.created_at,
        }
    }
}

/// Secret-free view of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub has_password: bool,
    pub public_key_count: usize,
    pub mfa_token_count: usize,
    pub api_key_count: usize,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUsage {
    Ssh,
    Gpg,
}

impl std::fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ssh => write!(f, "ssh"),
            Self::Gpg => write!(f, "gpg"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicKey {
    /// Fingerprint of the key material
    pub id: String,
    pub usage: KeyUsage,
    pub key_type: String,
    pub payload: String,
    pub comment: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MfaTokenKind {
    Totp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfaToken {
    pub id: String,
    pub kind: MfaTokenKind,
    pub algorithm: String,
    pub period: u64,
    pub digits: usize,
    /// Base32 shared secret; empty in redacted copies
    #[serde(default)]
    pub secret: String,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl MfaToken {
    pub fn redacted(&self) -> Self {
        Self {
            secret: String::new(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    /// Leading characters of the issued key, for display
    pub prefix: String,
    /// SHA-256 of the issued key; empty in redacted copies
    #[serde(default)]
    pub hash: String,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl ApiKey {
    pub fn redacted(&self) -> Self {
        Self {
            hash: String::new(),
            ..self.clone()
        }
    }
}
