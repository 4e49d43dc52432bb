use crate::{
    error::{AppError, AppResult},
    models::{Coordinator, CoordinatorType, User},
};
use argon2::Argon2;
use axum::{
    async_trait,
    extract::{FromRequest, RequestParts},
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use jsonwebtoken::{
    errors::Result as JwtResult, DecodingKey, EncodingKey, Header, TokenData, Validation,
};
use once_cell::sync::OnceCell;
use password_hash::{
    self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;

/// Email verification links stop working after three days.
pub const VERIFICATION_TIMEOUT: Duration = Duration::from_secs(3 * 24 * 60 * 60);

pub fn hash_password(password: impl AsRef<[u8]>) -> password_hash::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_ref(), &salt)
        .map(|h| h.to_string())
}

pub fn verify_password(
    password: impl AsRef<[u8]>,
    password_hash: impl AsRef<str>,
) -> password_hash::Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash.as_ref())?;
    Ok(Argon2::default()
        .verify_password(password.as_ref(), &parsed_hash)
        .is_ok())
}

/// Login check: a stored hash that cannot be parsed never matches.
pub fn password_matches(password: impl AsRef<[u8]>, password_hash: &str) -> bool {
    verify_password(password, password_hash).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "stored password hash is unreadable");
        false
    })
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    secret: Vec<u8>,
}

static KEYS: OnceCell<Keys> = OnceCell::new();

/// Installs the signing secret. The first call wins.
pub fn install_secret(secret: &str) {
    KEYS.get_or_init(|| Keys {
        encoding: EncodingKey::from_secret(secret.as_bytes()),
        decoding: DecodingKey::from_secret(secret.as_bytes()),
        secret: secret.as_bytes().to_vec(),
    });
}

fn keys() -> anyhow::Result<&'static Keys> {
    KEYS.get()
        .ok_or_else(|| anyhow::anyhow!("signing secret has not been installed"))
}

/// Who a bearer token speaks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    User {
        user_id: i32,
        username: String,
        is_staff: bool,
    },
    Coordinator {
        coordinator_name: String,
        email: String,
        coordinator_type: CoordinatorType,
    },
}

impl Principal {
    pub fn for_user(user: &User) -> Self {
        Principal::User {
            user_id: user.id,
            username: user.username.clone(),
            is_staff: user.is_staff,
        }
    }

    pub fn for_coordinator(coordinator: &Coordinator) -> Self {
        Principal::Coordinator {
            coordinator_name: coordinator.name.clone(),
            email: coordinator.email.clone(),
            coordinator_type: coordinator.kind(),
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Principal::User { is_staff: true, .. })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(flatten)]
    pub principal: Principal,
    /// Session id, used to end a session before it expires.
    pub jti: String,
    pub exp: u64,
}

pub fn generate_jwt(principal: Principal, exp: Duration) -> anyhow::Result<String> {
    let token = jsonwebtoken::encode(
        &Header::default(),
        &Claims {
            principal,
            jti: nanoid::nanoid!(),
            exp: jsonwebtoken::get_current_timestamp() + exp.as_secs(),
        },
        &keys()?.encoding,
    )?;
    Ok(token)
}

pub fn validate_jwt(token: &str) -> anyhow::Result<TokenData<Claims>> {
    let data: JwtResult<TokenData<Claims>> =
        jsonwebtoken::decode::<Claims>(token, &keys()?.decoding, &Validation::default());
    Ok(data?)
}

/// Sessions ended by logout, kept until their tokens would have expired.
#[derive(Default)]
pub struct Sessions(HashMap<String, u64>);

pub type SharedSessions = Arc<Mutex<Sessions>>;

impl Sessions {
    pub fn shared() -> SharedSessions {
        Arc::new(Mutex::new(Sessions::default()))
    }

    pub fn end(&mut self, claims: &Claims) {
        let now = jsonwebtoken::get_current_timestamp();
        self.0.retain(|_, exp| *exp > now);
        self.0.insert(claims.jti.clone(), claims.exp);
    }

    pub fn is_ended(&self, jti: &str) -> bool {
        self.0.contains_key(jti)
    }
}

/// Any valid, live bearer token.
pub struct ExtractAuth(pub Claims);

#[async_trait]
impl<B: Send> FromRequest<B> for ExtractAuth {
    type Rejection = AppError;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request(req)
                .await
                .map_err(|_| AppError::unauthorized("Authentication credentials were not provided."))?;

        let claims = validate_jwt(bearer.token())
            .map_err(|_| AppError::unauthorized("invalid or expired token"))?
            .claims;

        let sessions = req
            .extensions()
            .get::<SharedSessions>()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("session store is not installed"))?;

        if sessions.lock().await.is_ended(&claims.jti) {
            return Err(AppError::unauthorized("session has ended"));
        }

        Ok(ExtractAuth(claims))
    }
}

/// A logged in standard account.
pub struct UserAuth {
    pub user_id: i32,
    pub claims: Claims,
}

#[async_trait]
impl<B: Send> FromRequest<B> for UserAuth {
    type Rejection = AppError;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let ExtractAuth(claims) = ExtractAuth::from_request(req).await?;
        match claims.principal {
            Principal::User { user_id, .. } => Ok(UserAuth { user_id, claims }),
            Principal::Coordinator { .. } => Err(AppError::forbidden()),
        }
    }
}

/// A staff account. Guards every write on the REST collections.
pub struct StaffOnly;

#[async_trait]
impl<B: Send> FromRequest<B> for StaffOnly {
    type Rejection = AppError;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let ExtractAuth(claims) = ExtractAuth::from_request(req).await?;
        if claims.principal.is_staff() {
            Ok(StaffOnly)
        } else {
            Err(AppError::forbidden())
        }
    }
}

/// A coordinator session, as set up by coordinator login.
pub struct CoordinatorAuth {
    pub coordinator_name: String,
    pub email: String,
    pub coordinator_type: CoordinatorType,
}

#[async_trait]
impl<B: Send> FromRequest<B> for CoordinatorAuth {
    type Rejection = AppError;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let ExtractAuth(claims) = ExtractAuth::from_request(req).await?;
        match claims.principal {
            Principal::Coordinator {
                coordinator_name,
                email,
                coordinator_type,
            } => Ok(CoordinatorAuth {
                coordinator_name,
                email,
                coordinator_type,
            }),
            Principal::User { .. } => Err(AppError::forbidden()),
        }
    }
}

pub fn encode_uid(user_id: i32) -> String {
    URL_SAFE_NO_PAD.encode(user_id.to_string())
}

pub fn decode_uid(uidb64: &str) -> Option<i32> {
    let raw = URL_SAFE_NO_PAD.decode(uidb64).ok()?;
    String::from_utf8(raw).ok()?.parse().ok()
}

fn verification_mac(user: &User, timestamp: u64) -> anyhow::Result<Hmac<Sha256>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(&keys()?.secret)
        .map_err(|_| anyhow::anyhow!("invalid verification key"))?;
    mac.update(
        format!(
            "{}:{}:{}:{}",
            user.id, user.password_hash, user.is_active, timestamp
        )
        .as_bytes(),
    );
    Ok(mac)
}

/// Token proving control of the account's email address. Activating the
/// account changes its state and so invalidates every earlier token.
pub fn make_verification_token(user: &User, timestamp: u64) -> anyhow::Result<String> {
    let digest = verification_mac(user, timestamp)?.finalize().into_bytes();
    Ok(format!("{timestamp}-{}", hex::encode(digest)))
}

pub fn check_verification_token(user: &User, token: &str, now: u64) -> bool {
    let Some((timestamp, digest)) = token.split_once('-') else {
        return false;
    };
    let (Ok(timestamp), Ok(digest)) = (timestamp.parse::<u64>(), hex::decode(digest)) else {
        return false;
    };
    if now.saturating_sub(timestamp) > VERIFICATION_TIMEOUT.as_secs() {
        return false;
    }

    match verification_mac(user, timestamp) {
        Ok(mac) => mac.verify_slice(&digest).is_ok(),
        Err(_) => false,
    }
}
