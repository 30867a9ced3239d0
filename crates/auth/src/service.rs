use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use gatekeeper_core::PrincipalId;

use crate::{
    AuthContext, AuthError, AuthPolicy, BcryptHasher, CredentialStore, CredentialVerifier,
    Hs256TokenManager, NewPrincipal, PasswordHasher, Principal, PublicPrincipal, Requirement, Role,
    RoleDefinition, TokenClaims, TokenManager, authorize, credentials::hash_secret,
    normalize_username,
};

/// Successful login: bearer token plus the principal without secrets.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub principal: PublicPrincipal,
}

/// Orchestration boundary consumed by the HTTP layer.
///
/// Every collaborator is injected; nothing here reaches for a global handle.
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenManager>,
    verifier: CredentialVerifier,
    policy: AuthPolicy,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenManager>,
        policy: AuthPolicy,
    ) -> Self {
        let verifier = CredentialVerifier::new(
            Arc::clone(&store),
            Arc::clone(&hasher),
            policy.lockout_threshold,
        );
        Self {
            store,
            hasher,
            tokens,
            verifier,
            policy,
        }
    }

    /// bcrypt + HS256 wired from `policy`.
    pub fn with_policy(store: Arc<dyn CredentialStore>, jwt_secret: &[u8], policy: AuthPolicy) -> Self {
        let hasher: Arc<dyn PasswordHasher> = Arc::new(BcryptHasher::new(policy.bcrypt_cost));
        let tokens: Arc<dyn TokenManager> =
            Arc::new(Hs256TokenManager::new(jwt_secret, policy.token_ttl));
        Self::new(store, hasher, tokens, policy)
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    pub async fn login(&self, username: &str, secret: &str) -> Result<LoginOutcome, AuthError> {
        self.login_at(username, secret, Utc::now()).await
    }

    pub async fn login_at(
        &self,
        username: &str,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginOutcome, AuthError> {
        let principal = self.verifier.attempt_login(username, secret, now).await?;
        let issued = self.tokens.issue(&principal, now)?;

        Ok(LoginOutcome {
            token: issued.token,
            expires_at: issued.expires_at,
            principal: principal.to_public(),
        })
    }

    pub async fn change_password(
        &self,
        id: PrincipalId,
        current_secret: &str,
        new_secret: &str,
    ) -> Result<bool, AuthError> {
        self.verifier
            .change_password(id, current_secret, new_secret)
            .await?;
        Ok(true)
    }

    pub async fn get_profile(&self, id: PrincipalId) -> Result<PublicPrincipal, AuthError> {
        self.store
            .find_by_id(id)
            .await?
            .map(|p| p.to_public())
            .ok_or(AuthError::NotFound)
    }

    /// Signature and expiry check only; no store access.
    pub fn validate_token(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, AuthError> {
        Ok(self.tokens.validate(token, now)?)
    }

    pub async fn authenticate(&self, token: &str) -> Result<AuthContext, AuthError> {
        self.authenticate_at(token, Utc::now()).await
    }

    /// Validate `token` and rebuild the request context from the principal's
    /// current record. Deleted, inactive or locked principals are
    /// `Unauthenticated` even while their token is still valid.
    #[instrument(skip(self, token))]
    pub async fn authenticate_at(&self, token: &str, now: DateTime<Utc>) -> Result<AuthContext, AuthError> {
        let claims = self.validate_token(token, now)?;

        let principal = self
            .store
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        if !principal.active || principal.credential.is_locked() {
            debug!(principal_id = %principal.id, "token holder no longer eligible");
            return Err(AuthError::Unauthenticated);
        }

        Ok(AuthContext::from(&principal))
    }

    pub async fn authorize(&self, token: &str, requirement: &Requirement) -> Result<AuthContext, AuthError> {
        self.authorize_at(token, requirement, Utc::now()).await
    }

    pub async fn authorize_at(
        &self,
        token: &str,
        requirement: &Requirement,
        now: DateTime<Utc>,
    ) -> Result<AuthContext, AuthError> {
        let ctx = self.authenticate_at(token, now).await?;
        authorize(Some(&ctx), requirement)?;
        Ok(ctx)
    }

    /// Create a principal with a freshly hashed secret.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn register(&self, input: NewPrincipal) -> Result<PublicPrincipal, AuthError> {
        input.validate()?;
        let username = normalize_username(&input.username);

        let roles = self.resolve_roles(&input.roles).await?;

        if self.store.find_by_username(&username).await?.is_some() {
            return Err(AuthError::Conflict(format!("username '{username}' is taken")));
        }

        let hash = hash_secret(&self.hasher, &input.secret).await?;
        let mut principal = Principal::new(username, hash);
        principal.email = input.email;
        principal.roles = roles;
        principal.permissions = input.permissions.into_iter().collect();
        principal.beneficiary = input.beneficiary;

        let saved = self.store.save(principal).await?;
        info!(principal_id = %saved.id, "principal registered");
        Ok(saved.to_public())
    }

    pub async fn list_roles(&self) -> Result<Vec<RoleDefinition>, AuthError> {
        Ok(self.store.list_roles().await?)
    }

    async fn resolve_roles(&self, names: &[Role]) -> Result<Vec<RoleDefinition>, AuthError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let found = self.store.find_roles_by_name(names).await?;
        let unknown: Vec<&str> = names
            .iter()
            .filter(|name| !found.iter().any(|role| &role.name == *name))
            .map(|name| name.as_str())
            .collect();

        if !unknown.is_empty() {
            return Err(AuthError::BadRequest(format!("unknown roles: {}", unknown.join(", "))));
        }
        Ok(found)
    }
}
