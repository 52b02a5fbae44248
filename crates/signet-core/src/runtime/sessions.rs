// crates/signet-core/src/runtime/sessions.rs
// ============================================================================
// Module: Session Engine
// Description: Browser/account session lifecycle and OIDC prompt handling.
// Purpose: Manage multi-account sessions with sliding expiry and versioning.
// Dependencies: crate::core, crate::crypto, crate::store
// ============================================================================

//! ## Overview
//! A browser session holds up to N account sessions ordered by last
//! authentication; exactly one is active while any exist. Mutations are
//! serialized per session and bump the monotone `version` counter used for
//! optimistic concurrency: writers that observe a version change while
//! applying retry a bounded number of times and then fail with
//! `version_conflict`. Adding an account beyond the cap evicts the
//! least-recently-authenticated one. The prompt evaluator implements the
//! OIDC `prompt` / `max_age` / `login_hint` / `account_hint` semantics used
//! by `/authorize`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::ClientId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TokenId;
use crate::core::identifiers::UserId;
use crate::core::session::AccountSession;
use crate::core::session::BrowserSession;
use crate::core::session::Prompt;
use crate::core::subject::SubjectType;
use crate::core::time::Timestamp;
use crate::crypto::secrets;
use crate::store::KeyPath;
use crate::store::KeyValueStore;
use crate::store::StoreError;
use crate::store::TenantScopedStore;
use crate::store::read_json;
use crate::store::write_json;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Session engine tuning.
///
/// # Invariants
/// - `max_accounts` >= 1.
/// - `sliding_window_secs` <= `session_lifetime_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum account sessions per browser session.
    pub max_accounts: usize,
    /// Browser session lifetime in seconds.
    pub session_lifetime_secs: u64,
    /// Inactivity span after which `last_activity` is refreshed.
    pub sliding_window_secs: u64,
    /// Optimistic-concurrency retries before `version_conflict`.
    pub version_retries: u32,
    /// Reject additions at the cap instead of evicting the oldest account.
    pub strict_account_cap: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_accounts: 3,
            session_lifetime_secs: 7 * 24 * 60 * 60,
            sliding_window_secs: 24 * 60 * 60,
            version_retries: 3,
            strict_account_cap: false,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Session engine errors.
///
/// # Invariants
/// - Variants map 1:1 to the stable domain error codes.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Account cap reached and strict capping is enabled.
    #[error("max accounts exceeded")]
    MaxAccountsExceeded,
    /// No browser session exists for the identifier.
    #[error("session not found: {0}")]
    SessionNotFound(String),
    /// No account session exists for the user.
    #[error("account not found: {0}")]
    AccountNotFound(String),
    /// Browser session exceeded its lifetime.
    #[error("session expired: {0}")]
    SessionExpired(String),
    /// Optimistic concurrency lost after bounded retries.
    #[error("session version conflict: {0}")]
    VersionConflict(String),
    /// Cookie failed to decrypt or parse.
    #[error("invalid session cookie: {0}")]
    InvalidCookie(String),
    /// Storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Inputs + Outcomes
// ============================================================================

/// Input for adding an account to a browser session.
#[derive(Debug, Clone)]
pub struct AddAccount {
    /// Authenticated user.
    pub user_id: UserId,
    /// Subject category from the provider flow.
    pub subject_type: SubjectType,
    /// Opaque claims bag from the provider flow.
    pub subject_properties: Value,
    /// Refresh token bound to the account session.
    pub refresh_token: Option<TokenId>,
    /// Client the account authenticated through.
    pub client_id: ClientId,
    /// Account session lifetime in seconds.
    pub ttl_secs: u64,
}

/// Authorization-time session parameters from the OIDC request.
#[derive(Debug, Clone, Default)]
pub struct AuthorizeSessionParams {
    /// `prompt` parameter, when recognized.
    pub prompt: Option<Prompt>,
    /// `max_age` in seconds.
    pub max_age: Option<u64>,
    /// `login_hint` (matched case-insensitively against account emails).
    pub login_hint: Option<String>,
    /// `account_hint` (matched against account user ids).
    pub account_hint: Option<String>,
}

/// Prompt evaluation outcome for `/authorize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    /// Issue a code silently for the active account.
    Proceed {
        /// Active, unexpired account session.
        account: AccountSession,
    },
    /// Show the provider login UI (no usable account, or forced login).
    ShowLogin,
    /// `prompt=none` with no usable account: redirect with `login_required`.
    LoginRequired,
    /// Two or more accounts: return the account picker.
    SelectAccount {
        /// Unexpired account sessions in authentication order.
        accounts: Vec<AccountSession>,
    },
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Session engine operating on tenant-scoped storage handles.
///
/// # Invariants
/// - Per-session mutations are serialized through an in-process lock table;
///   the persisted `version` provides conflict detection across processes.
/// - Account records and the user index are kept consistent with the
///   browser session's account list.
pub struct SessionEngine {
    /// Engine tuning.
    config: SessionConfig,
    /// In-process per-session write locks.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionEngine {
    /// Creates an engine with the given tuning.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the engine tuning.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the storage key for a browser session.
    fn session_key(sid: &SessionId) -> KeyPath {
        KeyPath::from_segments(&["sessions", sid.as_str()])
    }

    /// Returns the storage key for an account session.
    fn account_key(sid: &SessionId, user_id: &UserId) -> KeyPath {
        KeyPath::from_segments(&["accounts", sid.as_str(), user_id.as_str()])
    }

    /// Returns the storage key for a user's session index marker.
    fn user_index_key(user_id: &UserId, sid: &SessionId) -> KeyPath {
        KeyPath::from_segments(&["user_sessions", user_id.as_str(), sid.as_str()])
    }

    /// Returns the per-session write lock, creating it on first use.
    fn lock_for(&self, sid: &SessionId) -> Arc<Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(sid.as_str().to_string()).or_default())
    }

    /// Creates a new browser session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] when persistence fails.
    pub fn create_browser_session(
        &self,
        store: &TenantScopedStore,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<BrowserSession, SessionError> {
        let now = Timestamp::now();
        let session = BrowserSession {
            id: SessionId::new(secrets::generate_secret()),
            tenant_id: store.tenant_id().clone(),
            created_at: now,
            last_activity: now,
            user_agent,
            ip_address,
            version: 1,
            active_user_id: None,
            account_user_ids: Vec::new(),
        };
        write_json(
            store,
            &Self::session_key(&session.id),
            &session,
            Some(self.config.session_lifetime_secs),
        )?;
        Ok(session)
    }

    /// Loads a browser session, enforcing lifetime expiry.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionNotFound`] or
    /// [`SessionError::SessionExpired`].
    pub fn get_browser_session(
        &self,
        store: &TenantScopedStore,
        sid: &SessionId,
    ) -> Result<BrowserSession, SessionError> {
        let session = read_json::<BrowserSession>(store, &Self::session_key(sid))?
            .ok_or_else(|| SessionError::SessionNotFound(sid.to_string()))?;
        let expiry = session.last_activity.plus_secs(self.config.session_lifetime_secs);
        if !Timestamp::now().is_before(expiry) {
            self.delete_session_state(store, &session)?;
            return Err(SessionError::SessionExpired(sid.to_string()));
        }
        Ok(session)
    }

    /// Refreshes `last_activity` when the sliding window elapsed.
    ///
    /// Returns the session and whether the cookie must be re-emitted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session is missing or expired.
    pub fn touch(
        &self,
        store: &TenantScopedStore,
        sid: &SessionId,
    ) -> Result<(BrowserSession, bool), SessionError> {
        let session = self.get_browser_session(store, sid)?;
        let now = Timestamp::now();
        if now.seconds_since(session.last_activity) <= self.config.sliding_window_secs {
            return Ok((session, false));
        }
        let refreshed = self.mutate(store, sid, |session| {
            session.last_activity = now;
            Ok(())
        })?;
        Ok((refreshed, true))
    }

    /// Adds or re-authenticates an account, enforcing the cap.
    ///
    /// The account becomes active; beyond the cap the
    /// least-recently-authenticated account is evicted (or the call fails
    /// when strict capping is on).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MaxAccountsExceeded`] under strict capping.
    pub fn add_account(
        &self,
        store: &TenantScopedStore,
        sid: &SessionId,
        input: AddAccount,
    ) -> Result<AccountSession, SessionError> {
        let now = Timestamp::now();
        let account = AccountSession {
            id: SessionId::new(secrets::generate_id("acs")),
            browser_session_id: sid.clone(),
            user_id: input.user_id.clone(),
            is_active: true,
            authenticated_at: now,
            expires_at: now.plus_secs(input.ttl_secs),
            subject_type: input.subject_type,
            subject_properties: input.subject_properties,
            refresh_token: input.refresh_token,
            client_id: input.client_id,
        };
        let strict = self.config.strict_account_cap;
        let max_accounts = self.config.max_accounts;
        let mut evicted: Option<UserId> = None;
        self.mutate(store, sid, |session| {
            if let Some(position) =
                session.account_user_ids.iter().position(|uid| uid == &input.user_id)
            {
                // Re-authentication: move to the most-recent end.
                session.account_user_ids.remove(position);
            } else if session.account_user_ids.len() >= max_accounts {
                if strict {
                    return Err(SessionError::MaxAccountsExceeded);
                }
                evicted = Some(session.account_user_ids.remove(0));
            }
            session.account_user_ids.push(input.user_id.clone());
            session.active_user_id = Some(input.user_id.clone());
            Ok(())
        })?;
        if let Some(evicted_user) = &evicted {
            store.remove(&Self::account_key(sid, evicted_user))?;
            store.remove(&Self::user_index_key(evicted_user, sid))?;
        }
        self.deactivate_others(store, sid, &input.user_id)?;
        write_json(store, &Self::account_key(sid, &input.user_id), &account, Some(input.ttl_secs))?;
        write_json(store, &Self::user_index_key(&input.user_id, sid), &true, Some(input.ttl_secs))?;
        Ok(account)
    }

    /// Switches the active account.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AccountNotFound`] when the user has no account
    /// in the session.
    pub fn switch_active(
        &self,
        store: &TenantScopedStore,
        sid: &SessionId,
        user_id: &UserId,
    ) -> Result<BrowserSession, SessionError> {
        let account_key = Self::account_key(sid, user_id);
        if read_json::<AccountSession>(store, &account_key)?.is_none() {
            return Err(SessionError::AccountNotFound(user_id.to_string()));
        }
        let session = self.mutate(store, sid, |session| {
            if !session.has_account(user_id) {
                return Err(SessionError::AccountNotFound(user_id.to_string()));
            }
            session.active_user_id = Some(user_id.clone());
            Ok(())
        })?;
        self.deactivate_others(store, sid, user_id)?;
        if let Some(mut account) = read_json::<AccountSession>(store, &account_key)? {
            account.is_active = true;
            let ttl = account.expires_at.seconds_since(Timestamp::now());
            write_json(store, &account_key, &account, Some(ttl.max(1)))?;
        }
        Ok(session)
    }

    /// Lists unexpired account sessions in authentication order.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session is missing or expired.
    pub fn list_accounts(
        &self,
        store: &TenantScopedStore,
        sid: &SessionId,
    ) -> Result<Vec<AccountSession>, SessionError> {
        let session = self.get_browser_session(store, sid)?;
        let now = Timestamp::now();
        let mut accounts = Vec::with_capacity(session.account_user_ids.len());
        for user_id in &session.account_user_ids {
            if let Some(account) =
                read_json::<AccountSession>(store, &Self::account_key(sid, user_id))?
                && !account.is_expired(now)
            {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    /// Returns the active, unexpired account session, when one exists.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session is missing or expired.
    pub fn active_account(
        &self,
        store: &TenantScopedStore,
        sid: &SessionId,
    ) -> Result<Option<AccountSession>, SessionError> {
        let session = self.get_browser_session(store, sid)?;
        let Some(active) = &session.active_user_id else {
            return Ok(None);
        };
        let account = read_json::<AccountSession>(store, &Self::account_key(sid, active))?;
        Ok(account.filter(|account| !account.is_expired(Timestamp::now())))
    }

    /// Removes one account; the first remaining account becomes active.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AccountNotFound`] when the user has no account
    /// in the session.
    pub fn remove_account(
        &self,
        store: &TenantScopedStore,
        sid: &SessionId,
        user_id: &UserId,
    ) -> Result<BrowserSession, SessionError> {
        let session = self.mutate(store, sid, |session| {
            let Some(position) = session.account_user_ids.iter().position(|uid| uid == user_id)
            else {
                return Err(SessionError::AccountNotFound(user_id.to_string()));
            };
            session.account_user_ids.remove(position);
            if session.active_user_id.as_ref() == Some(user_id) {
                session.active_user_id = session.account_user_ids.first().cloned();
            }
            Ok(())
        })?;
        store.remove(&Self::account_key(sid, user_id))?;
        store.remove(&Self::user_index_key(user_id, sid))?;
        if let Some(new_active) = session.active_user_id.clone() {
            self.switch_active(store, sid, &new_active)?;
        }
        self.get_browser_session(store, sid)
    }

    /// Removes every account from the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session is missing or expired.
    pub fn remove_all_accounts(
        &self,
        store: &TenantScopedStore,
        sid: &SessionId,
    ) -> Result<BrowserSession, SessionError> {
        let mut removed: Vec<UserId> = Vec::new();
        let session = self.mutate(store, sid, |session| {
            removed = std::mem::take(&mut session.account_user_ids);
            session.active_user_id = None;
            Ok(())
        })?;
        for user_id in &removed {
            store.remove(&Self::account_key(sid, user_id))?;
            store.remove(&Self::user_index_key(user_id, sid))?;
        }
        Ok(session)
    }

    /// Binds a refresh token to the user's account sessions for a client.
    ///
    /// Called after a token grant so the account session tracks the live
    /// refresh family.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] when the index scan fails.
    pub fn bind_refresh_token(
        &self,
        store: &TenantScopedStore,
        user_id: &UserId,
        client_id: &ClientId,
        token: &TokenId,
    ) -> Result<(), SessionError> {
        let prefix = KeyPath::from_segments(&["user_sessions", user_id.as_str()]);
        for (key, _) in store.scan(&prefix)? {
            let Some(sid) = key.segments().last().map(|s| SessionId::new(s.clone())) else {
                continue;
            };
            let account_key = Self::account_key(&sid, user_id);
            if let Some(mut account) = read_json::<AccountSession>(store, &account_key)?
                && &account.client_id == client_id
            {
                account.refresh_token = Some(token.clone());
                let ttl = account.expires_at.seconds_since(Timestamp::now());
                write_json(store, &account_key, &account, Some(ttl.max(1)))?;
            }
        }
        Ok(())
    }

    /// Deletes every account session of a user across browser sessions.
    ///
    /// Returns the number of removed account sessions.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] when the index scan fails.
    pub fn revoke_user_sessions(
        &self,
        store: &TenantScopedStore,
        user_id: &UserId,
    ) -> Result<usize, SessionError> {
        let prefix = KeyPath::from_segments(&["user_sessions", user_id.as_str()]);
        let markers = store.scan(&prefix)?;
        let mut revoked = 0usize;
        for (key, _) in markers {
            let Some(sid) = key.segments().last().map(|s| SessionId::new(s.clone())) else {
                continue;
            };
            match self.remove_account(store, &sid, user_id) {
                Ok(_) => revoked += 1,
                Err(
                    SessionError::SessionNotFound(_)
                    | SessionError::SessionExpired(_)
                    | SessionError::AccountNotFound(_),
                ) => {
                    store.remove(&Self::user_index_key(user_id, &sid))?;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(revoked)
    }

    /// Deletes one browser session and all its account state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionNotFound`] when absent.
    pub fn revoke_browser_session(
        &self,
        store: &TenantScopedStore,
        sid: &SessionId,
    ) -> Result<(), SessionError> {
        let session = read_json::<BrowserSession>(store, &Self::session_key(sid))?
            .ok_or_else(|| SessionError::SessionNotFound(sid.to_string()))?;
        self.delete_session_state(store, &session)
    }

    /// Evaluates the OIDC prompt semantics for `/authorize`.
    ///
    /// Hint parameters may switch the active account before the outcome is
    /// computed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] when storage fails; missing or expired
    /// sessions yield a login outcome instead of an error.
    pub fn evaluate_authorize(
        &self,
        store: &TenantScopedStore,
        sid: Option<&SessionId>,
        params: &AuthorizeSessionParams,
    ) -> Result<PromptOutcome, SessionError> {
        let session = match sid {
            Some(sid) => match self.get_browser_session(store, sid) {
                Ok(session) => Some(session),
                Err(SessionError::SessionNotFound(_) | SessionError::SessionExpired(_)) => None,
                Err(err) => return Err(err),
            },
            None => None,
        };
        let Some(session) = session else {
            return Ok(no_session_outcome(params.prompt));
        };
        let sid = session.id.clone();

        if let Some(hint) = &params.account_hint {
            let hinted = UserId::new(hint.clone());
            if session.has_account(&hinted) {
                self.switch_active(store, &sid, &hinted)?;
            }
        } else if let Some(hint) = &params.login_hint {
            let accounts = self.list_accounts(store, &sid)?;
            if let Some(matched) = accounts
                .iter()
                .find(|account| account.email().is_some_and(|email| email.eq_ignore_ascii_case(hint)))
            {
                let matched_user = matched.user_id.clone();
                self.switch_active(store, &sid, &matched_user)?;
            }
        }

        let active = self.active_account(store, &sid)?;
        let fresh_enough = |account: &AccountSession| {
            params.max_age.is_none_or(|max_age| {
                Timestamp::now().seconds_since(account.authenticated_at) <= max_age
            })
        };

        match params.prompt {
            Some(Prompt::Login) => Ok(PromptOutcome::ShowLogin),
            Some(Prompt::None) => match active {
                Some(account) if fresh_enough(&account) => Ok(PromptOutcome::Proceed { account }),
                _ => Ok(PromptOutcome::LoginRequired),
            },
            Some(Prompt::SelectAccount) => {
                let accounts = self.list_accounts(store, &sid)?;
                if accounts.len() >= 2 {
                    Ok(PromptOutcome::SelectAccount { accounts })
                } else {
                    match active {
                        Some(account) if fresh_enough(&account) => {
                            Ok(PromptOutcome::Proceed { account })
                        }
                        _ => Ok(PromptOutcome::ShowLogin),
                    }
                }
            }
            Some(Prompt::Consent) | None => match active {
                Some(account) if fresh_enough(&account) => Ok(PromptOutcome::Proceed { account }),
                _ => Ok(PromptOutcome::ShowLogin),
            },
        }
    }

    /// Applies a mutation under the session lock with version bookkeeping.
    fn mutate(
        &self,
        store: &TenantScopedStore,
        sid: &SessionId,
        mut apply: impl FnMut(&mut BrowserSession) -> Result<(), SessionError>,
    ) -> Result<BrowserSession, SessionError> {
        let lock = self.lock_for(sid);
        let _guard = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let key = Self::session_key(sid);
        for _ in 0..=self.config.version_retries {
            let mut session = self.get_browser_session(store, sid)?;
            let loaded_version = session.version;
            apply(&mut session)?;
            // Conflict check against concurrent out-of-process writers.
            let current = read_json::<BrowserSession>(store, &key)?
                .ok_or_else(|| SessionError::SessionNotFound(sid.to_string()))?;
            if current.version != loaded_version {
                continue;
            }
            session.version = loaded_version + 1;
            write_json(store, &key, &session, Some(self.config.session_lifetime_secs))?;
            return Ok(session);
        }
        Err(SessionError::VersionConflict(sid.to_string()))
    }

    /// Marks every non-target account session inactive.
    fn deactivate_others(
        &self,
        store: &TenantScopedStore,
        sid: &SessionId,
        active_user: &UserId,
    ) -> Result<(), SessionError> {
        let session = self.get_browser_session(store, sid)?;
        for user_id in &session.account_user_ids {
            if user_id == active_user {
                continue;
            }
            let key = Self::account_key(sid, user_id);
            if let Some(mut account) = read_json::<AccountSession>(store, &key)?
                && account.is_active
            {
                account.is_active = false;
                let ttl = account.expires_at.seconds_since(Timestamp::now());
                write_json(store, &key, &account, Some(ttl.max(1)))?;
            }
        }
        Ok(())
    }

    /// Removes a browser session and all dependent records.
    fn delete_session_state(
        &self,
        store: &TenantScopedStore,
        session: &BrowserSession,
    ) -> Result<(), SessionError> {
        for user_id in &session.account_user_ids {
            store.remove(&Self::account_key(&session.id, user_id))?;
            store.remove(&Self::user_index_key(user_id, &session.id))?;
        }
        store.remove(&Self::session_key(&session.id))?;
        Ok(())
    }
}

/// Outcome when no usable browser session exists.
const fn no_session_outcome(prompt: Option<Prompt>) -> PromptOutcome {
    match prompt {
        Some(Prompt::None) => PromptOutcome::LoginRequired,
        _ => PromptOutcome::ShowLogin,
    }
}
