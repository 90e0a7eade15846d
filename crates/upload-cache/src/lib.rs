//! Token-addressed preview/confirm staging
//!
//! An upload is staged by [`UploadCache::preview`] and committed by
//! [`UploadCache::confirm`]. Every token moves through exactly one of
//!
//! ```text
//! pending ──confirm──▶ confirmed
//!    └──────ttl──────▶ expired
//! ```
//!
//! The `pending → confirmed` transition happens under the token's own lock, so
//! concurrent confirmations of one token have a single winner. Only the winner
//! receives the staged payload, which is what limits delivery to one.
//!
//! A confirmed token keeps a payload-free tombstone until its original expiry
//! so that a repeated confirm reports [`CacheError::AlreadyConfirmed`]; once
//! swept it reports [`CacheError::TokenNotFound`].

mod clock;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use sweeper::SweeperHandle;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{ForwardResponse, ForwardTarget, Forwarder};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default lifetime of a staged upload
pub const DEFAULT_TTL_SECS: i64 = 900;

/// Opaque upload identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadToken(Uuid);

impl UploadToken {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UploadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for UploadToken {
    type Err = CacheError;

    /// Anything that is not a token we could have issued is simply unknown
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(UploadToken)
            .map_err(|_| CacheError::TokenNotFound)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    #[error("Upload token not found")]
    TokenNotFound,

    #[error("Upload token expired")]
    TokenExpired,

    #[error("Upload token already confirmed")]
    AlreadyConfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Pending,
    Confirmed,
    Expired,
}

/// What `preview` hands back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReceipt {
    pub token: UploadToken,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of a winning confirmation
#[derive(Debug)]
pub struct ConfirmOutcome<P> {
    pub receipt: TokenReceipt,
    pub payload: P,
    /// Present when a delivery was attempted; a failure here never undoes the
    /// confirmation
    pub delivery: Option<ForwardResponse>,
}

enum SlotState<P> {
    Pending(P),
    Confirmed,
    Expired,
}

struct Slot<P> {
    receipt: TokenReceipt,
    state: Mutex<SlotState<P>>,
}

pub struct UploadCache<P> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slots: RwLock<HashMap<UploadToken, Arc<Slot<P>>>>,
}

impl<P: Send + Sync + 'static> UploadCache<P> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stage `payload` under a fresh token. No side effects besides the insert.
    pub async fn preview(&self, payload: P) -> TokenReceipt {
        let created_at = self.clock.now();
        let mut slots = self.slots.write().await;

        let mut token = UploadToken::generate();
        while slots.contains_key(&token) {
            token = UploadToken::generate();
        }

        let receipt = TokenReceipt {
            token,
            created_at,
            expires_at: created_at + self.ttl,
        };
        slots.insert(
            token,
            Arc::new(Slot {
                receipt,
                state: Mutex::new(SlotState::Pending(payload)),
            }),
        );

        debug!(%token, expires_at = %receipt.expires_at, "upload staged");
        receipt
    }

    /// Move `token` from pending to confirmed and hand out its payload.
    ///
    /// Succeeds at most once per token.
    pub async fn confirm(&self, token: &UploadToken) -> Result<(TokenReceipt, P), CacheError> {
        let slot = self
            .slots
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or(CacheError::TokenNotFound)?;

        let mut state = slot.state.lock().await;
        let expired = self.clock.now() > slot.receipt.expires_at;
        let current = match &*state {
            SlotState::Pending(_) => TokenState::Pending,
            SlotState::Confirmed => TokenState::Confirmed,
            SlotState::Expired => TokenState::Expired,
        };

        match current {
            TokenState::Confirmed if expired => {
                drop(state);
                self.evict(token).await;
                Err(CacheError::TokenNotFound)
            }
            TokenState::Confirmed => Err(CacheError::AlreadyConfirmed),
            TokenState::Expired => {
                drop(state);
                self.evict(token).await;
                Err(CacheError::TokenExpired)
            }
            TokenState::Pending if expired => {
                *state = SlotState::Expired;
                drop(state);
                self.evict(token).await;
                info!(%token, "confirm after expiry");
                Err(CacheError::TokenExpired)
            }
            TokenState::Pending => match std::mem::replace(&mut *state, SlotState::Confirmed) {
                SlotState::Pending(payload) => {
                    info!(%token, "upload confirmed");
                    Ok((slot.receipt, payload))
                }
                // Guarded by the same lock as the check above
                _ => Err(CacheError::AlreadyConfirmed),
            },
        }
    }

    /// Confirm and, only for the winning call, deliver once.
    ///
    /// `build` turns the payload into a destination and JSON body; returning
    /// `None` skips delivery.
    pub async fn confirm_and_deliver<F>(
        &self,
        token: &UploadToken,
        forwarder: &dyn Forwarder,
        build: F,
    ) -> Result<ConfirmOutcome<P>, CacheError>
    where
        F: FnOnce(&TokenReceipt, &P) -> Option<(ForwardTarget, serde_json::Value)>,
    {
        let (receipt, payload) = self.confirm(token).await?;

        let delivery = match build(&receipt, &payload) {
            Some((target, body)) => {
                let result = forwarder.deliver(&target, &body).await;
                if let Err(e) = &result {
                    warn!(%token, url = %target.url, error = %e, "delivery after confirm failed");
                }
                Some(ForwardResponse::from(&result))
            }
            None => None,
        };

        Ok(ConfirmOutcome {
            receipt,
            payload,
            delivery,
        })
    }

    /// Current state of a token, if it is still known
    pub async fn state(&self, token: &UploadToken) -> Option<TokenState> {
        let slot = self.slots.read().await.get(token).cloned()?;
        let state = slot.state.lock().await;
        let expired = self.clock.now() > slot.receipt.expires_at;
        Some(match &*state {
            SlotState::Pending(_) if expired => TokenState::Expired,
            SlotState::Pending(_) => TokenState::Pending,
            SlotState::Confirmed => TokenState::Confirmed,
            SlotState::Expired => TokenState::Expired,
        })
    }

    /// Drop every entry past its expiry; returns how many were removed
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| slot.receipt.expires_at >= now);
        let removed = before - slots.len();
        if removed > 0 {
            debug!(removed, remaining = slots.len(), "expired uploads swept");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    pub async fn clear(&self) {
        let mut slots = self.slots.write().await;
        let dropped = slots.len();
        slots.clear();
        info!(dropped, "upload cache cleared");
    }

    async fn evict(&self, token: &UploadToken) {
        self.slots.write().await.remove(token);
    }
}
