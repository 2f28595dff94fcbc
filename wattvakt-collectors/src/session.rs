//! Collectors that hold a login session.
//!
//! The session token belongs to one collector instance. Expiry is handled
//! locally: an `AuthExpired` answer drops the token, logs in again and
//! retries the fetch once.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::source::{MetricSource, Metrics, SourceContext};
use crate::CollectorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(pub String);

/// The two calls a session-based source needs.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, ctx: &SourceContext) -> Result<SessionToken, CollectorError>;

    /// Must answer [`CollectorError::AuthExpired`] when `token` is no longer accepted.
    async fn fetch(
        &self,
        ctx: &SourceContext,
        token: &SessionToken,
    ) -> Result<Metrics, CollectorError>;
}

pub struct SessionCollector<A> {
    auth: A,
    session: Mutex<Option<SessionToken>>,
}

impl<A: Authenticator> SessionCollector<A> {
    pub fn new(auth: A) -> Self {
        Self {
            auth,
            session: Mutex::new(None),
        }
    }

    /// Forgets the current session; the next fetch logs in first.
    pub async fn invalidate(&self) {
        *self.session.lock().await = None;
    }

    /// Replaces the current session with a fresh login.
    pub async fn reauthenticate(&self, ctx: &SourceContext) -> Result<(), CollectorError> {
        let mut session = self.session.lock().await;
        *session = None;
        let token = self.auth.login(ctx).await?;
        info!(site = %ctx.site_id, source = %ctx.name(), "Session established");
        *session = Some(token);
        Ok(())
    }

    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    async fn token(&self, ctx: &SourceContext) -> Result<SessionToken, CollectorError> {
        let mut session = self.session.lock().await;
        if let Some(token) = session.as_ref() {
            return Ok(token.clone());
        }
        let token = self.auth.login(ctx).await?;
        debug!(site = %ctx.site_id, source = %ctx.name(), "Logged in");
        *session = Some(token.clone());
        Ok(token)
    }
}

#[async_trait]
impl<A: Authenticator> MetricSource for SessionCollector<A> {
    async fn fetch(&self, ctx: &SourceContext) -> Result<Metrics, CollectorError> {
        let token = self.token(ctx).await?;
        match self.auth.fetch(ctx, &token).await {
            Err(CollectorError::AuthExpired) => {
                warn!(site = %ctx.site_id, source = %ctx.name(), "Session expired, logging in again");
                self.reauthenticate(ctx).await?;
                let token = self.token(ctx).await?;
                self.auth.fetch(ctx, &token).await
            }
            other => other,
        }
    }
}
