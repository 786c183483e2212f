//! Google Calendar target.

use calsync_core::{Fingerprint, NormalizedEvent, SyncWindow, TargetEvent};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, TargetCalendar};

use super::client::GoogleCalendarClient;
use super::config::GoogleConfig;
use super::oauth::OAuthClient;
use super::tokens::{TokenInfo, TokenStorage};

/// An authorized session on one Google calendar.
///
/// Built with [`GoogleCalendar::connect`], which reuses stored tokens and
/// falls back to the browser consent flow only when no usable token exists.
pub struct GoogleCalendar {
    config: GoogleConfig,
    oauth: OAuthClient,
    storage: TokenStorage,
    session: Mutex<Session>,
}

struct Session {
    client: GoogleCalendarClient,
    tokens: TokenInfo,
}

impl GoogleCalendar {
    /// Opens a session, authorizing interactively if needed.
    pub async fn connect(config: GoogleConfig) -> ProviderResult<Self> {
        config.validate().map_err(ProviderError::configuration)?;

        let oauth = OAuthClient::new(
            config.credentials.clone(),
            config.token_url.clone(),
            config.timeout,
        )?;
        let storage = TokenStorage::new(&config.token_path);

        let tokens = match storage.load()? {
            Some(tokens) if tokens.has_scopes(&config.scopes) => tokens,
            Some(_) => {
                info!("stored Google tokens lack the required scopes, authorizing again");
                Self::authorize(&oauth, &storage, &config).await?
            }
            None => Self::authorize(&oauth, &storage, &config).await?,
        };

        let calendar = Self::with_tokens(config, oauth, storage, tokens)?;
        calendar.ensure_fresh().await?;
        Ok(calendar)
    }

    fn with_tokens(
        config: GoogleConfig,
        oauth: OAuthClient,
        storage: TokenStorage,
        tokens: TokenInfo,
    ) -> ProviderResult<Self> {
        let client = GoogleCalendarClient::new(
            &tokens.access_token,
            config.api_base.clone(),
            config.timeout,
            &config.user_agent,
        )?;
        Ok(Self {
            config,
            oauth,
            storage,
            session: Mutex::new(Session { client, tokens }),
        })
    }

    async fn authorize(
        oauth: &OAuthClient,
        storage: &TokenStorage,
        config: &GoogleConfig,
    ) -> ProviderResult<TokenInfo> {
        let tokens = oauth
            .authorize(&config.scopes, config.loopback_ports)
            .await?;
        storage.save(&tokens)?;
        info!("Google authorization complete");
        Ok(tokens)
    }

    /// Refreshes the access token when it has expired.
    ///
    /// A token without a refresh token cannot be renewed and sends the user
    /// through the consent flow again.
    async fn ensure_fresh(&self) -> ProviderResult<()> {
        let mut session = self.session.lock().await;
        if !session.tokens.is_expired() {
            return Ok(());
        }

        match session.tokens.refresh_token.clone() {
            Some(refresh_token) => {
                debug!("refreshing expired Google access token");
                let refreshed = self.oauth.refresh_token(&refresh_token).await?;
                session.tokens.apply_refresh(
                    refreshed.access_token,
                    refreshed.expires_in,
                    refreshed.refresh_token,
                );
                self.storage.save(&session.tokens)?;
            }
            None => {
                info!("Google token cannot be refreshed, authorizing again");
                session.tokens = Self::authorize(&self.oauth, &self.storage, &self.config).await?;
            }
        }

        let access_token = session.tokens.access_token.clone();
        session.client.set_access_token(access_token);
        Ok(())
    }

    /// Returns the calendar this session writes to.
    pub fn calendar_id(&self) -> &str {
        &self.config.calendar_id
    }

    async fn list(&self, window: &SyncWindow) -> ProviderResult<Vec<TargetEvent>> {
        self.ensure_fresh().await?;
        let session = self.session.lock().await;
        session
            .client
            .list_events(&self.config.calendar_id, window.start, window.end)
            .await
    }

    async fn create(
        &self,
        event: &NormalizedEvent,
        fingerprint: &Fingerprint,
    ) -> ProviderResult<String> {
        self.ensure_fresh().await?;
        let session = self.session.lock().await;
        session
            .client
            .insert_event(
                &self.config.calendar_id,
                event,
                fingerprint,
                self.config.self_attendee.as_ref(),
            )
            .await
    }

    async fn delete(&self, external_id: &str) -> ProviderResult<()> {
        self.ensure_fresh().await?;
        let session = self.session.lock().await;
        session
            .client
            .delete_event(&self.config.calendar_id, external_id)
            .await
    }
}

impl TargetCalendar for GoogleCalendar {
    fn name(&self) -> &str {
        "google"
    }

    fn list_events<'a>(
        &'a self,
        window: &'a SyncWindow,
    ) -> BoxFuture<'a, ProviderResult<Vec<TargetEvent>>> {
        Box::pin(async move { self.list(window).await.map_err(|e| e.with_provider("google")) })
    }

    fn create_event<'a>(
        &'a self,
        event: &'a NormalizedEvent,
        fingerprint: &'a Fingerprint,
    ) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(async move {
            self.create(event, fingerprint)
                .await
                .map_err(|e| e.with_provider("google"))
        })
    }

    fn delete_event<'a>(&'a self, external_id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            self.delete(external_id)
                .await
                .map_err(|e| e.with_provider("google"))
        })
    }
}
