//! Composition root: builds every desk service exactly once and hands out
//! shared handles to them.
//!
//! A [`Desk`] is opened via [`DeskBuilder`]. It owns the REST client, the
//! shared [`PushChannel`], one [`ListingStore`] per kind and the
//! [`SessionStore`], and wires them into bindings and pollers on request.

use std::sync::Arc;

use crate::auth::BearerAuth;
use crate::binding::ViewBinding;
use crate::channel::PushChannel;
use crate::client::{Filter, ListingApi, RestClient};
use crate::config::DeskConfig;
use crate::error::{ApiError, ChannelError, DeskError, ErrorDisposition, handle_api_error};
use crate::listing::RealEstateKind;
use crate::live::{ChannelConfig, ConnectionHandle};
use crate::payment::PaymentWatch;
use crate::poller::Poller;
use crate::session::{CurrentUser, SessionStore};
use crate::store::{FetchOutcome, ListingStore};

/// The services of one signed-in desk session.
///
/// `Clone` is cheap: every field is shared.
#[derive(Clone)]
pub struct Desk {
    config: DeskConfig,
    channel_config: ChannelConfig,
    auth: BearerAuth,
    api: Arc<dyn ListingApi>,
    channel: PushChannel,
    stores: [ListingStore; 3],
    session: SessionStore,
    connection: Arc<tokio::sync::Mutex<Option<ConnectionHandle>>>,
}

impl std::fmt::Debug for Desk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Desk")
            .field("config", &self.config)
            .field("channel", &self.channel)
            .field("session", &self.session.path())
            .finish_non_exhaustive()
    }
}

impl Desk {
    pub fn builder() -> DeskBuilder {
        DeskBuilder::new()
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    /// The store for `kind`.
    pub fn store(&self, kind: RealEstateKind) -> &ListingStore {
        &self.stores[kind.index()]
    }

    pub fn channel(&self) -> &PushChannel {
        &self.channel
    }

    pub fn api(&self) -> Arc<dyn ListingApi> {
        Arc::clone(&self.api)
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn auth(&self) -> &BearerAuth {
        &self.auth
    }

    /// Persist a successful login and start sending its token.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Session`] if the session file cannot be written.
    pub fn sign_in(&self, token: impl Into<String>, user: CurrentUser) -> Result<(), DeskError> {
        let token = token.into();
        self.session.sign_in(token.clone(), user)?;
        self.auth.set(token);
        Ok(())
    }

    /// Route an API failure through the shared handler. On a redirect the
    /// in-memory token is dropped and the live connection is told to stop,
    /// so [`start_live`](Self::start_live) can be called again after the
    /// next sign-in.
    pub fn handle_error(&self, err: &ApiError) -> ErrorDisposition {
        let disposition = handle_api_error(err, &self.session);
        if disposition == ErrorDisposition::RedirectToLogin {
            self.auth.clear();
            if let Ok(mut guard) = self.connection.try_lock()
                && let Some(handle) = guard.take()
            {
                tracing::info!("session rejected, closing live connection");
                handle.signal_shutdown();
            }
        }
        disposition
    }

    /// Bind the table for `kind` to the push channel as the signed-in
    /// operator.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::NotSignedIn`] if the session has no operator.
    pub fn bind(&self, kind: RealEstateKind) -> Result<ViewBinding, DeskError> {
        let user = self.session.current_user().ok_or(DeskError::NotSignedIn)?;
        Ok(ViewBinding::new(
            &self.channel,
            self.store(kind).clone(),
            user.user_id,
        ))
    }

    /// Track a subscription payment on the shared channel.
    pub fn payment_watch(&self) -> PaymentWatch {
        PaymentWatch::new(&self.channel)
    }

    /// Open the live push connection in the background.
    ///
    /// Can only be called once per `Desk`. A second call returns an error
    /// without opening another connection.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::AlreadyStarted`] if a connection is already
    /// running, or [`ChannelError::InvalidUrl`] for a bad push URL.
    pub async fn start_live(&self) -> Result<ConnectionHandle, DeskError> {
        let mut guard = self.connection.lock().await;
        if guard.is_some() {
            return Err(ChannelError::AlreadyStarted.into());
        }
        let handle = self.channel.connect(
            &self.config.push_url,
            &self.auth,
            self.channel_config.clone(),
        )?;
        *guard = Some(handle.clone());
        Ok(handle)
    }

    /// Stop the live connection, if one was started.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::TaskFailed`] if the connection task panicked.
    pub async fn shutdown(&self) -> Result<(), DeskError> {
        let handle = self.connection.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await?;
        }
        Ok(())
    }

    /// Start the new-listing timer for the table showing `kind`. Its
    /// failures go through [`handle_error`](Self::handle_error).
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_polling(&self, kind: RealEstateKind) -> Poller {
        let desk = self.clone();
        Poller::spawn(
            self.store(kind).clone(),
            self.api(),
            self.config.poll_interval,
            move |e| desk.handle_error(e),
        )
    }

    /// Load `page` of `kind` with the operator's remembered filter, then
    /// refresh the total.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Api`] after the failure has gone through
    /// [`handle_error`](Self::handle_error).
    pub async fn load_page(&self, kind: RealEstateKind, page: u32) -> Result<FetchOutcome, DeskError> {
        let filter = self.session.filter(kind).unwrap_or_default();
        self.fetch(kind, filter, page).await
    }

    /// Switch the table for `kind` to `filter`, remember it, and load its
    /// first page.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Session`] if the filter cannot be saved, or
    /// [`DeskError::Api`] if the fetch fails.
    pub async fn apply_filter(
        &self,
        kind: RealEstateKind,
        filter: Filter,
    ) -> Result<FetchOutcome, DeskError> {
        self.session.remember_filter(kind, filter.clone())?;
        self.fetch(kind, filter, 1).await
    }

    /// Mark or unmark a listing as favourite, on the server and then locally.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Api`] if the server rejects the change; the local
    /// record is left as it was.
    pub async fn toggle_favourite(
        &self,
        kind: RealEstateKind,
        real_estate_id: &str,
        favourite: bool,
    ) -> Result<(), DeskError> {
        if let Err(e) = self.api.set_favourite(kind, real_estate_id, favourite).await {
            self.handle_error(&e);
            return Err(e.into());
        }
        self.store(kind).set_favourite(real_estate_id, favourite);
        Ok(())
    }

    async fn fetch(
        &self,
        kind: RealEstateKind,
        filter: Filter,
        page: u32,
    ) -> Result<FetchOutcome, DeskError> {
        let store = self.store(kind);
        let outcome = match store.fetch_data(self.api.as_ref(), filter.clone(), page).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.handle_error(&e);
                return Err(e.into());
            }
        };
        if outcome == FetchOutcome::Applied
            && let Err(e) = store.fetch_count(self.api.as_ref(), &filter).await
        {
            self.handle_error(&e);
            return Err(e.into());
        }
        Ok(outcome)
    }
}

/// Builder for configuring and opening a [`Desk`].
///
/// # Examples
///
/// ```no_run
/// use realty_desk::{Desk, DeskConfig};
///
/// # fn example() -> Result<(), realty_desk::DeskError> {
/// let desk = Desk::builder()
///     .config(DeskConfig {
///         api_base_url: "https://desk.example.com".into(),
///         ..DeskConfig::default()
///     })
///     .open()?;
/// # let _ = desk;
/// # Ok(())
/// # }
/// ```
pub struct DeskBuilder {
    config: DeskConfig,
    channel_config: ChannelConfig,
    api: Option<Arc<dyn ListingApi>>,
}

impl DeskBuilder {
    /// Create a builder with [`DeskConfig::default()`].
    pub fn new() -> Self {
        Self {
            config: DeskConfig::default(),
            channel_config: ChannelConfig::default(),
            api: None,
        }
    }

    pub fn config(mut self, config: DeskConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the push reconnection tuning.
    ///
    /// If not called, [`ChannelConfig::default()`] is used.
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// Use `api` instead of a [`RestClient`] built from the config.
    pub fn api(mut self, api: Arc<dyn ListingApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Load the session and build the services.
    ///
    /// No network I/O happens here.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Session`] if the session file exists but cannot
    /// be read, or [`DeskError::Api`] if the HTTP client cannot be built.
    pub fn open(self) -> Result<Desk, DeskError> {
        let session = SessionStore::open(self.config.session_path.clone())?;
        let auth = BearerAuth::new(session.token().unwrap_or_default());
        let api = match self.api {
            Some(api) => api,
            None => Arc::new(RestClient::new(
                self.config.api_base_url.clone(),
                auth.clone(),
            )?),
        };
        tracing::debug!(
            api = %self.config.api_base_url,
            signed_in = session.current_user().is_some(),
            "desk opened"
        );

        Ok(Desk {
            config: self.config,
            channel_config: self.channel_config,
            auth,
            api,
            channel: PushChannel::new(),
            stores: RealEstateKind::ALL.map(ListingStore::new),
            session,
            connection: Arc::new(tokio::sync::Mutex::new(None)),
        })
    }
}

impl Default for DeskBuilder {
    fn default() -> Self {
        Self::new()
    }
}
