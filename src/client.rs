//! Typed REST client for the listing API.
//!
//! [`ListingApi`] is the seam the stores and the poller depend on, so tests
//! can inject a fake. [`RestClient`] is the `reqwest` implementation that
//! talks to `{base}/api/real-estate/...` with a bearer token.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::BearerAuth;
use crate::error::ApiError;
use crate::listing::{Listing, RealEstateKind};

/// Ordered query parameters describing which listings a table shows.
///
/// Persisted per kind in the session so a table reopens with its last
/// filter.
///
/// # Examples
///
/// ```
/// use realty_desk::Filter;
///
/// let filter = Filter::new().with("rooms", "2").with("district", "center");
/// assert_eq!(filter.get("rooms"), Some("2"));
/// assert_eq!(filter.pairs().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    params: Vec<(String, String)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing an earlier value for the same key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// The REST operations the desk needs.
#[async_trait]
pub trait ListingApi: Send + Sync {
    /// Fetch one page of listings matching `filter`, newest first.
    async fn fetch_page(
        &self,
        kind: RealEstateKind,
        filter: &Filter,
        page: u32,
    ) -> Result<Vec<Listing>, ApiError>;

    /// Count every listing matching `filter`.
    async fn fetch_count(&self, kind: RealEstateKind, filter: &Filter) -> Result<u64, ApiError>;

    /// Fetch listings matching `filter` that are newer than `after`
    /// (all of the first page when `after` is `None`), newest first.
    async fn fetch_newer(
        &self,
        kind: RealEstateKind,
        filter: &Filter,
        after: Option<&str>,
    ) -> Result<Vec<Listing>, ApiError>;

    /// Mark or unmark a listing as a favourite of the signed-in operator.
    async fn set_favourite(
        &self,
        kind: RealEstateKind,
        id: &str,
        favourite: bool,
    ) -> Result<(), ApiError>;
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map an HTTP status to the error taxonomy.
///
/// # Arguments
///
/// * `status` - The numeric HTTP status.
/// * `body` - The response body, used for the 400 message when it is a
///   `{"message": ...}` object.
///
/// # Returns
///
/// `Ok(())` for 2xx statuses.
///
/// # Errors
///
/// [`ApiError::Unauthorized`] for 401/403, [`ApiError::Validation`] for 400,
/// [`ApiError::Status`] otherwise.
pub fn check_status(status: u16, body: &str) -> Result<(), ApiError> {
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(ApiError::Unauthorized(status)),
        400 => {
            let message = serde_json::from_str::<ErrorBody>(body)
                .map(|b| b.message)
                .unwrap_or_else(|_| body.trim().to_string());
            Err(ApiError::Validation(message))
        }
        _ => Err(ApiError::Status(status)),
    }
}

/// `{base}/api/real-estate/{kind}` with any trailing slash on `base` removed.
pub(crate) fn listings_url(base: &str, kind: RealEstateKind) -> String {
    format!("{}/api/real-estate/{}", base.trim_end_matches('/'), kind.slug())
}

/// `reqwest`-backed [`ListingApi`].
///
/// `Clone` is cheap: the `reqwest::Client` and the token are shared.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    auth: BearerAuth,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl RestClient {
    /// Build a client for the API rooted at `base_url`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Proxy root, e.g. `"https://desk.example.com"`. The
    ///   `/api/...` paths are appended.
    /// * `auth` - Shared bearer token; may be empty while signed out.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the TLS backend cannot be
    /// initialised.
    pub fn new(base_url: impl Into<String>, auth: BearerAuth) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("realty-desk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request with the bearer token and return the body of a 2xx
    /// response.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String, ApiError> {
        let response = self.auth.apply(req).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        check_status(status, &body)?;
        Ok(body)
    }
}

#[async_trait]
impl ListingApi for RestClient {
    async fn fetch_page(
        &self,
        kind: RealEstateKind,
        filter: &Filter,
        page: u32,
    ) -> Result<Vec<Listing>, ApiError> {
        let req = self
            .http
            .get(listings_url(&self.base_url, kind))
            .query(&[("page", page.to_string())])
            .query(filter.pairs());
        let body = self.send(req).await?;
        let listings: Vec<Listing> = serde_json::from_str(&body)?;
        tracing::debug!(%kind, page, count = listings.len(), "fetched listing page");
        Ok(listings)
    }

    async fn fetch_count(&self, kind: RealEstateKind, filter: &Filter) -> Result<u64, ApiError> {
        let url = format!("{}/count", listings_url(&self.base_url, kind));
        let body = self.send(self.http.get(url).query(filter.pairs())).await?;
        let CountResponse { count } = serde_json::from_str(&body)?;
        Ok(count)
    }

    async fn fetch_newer(
        &self,
        kind: RealEstateKind,
        filter: &Filter,
        after: Option<&str>,
    ) -> Result<Vec<Listing>, ApiError> {
        let url = format!("{}/new", listings_url(&self.base_url, kind));
        let mut req = self.http.get(url);
        if let Some(after) = after {
            req = req.query(&[("after", after)]);
        }
        let body = self.send(req.query(filter.pairs())).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn set_favourite(
        &self,
        kind: RealEstateKind,
        id: &str,
        favourite: bool,
    ) -> Result<(), ApiError> {
        let url = format!("{}/{id}/favourite", listings_url(&self.base_url, kind));
        let req = if favourite {
            self.http.put(url)
        } else {
            self.http.delete(url)
        };
        self.send(req).await?;
        Ok(())
    }
}
