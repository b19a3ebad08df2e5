//! Per-kind listing store: the current page as an immutable snapshot.
//!
//! A [`ListingStore`] owns the page a table is showing. Push handlers and
//! UI actions mutate it through narrow operations; readers get an
//! `Arc<ListingPage>` snapshot and can [`subscribe`](ListingStore::subscribe)
//! to be woken on every change. Mutations copy-on-write, so a snapshot a
//! reader holds never changes underneath it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::client::{Filter, ListingApi};
use crate::error::ApiError;
use crate::event::CallStarted;
use crate::listing::{CallingUser, Comment, Listing, RealEstateKind};

/// The page of listings a table is currently showing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Records on this page, newest first.
    pub listings: Vec<Listing>,
    /// 1-based page number; 0 before the first fetch.
    pub page: u32,
    pub filter: Filter,
    /// Total matching listings, once counted for this filter.
    pub total: Option<u64>,
}

impl ListingPage {
    pub fn get(&self, id: &str) -> Option<&Listing> {
        self.listings.iter().find(|l| l.id == id)
    }

    /// The listing `user_id` is currently calling, if it is on this page.
    pub fn called_by(&self, user_id: &str) -> Option<&Listing> {
        self.listings.iter().find(|l| {
            l.calling_user
                .as_ref()
                .is_some_and(|caller| caller.user_id == user_id)
        })
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.listings.iter().position(|l| l.id == id)
    }
}

/// Whether a fetch result was applied to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// A newer fetch was issued while this one was in flight; its result was
    /// discarded.
    Stale,
}

struct StoreInner {
    kind: RealEstateKind,
    state: watch::Sender<Arc<ListingPage>>,
    /// Ticket of the most recently issued page fetch.
    page_generation: AtomicU64,
    /// Ticket of the most recently issued count fetch.
    count_generation: AtomicU64,
}

/// Store for the current page of one [`RealEstateKind`].
///
/// Every mutation is a no-op when the id is not on the current page: push
/// events for listings this table is not showing are expected and are not
/// errors. A mutation that changes nothing does not wake subscribers.
///
/// `Clone` is cheap: clones share the same page.
#[derive(Clone)]
pub struct ListingStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for ListingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListingStore")
            .field("kind", &self.inner.kind)
            .field("listings", &self.inner.state.borrow().listings.len())
            .finish()
    }
}

impl ListingStore {
    /// Create an empty store for `kind`.
    pub fn new(kind: RealEstateKind) -> Self {
        let (state, _) = watch::channel(Arc::new(ListingPage::default()));
        Self {
            inner: Arc::new(StoreInner {
                kind,
                state,
                page_generation: AtomicU64::new(0),
                count_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Create a store that already holds `listings` as page 1.
    pub fn with_listings(kind: RealEstateKind, listings: Vec<Listing>) -> Self {
        let store = Self::new(kind);
        store.inner.state.send_replace(Arc::new(ListingPage {
            listings,
            page: 1,
            ..ListingPage::default()
        }));
        store
    }

    pub fn kind(&self) -> RealEstateKind {
        self.inner.kind
    }

    /// The current page. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<ListingPage> {
        let page = self.inner.state.borrow();
        Arc::clone(&*page)
    }

    /// A receiver that is notified after every effective change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ListingPage>> {
        self.inner.state.subscribe()
    }

    /// Mutate the listing with `id` in place, if it is on the page.
    ///
    /// `f` returns whether it changed anything; subscribers are only woken
    /// when it did.
    fn update_listing(&self, id: &str, f: impl FnOnce(&mut Listing) -> bool) -> bool {
        self.inner.state.send_if_modified(|page| {
            let Some(idx) = page.position(id) else {
                return false;
            };
            f(&mut Arc::make_mut(page).listings[idx])
        })
    }

    /// Mark a listing as being called by the operator in `event`.
    ///
    /// Last write wins: an existing reservation by someone else is replaced.
    ///
    /// # Returns
    ///
    /// `true` if the listing is on the page and its caller changed.
    pub fn reserve_for_call(&self, event: &CallStarted) -> bool {
        let caller = CallingUser {
            user_id: event.user_id.clone(),
            full_name: event.full_name.clone(),
            avatar_url: event.avatar_url.clone(),
        };
        let changed = self.update_listing(&event.real_estate_id, |listing| {
            if listing.calling_user.as_ref() == Some(&caller) {
                return false;
            }
            listing.calling_user = Some(caller);
            true
        });
        if changed {
            tracing::debug!(
                kind = %self.kind(),
                real_estate_id = %event.real_estate_id,
                user_id = %event.user_id,
                "listing reserved for call"
            );
        }
        changed
    }

    /// Clear the reservation on a listing.
    pub fn cancel_reservation_for_call(&self, real_estate_id: &str) -> bool {
        self.update_listing(real_estate_id, |listing| listing.calling_user.take().is_some())
    }

    /// Clear the reservation held by a disconnected operator.
    ///
    /// At most one listing is reserved per operator, so only the first match
    /// is cleared. No other listing is touched.
    pub fn handle_disconnect(&self, user_id: &str) -> bool {
        let changed = self.inner.state.send_if_modified(|page| {
            let Some(idx) = page.listings.iter().position(|l| {
                l.calling_user
                    .as_ref()
                    .is_some_and(|caller| caller.user_id == user_id)
            }) else {
                return false;
            };
            Arc::make_mut(page).listings[idx].calling_user = None;
            true
        });
        if changed {
            tracing::debug!(kind = %self.kind(), %user_id, "released reservation of disconnected operator");
        }
        changed
    }

    /// Drop a listing from the working queue (saved to the CRM or confirmed
    /// duplicate). It only comes back through a fresh fetch.
    ///
    /// The page total is left untouched.
    pub fn remove_by_id(&self, real_estate_id: &str) -> bool {
        self.inner.state.send_if_modified(|page| {
            let Some(idx) = page.position(real_estate_id) else {
                return false;
            };
            Arc::make_mut(page).listings.remove(idx);
            true
        })
    }

    pub fn change_status(&self, real_estate_id: &str, status: &str) -> bool {
        self.update_listing(real_estate_id, |listing| {
            if listing.status.as_deref() == Some(status) {
                return false;
            }
            listing.status = Some(status.to_string());
            true
        })
    }

    /// Append a comment to a listing's loaded comments. A comment whose id is
    /// already present is ignored. The counter is not touched; see
    /// [`increment_comment_count`](Self::increment_comment_count).
    pub fn add_comment(&self, real_estate_id: &str, comment: Comment) -> bool {
        self.update_listing(real_estate_id, |listing| {
            if listing.comments.iter().any(|c| c.id == comment.id) {
                return false;
            }
            listing.comments.push(comment);
            true
        })
    }

    /// Bump the comment counter by exactly one.
    pub fn increment_comment_count(&self, real_estate_id: &str) -> bool {
        self.update_listing(real_estate_id, |listing| {
            listing.counts.comments = listing.counts.comments.saturating_add(1);
            true
        })
    }

    pub fn set_favourite(&self, real_estate_id: &str, favourite: bool) -> bool {
        self.update_listing(real_estate_id, |listing| {
            if listing.is_favourite == favourite {
                return false;
            }
            listing.is_favourite = favourite;
            true
        })
    }

    /// Replace the page with a fresh fetch.
    ///
    /// Issuing a fetch takes a ticket; when the response arrives it is only
    /// applied if no newer fetch was issued in the meantime, so the last
    /// *issued* request wins regardless of resolution order. The count is
    /// kept when the filter is unchanged and reset otherwise.
    ///
    /// # Arguments
    ///
    /// * `api` - The listing API.
    /// * `filter` - Filter for the new page.
    /// * `page` - 1-based page number.
    ///
    /// # Returns
    ///
    /// Whether the result was applied or discarded as stale.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] from the request. The page is left as it was.
    pub async fn fetch_data(
        &self,
        api: &dyn ListingApi,
        filter: Filter,
        page: u32,
    ) -> Result<FetchOutcome, ApiError> {
        let ticket = self.inner.page_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let listings = api.fetch_page(self.kind(), &filter, page).await?;

        if self.inner.page_generation.load(Ordering::SeqCst) != ticket {
            tracing::debug!(kind = %self.kind(), page, "discarding stale page fetch");
            return Ok(FetchOutcome::Stale);
        }

        tracing::debug!(kind = %self.kind(), page, count = listings.len(), "page replaced");
        self.inner.state.send_modify(|current| {
            let total = if current.filter == filter {
                current.total
            } else {
                None
            };
            *current = Arc::new(ListingPage {
                listings,
                page,
                filter,
                total,
            });
        });
        Ok(FetchOutcome::Applied)
    }

    /// Count the listings matching `filter` and store the total.
    ///
    /// Same ticketing as [`fetch_data`](Self::fetch_data). A count for a
    /// filter other than the one currently shown is discarded as stale.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] from the request.
    pub async fn fetch_count(
        &self,
        api: &dyn ListingApi,
        filter: &Filter,
    ) -> Result<FetchOutcome, ApiError> {
        let ticket = self.inner.count_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let total = api.fetch_count(self.kind(), filter).await?;

        if self.inner.count_generation.load(Ordering::SeqCst) != ticket {
            return Ok(FetchOutcome::Stale);
        }
        let applied = self.inner.state.send_if_modified(|current| {
            if current.filter != *filter {
                return false;
            }
            if current.total != Some(total) {
                Arc::make_mut(current).total = Some(total);
            }
            true
        });
        Ok(if applied {
            FetchOutcome::Applied
        } else {
            FetchOutcome::Stale
        })
    }

    /// Pick up listings that appeared since the page was loaded.
    ///
    /// Asks for listings newer than the newest one on the page and prepends
    /// those not already present. Only the first page is refreshed; on any
    /// other page this returns `Ok(0)` without a request. If a page fetch is
    /// issued while this request is in flight, the result is discarded.
    ///
    /// # Returns
    ///
    /// How many listings were added.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] from the request.
    pub async fn fetch_new_data(&self, api: &dyn ListingApi) -> Result<usize, ApiError> {
        let ticket = self.inner.page_generation.load(Ordering::SeqCst);
        let (filter, newest) = {
            let page = self.inner.state.borrow();
            if page.page != 1 {
                return Ok(0);
            }
            (page.filter.clone(), page.listings.first().map(|l| l.id.clone()))
        };

        let fresh = api
            .fetch_newer(self.kind(), &filter, newest.as_deref())
            .await?;

        if self.inner.page_generation.load(Ordering::SeqCst) != ticket {
            tracing::debug!(kind = %self.kind(), "discarding new listings for a replaced page");
            return Ok(0);
        }

        let mut added = 0;
        self.inner.state.send_if_modified(|page| {
            let new: Vec<Listing> = fresh
                .into_iter()
                .filter(|l| page.position(&l.id).is_none())
                .collect();
            if new.is_empty() {
                return false;
            }
            added = new.len();
            let page = Arc::make_mut(page);
            let mut merged = new;
            merged.append(&mut page.listings);
            page.listings = merged;
            true
        });
        if added > 0 {
            tracing::info!(kind = %self.kind(), added, "new listings arrived");
        }
        Ok(added)
    }
}
