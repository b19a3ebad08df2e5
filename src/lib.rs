//! Client core for a real-estate lead desk: per-kind listing stores kept in
//! sync with other operators through a server push channel.

mod auth;
pub use auth::BearerAuth;
mod binding;
pub use binding::{Actor, Notice, NoticeKind, ViewBinding};
mod channel;
pub use channel::{Handler, PushChannel, Subscription};
mod client;
pub use client::{Filter, ListingApi, RestClient, check_status};
mod config;
mod desk;
mod error;
mod event;
mod listing;
mod live;
mod payment;
mod poller;
mod session;
mod store;

pub use config::DeskConfig;
pub use desk::{Desk, DeskBuilder};
pub use error::{
    ApiError, ChannelError, ConfigError, DeskError, ErrorDisposition, SessionError,
    handle_api_error,
};
pub use event::{
    CallEnded, CallStarted, ClientDisconnected, CommentAdded, EventKind, ListingActed,
    PaymentCompleted, PushEvent, StatusChanged, decode_push_frame, encode_push_frame,
};
pub use listing::{
    CallingUser, Comment, Duplicate, DuplicateGrade, Listing, ListingCounts, RealEstateKind,
};
pub use live::{ChannelConfig, ConnectionHandle};
pub use payment::{PaymentState, PaymentWatch};
pub use poller::{DEFAULT_POLL_INTERVAL, Poller};
pub use session::{CurrentUser, SessionState, SessionStore};
pub use store::{FetchOutcome, ListingPage, ListingStore};
