//! Headless desk watcher.
//!
//! Signs in from the persisted session, opens the push channel, loads the
//! first page of every listing kind, and logs reservations, removals and
//! new arrivals until interrupted.
//!
//! ```text
//! REALTY_DESK_API_URL=https://desk.example.com \
//! REALTY_DESK_PUSH_URL=wss://desk.example.com/ws \
//! RUST_LOG=realty_desk=debug desk-watch
//! ```

use anyhow::Context;
use realty_desk::{Desk, DeskConfig, ListingStore, RealEstateKind};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DeskConfig::from_env().context("reading configuration")?;
    let desk = Desk::builder()
        .config(config)
        .open()
        .context("opening desk")?;

    let Some(user) = desk.session().current_user() else {
        anyhow::bail!(
            "no operator signed in; session file {} is empty",
            desk.session().path().display()
        );
    };
    tracing::info!(user_id = %user.user_id, name = %user.full_name, "signed in");

    let connection = desk.start_live().await.context("starting push channel")?;

    let mut bindings = Vec::new();
    let mut pollers = Vec::new();
    for kind in RealEstateKind::ALL {
        let binding = desk.bind(kind)?;
        tokio::spawn(log_banners(kind, binding.subscribe_banner()));
        tokio::spawn(log_page(desk.store(kind).clone()));

        if let Err(e) = desk.load_page(kind, 1).await {
            tracing::error!(%kind, error = %e, "initial load failed");
            if desk.session().token().is_none() {
                break;
            }
        }
        pollers.push(desk.start_polling(kind));
        bindings.push(binding);
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    tracing::info!(connected = connection.is_connected(), "shutting down");

    for poller in pollers {
        poller.stop().await;
    }
    drop(bindings);
    desk.shutdown().await?;
    Ok(())
}

async fn log_banners(kind: RealEstateKind, mut rx: watch::Receiver<Option<realty_desk::Notice>>) {
    while rx.changed().await.is_ok() {
        let notice = rx.borrow_and_update().clone();
        if let Some(notice) = notice {
            tracing::info!(
                %kind,
                real_estate_id = %notice.real_estate_id,
                actor = ?notice.actor,
                notice = ?notice.kind,
                drawer_closed = notice.drawer_closed,
                "notice"
            );
        }
    }
}

async fn log_page(store: ListingStore) {
    let kind = store.kind();
    let mut rx = store.subscribe();
    while rx.changed().await.is_ok() {
        let page = rx.borrow_and_update().clone();
        let reserved: Vec<String> = page
            .listings
            .iter()
            .filter_map(|l| {
                l.calling_user
                    .as_ref()
                    .map(|c| format!("{}:{}", l.id, c.full_name))
            })
            .collect();
        tracing::info!(
            %kind,
            page = page.page,
            listings = page.listings.len(),
            total = ?page.total,
            ?reserved,
            "page updated"
        );
    }
}
