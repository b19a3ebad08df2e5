//! Self-contained walk through a desk: open it, bind the flat table to the
//! push channel, and feed it the frames a live connection would deliver.
//!
//! Run with: `cargo run --example desk_demo`
//!
//! No server is needed; listings come from an in-memory API.

use std::sync::Arc;

use async_trait::async_trait;
use realty_desk::{
    ApiError, CurrentUser, Desk, DeskConfig, Filter, Listing, ListingApi, RealEstateKind,
    decode_push_frame,
};

/// Serves the same three flats for every request.
struct DemoApi;

#[async_trait]
impl ListingApi for DemoApi {
    async fn fetch_page(
        &self,
        _kind: RealEstateKind,
        _filter: &Filter,
        _page: u32,
    ) -> Result<Vec<Listing>, ApiError> {
        Ok(["flat-1", "flat-2", "flat-3"].map(Listing::new).to_vec())
    }

    async fn fetch_count(&self, _kind: RealEstateKind, _filter: &Filter) -> Result<u64, ApiError> {
        Ok(3)
    }

    async fn fetch_newer(
        &self,
        _kind: RealEstateKind,
        _filter: &Filter,
        _after: Option<&str>,
    ) -> Result<Vec<Listing>, ApiError> {
        Ok(Vec::new())
    }

    async fn set_favourite(
        &self,
        _kind: RealEstateKind,
        _id: &str,
        _favourite: bool,
    ) -> Result<(), ApiError> {
        Ok(())
    }
}

const FRAMES: [&str; 3] = [
    r#"{"event":"CALL_STARTED","data":{"realEstateId":"flat-1","userId":"u2","fullName":"Other Operator","avatarUrl":""}}"#,
    r#"{"event":"COMMENT_ADDED","data":{"realEstateId":"flat-2","userId":"u2"}}"#,
    r#"{"event":"REAL_ESTATE_SAVED","data":{"realEstateId":"flat-3","userId":"u2"}}"#,
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let session_dir = tempfile::tempdir()?;
    let desk = Desk::builder()
        .config(DeskConfig {
            session_path: session_dir.path().join("session.json"),
            ..DeskConfig::default()
        })
        .api(Arc::new(DemoApi))
        .open()?;

    desk.sign_in(
        "demo-token",
        CurrentUser {
            user_id: "u1".into(),
            full_name: "Demo Operator".into(),
        },
    )?;
    let binding = desk.bind(RealEstateKind::Flat)?;
    desk.load_page(RealEstateKind::Flat, 1).await?;

    for frame in FRAMES {
        let event = decode_push_frame(frame).ok_or("malformed frame")?;
        desk.channel().dispatch(&event);
    }

    let page = desk.store(RealEstateKind::Flat).snapshot();
    for listing in &page.listings {
        let caller = listing
            .calling_user
            .as_ref()
            .map(|c| c.full_name.as_str())
            .unwrap_or("-");
        println!(
            "{:<8} comments = {}  on call with {}",
            listing.id, listing.counts.comments, caller
        );
    }
    println!("total = {:?}", page.total);

    let notice = binding.banner().ok_or("no notice raised")?;
    println!("notice: {:?} by {:?} on {}", notice.kind, notice.actor, notice.real_estate_id);

    assert_eq!(page.listings.len(), 2);
    assert!(page.get("flat-1").is_some_and(|l| l.is_reserved()));
    println!("all assertions passed");
    Ok(())
}
