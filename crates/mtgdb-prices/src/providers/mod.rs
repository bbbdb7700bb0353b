//! Price providers.
//!
//! Transport is injected: each provider declares a small feed trait whose
//! production impl wraps HTTP and whose test impl returns fixture frames.
//! Normalization to the flat schema, id-to-UUID fan-out, checkpointing, and
//! rate-limit pacing live here. Providers run as parallel tasks; one that
//! errors surfaces an empty frame with a logged warning, and the overall
//! build succeeds if any provider returned data.

pub mod cardhoarder;
pub mod cardkingdom;
pub mod cardmarket;
pub mod manapool;
pub mod tcgplayer;

use mtgdb_build::report::BuildReport;
use mtgdb_common::Result;
use polars::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::info;

use crate::context::PriceContext;
use crate::schema;

/// A provider ready to run: name plus its fetch future factory.
pub struct ProviderSet {
    pub tcgplayer: Option<tcgplayer::TcgplayerProvider>,
    pub cardhoarder: Option<cardhoarder::CardhoarderProvider>,
    pub manapool: Option<manapool::ManapoolProvider>,
    pub cardmarket: Option<cardmarket::CardmarketProvider>,
    pub cardkingdom: Option<cardkingdom::CardkingdomProvider>,
}

impl ProviderSet {
    pub fn empty() -> Self {
        Self {
            tcgplayer: None,
            cardhoarder: None,
            manapool: None,
            cardmarket: None,
            cardkingdom: None,
        }
    }
}

/// Fetch today's prices from every configured provider, in parallel, and
/// concatenate the normalized frames.
pub async fn fetch_all(
    providers: ProviderSet,
    ctx: Arc<PriceContext>,
    today: String,
    cache_dir: PathBuf,
    report: Arc<BuildReport>,
) -> Result<DataFrame> {
    let mut tasks: JoinSet<(String, Result<DataFrame>)> = JoinSet::new();

    if let Some(p) = providers.tcgplayer {
        let ctx = Arc::clone(&ctx);
        let today = today.clone();
        let cache_dir = cache_dir.clone();
        tasks.spawn(async move {
            ("tcgplayer".to_string(), p.fetch(&ctx, &today, &cache_dir).await)
        });
    }
    if let Some(p) = providers.cardhoarder {
        let ctx = Arc::clone(&ctx);
        let today = today.clone();
        tasks.spawn(async move { ("cardhoarder".to_string(), p.fetch(&ctx, &today).await) });
    }
    if let Some(p) = providers.manapool {
        let ctx = Arc::clone(&ctx);
        let today = today.clone();
        tasks.spawn(async move { ("manapool".to_string(), p.fetch(&ctx, &today).await) });
    }
    if let Some(p) = providers.cardmarket {
        let ctx = Arc::clone(&ctx);
        let today = today.clone();
        tasks.spawn(async move { ("cardmarket".to_string(), p.fetch(&ctx, &today).await) });
    }
    if let Some(p) = providers.cardkingdom {
        let ctx = Arc::clone(&ctx);
        let today = today.clone();
        let cache_dir = cache_dir.clone();
        tasks.spawn(async move {
            (
                "cardkingdom".to_string(),
                p.fetch(&ctx, &today, &cache_dir).await,
            )
        });
    }

    let mut frames: Vec<DataFrame> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let Ok((name, result)) = joined else {
            continue;
        };
        match result {
            Ok(df) if df.height() > 0 => {
                info!(provider = name, rows = df.height(), "provider returned prices");
                frames.push(df);
            }
            Ok(_) => report.record_skipped_provider(&name, "returned zero rows"),
            Err(e) => report.record_skipped_provider(&name, &e.to_string()),
        }
    }

    if frames.is_empty() {
        return Ok(schema::empty_frame());
    }
    let mut out = frames.remove(0);
    for df in frames {
        out.vstack_mut(&df).map_err(mtgdb_common::MtgdbError::from)?;
    }
    Ok(out)
}
