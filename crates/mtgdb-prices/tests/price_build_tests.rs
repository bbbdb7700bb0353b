//! Price engine integration tests with stub provider transports.

use async_trait::async_trait;
use mtgdb_build::report::BuildReport;
use mtgdb_build::BuildConfig;
use mtgdb_common::Result;
use mtgdb_prices::archive;
use mtgdb_prices::providers::cardmarket::{CardmarketFeed, CardmarketProvider};
use mtgdb_prices::providers::tcgplayer::{TcgplayerFeed, TcgplayerProvider};
use mtgdb_prices::providers::ProviderSet;
use mtgdb_prices::schema::{frame_to_rows, rows_to_frame, PriceRow};
use mtgdb_prices::writers;
use mtgdb_prices::PriceBuilder;
use mtgdb_common::types::{Finish, PriceSource, PriceType};
use polars::prelude::*;
use std::sync::Arc;

struct StubTcgFeed;

#[async_trait]
impl TcgplayerFeed for StubTcgFeed {
    async fn set_groups(&self) -> Result<Vec<String>> {
        Ok(vec!["g1".to_string()])
    }

    async fn group_prices(&self, _group_id: &str) -> Result<DataFrame> {
        Ok(df!(
            "product_id" => ["100"],
            "sub_type" => ["Normal"],
            "market_price" => [1.50f64],
        )
        .unwrap())
    }
}

struct StubMcmFeed;

#[async_trait]
impl CardmarketFeed for StubMcmFeed {
    async fn pages(&self) -> Result<Vec<String>> {
        Ok(vec!["p1".to_string()])
    }

    async fn page_prices(&self, _page: &str) -> Result<DataFrame> {
        Ok(df!(
            "scryfall_id" => ["sf-1"],
            "finish" => ["normal"],
            "retail_eur" => [Some(1.20f64)],
            "buylist_eur" => [Some(0.90f64)],
        )
        .unwrap())
    }
}

fn write_bridges(cache_dir: &std::path::Path) {
    // The pipeline normally persists these; tests write them directly.
    std::fs::create_dir_all(cache_dir.join("sources")).unwrap();
    let write = |file: &str, id_col: &str, id: &str, uuid: &str| {
        let mut df = df!(
            id_col => [id],
            "uuid" => [uuid],
        )
        .unwrap();
        let path = cache_dir.join("sources").join(format!("{file}.parquet"));
        let f = std::fs::File::create(path).unwrap();
        ParquetWriter::new(f).finish(&mut df).unwrap();
    };
    write("bridge_tcgplayer", "tcgplayerProductId", "100", "a-uuid-1");
    write("bridge_tcgplayer_etched", "tcgplayerEtchedProductId", "900", "a-uuid-9");
    write("bridge_mtgo", "mtgoId", "555", "a-uuid-1");
    write("bridge_scryfall", "scryfallId", "sf-1", "a-uuid-1");
}

#[tokio::test]
async fn single_date_build_matches_contract() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = BuildConfig::new();
    config.cache_path = dir.path().join("cache");
    config.output_path = dir.path().join("out");
    write_bridges(&config.cache_path);

    let mut providers = ProviderSet::empty();
    providers.tcgplayer = Some(TcgplayerProvider::new(Arc::new(StubTcgFeed)));
    providers.cardmarket = Some(CardmarketProvider::new(Arc::new(StubMcmFeed)));

    let builder = PriceBuilder::new(config.clone()).with_today("2024-02-07");
    builder
        .build(providers, Arc::new(BuildReport::new()))
        .await
        .unwrap();

    let raw = std::fs::read_to_string(config.output_path.join("AllPricesToday.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let u1 = &parsed["data"]["a-uuid-1"]["paper"];
    assert_eq!(u1["tcgplayer"]["retail"]["normal"]["2024-02-07"], 1.50);
    assert_eq!(u1["cardmarket"]["retail"]["normal"]["2024-02-07"], 1.20);
    assert_eq!(u1["cardmarket"]["buylist"]["normal"]["2024-02-07"], 0.90);
    assert_eq!(u1["cardmarket"]["currency"], "EUR");
    assert_eq!(u1["tcgplayer"]["currency"], "USD");
}

#[tokio::test]
async fn provider_failure_is_isolated() {
    struct FailingFeed;

    #[async_trait]
    impl TcgplayerFeed for FailingFeed {
        async fn set_groups(&self) -> Result<Vec<String>> {
            Err(mtgdb_common::MtgdbError::source_fetch(
                "tcgplayer",
                "https://example.invalid",
                "503",
            ))
        }

        async fn group_prices(&self, _group_id: &str) -> Result<DataFrame> {
            unreachable!("group listing already failed")
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let mut config = BuildConfig::new();
    config.cache_path = dir.path().join("cache");
    config.output_path = dir.path().join("out");
    write_bridges(&config.cache_path);

    let mut providers = ProviderSet::empty();
    providers.tcgplayer = Some(TcgplayerProvider::new(Arc::new(FailingFeed)));
    providers.cardmarket = Some(CardmarketProvider::new(Arc::new(StubMcmFeed)));

    // One provider down: the build still succeeds with the other's data.
    let builder = PriceBuilder::new(config.clone()).with_today("2024-02-07");
    builder
        .build(providers, Arc::new(BuildReport::new()))
        .await
        .unwrap();

    let raw = std::fs::read_to_string(config.output_path.join("AllPricesToday.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(parsed["data"]["a-uuid-1"]["paper"]["cardmarket"].is_object());
    assert!(parsed["data"]["a-uuid-1"]["paper"]["tcgplayer"].is_null());
}

fn synth_rows(uuids: usize, days: usize, providers: usize) -> Vec<PriceRow> {
    let mut rows = Vec::new();
    for u in 0..uuids {
        // Spread across hex prefixes so every streaming group is exercised.
        let uuid = format!("{:x}{:031x}", u % 16, u);
        for d in 0..days {
            for p in 0..providers {
                rows.push(PriceRow {
                    uuid: uuid.clone(),
                    date: format!("2024-01-{:02}", d + 1),
                    source: PriceSource::Paper,
                    provider: format!("provider{p}"),
                    price_type: PriceType::Retail,
                    finish: if p % 2 == 0 { Finish::Normal } else { Finish::Foil },
                    price: (u + d + p) as f64 / 100.0,
                    currency: "USD".to_string(),
                });
            }
        }
    }
    rows
}

#[test]
fn streaming_snapshot_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("AllPrices.json");

    let rows = synth_rows(400, 5, 3);
    let df = rows_to_frame(&rows).unwrap();
    writers::stream_prices_json(df.clone().lazy(), &path, "2024-02-07", "5.3.0").unwrap();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let data = parsed["data"].as_object().unwrap();
    assert_eq!(data.len(), 400);

    // Every flat row survives the nested fold.
    let total_points: usize = data
        .values()
        .map(|sources| {
            sources
                .as_object()
                .unwrap()
                .values()
                .flat_map(|providers| providers.as_object().unwrap().values())
                .map(|provider| {
                    ["retail", "buylist"]
                        .iter()
                        .filter_map(|pt| provider.get(*pt))
                        .flat_map(|pt| pt.as_object().unwrap().values())
                        .map(|finish| finish.as_object().unwrap().len())
                        .sum::<usize>()
                })
                .sum::<usize>()
        })
        .sum();
    assert_eq!(total_points, rows.len());
}

#[test]
fn partition_write_then_filtered_read_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    let rows = synth_rows(50, 1, 2);
    let df = rows_to_frame(&rows).unwrap();
    archive::save_partition(dir.path(), "2024-01-01", &df).unwrap();

    let back = archive::load_window(dir.path(), "2024-01-02", 90)
        .unwrap()
        .filter(col("date").eq(lit("2024-01-01")))
        .collect()
        .unwrap();
    assert_eq!(back.height(), df.height());
    assert_eq!(frame_to_rows(&back).unwrap().len(), rows.len());
}
