//! Thin HTTP transports for the price providers.
//!
//! The price engine treats these as opaque: each returns tabular frames in
//! the declared schema, and everything interesting (normalization,
//! checkpointing, pacing, UUID fan-out) lives in `mtgdb-prices`.

use async_trait::async_trait;
use mtgdb_common::{MtgdbError, Result};
use mtgdb_prices::providers::{
    cardhoarder::CardhoarderFeed, cardkingdom::CardkingdomFeed, cardmarket::CardmarketFeed,
    manapool::ManapoolFeed, tcgplayer::TcgplayerFeed,
};
use polars::prelude::*;
use std::io::Cursor;
use std::time::Duration;

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .user_agent(concat!("mtgdb/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| MtgdbError::config("failed to build HTTP client", e.to_string()))
}

async fn get_text(client: &reqwest::Client, url: &str) -> Result<String> {
    client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| MtgdbError::source_fetch("price feed", url, e.to_string()))?
        .text()
        .await
        .map_err(|e| MtgdbError::source_fetch("price feed", url, e.to_string()))
}

async fn get_json_frame(client: &reqwest::Client, url: &str) -> Result<DataFrame> {
    let body = get_text(client, url).await?;
    JsonReader::new(Cursor::new(body.into_bytes()))
        .with_json_format(JsonFormat::Json)
        .finish()
        .map_err(MtgdbError::from)
}

pub struct HttpTcgplayerFeed {
    client: reqwest::Client,
    base: String,
}

impl HttpTcgplayerFeed {
    pub fn new(base: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base: base.into(),
        })
    }
}

#[async_trait]
impl TcgplayerFeed for HttpTcgplayerFeed {
    async fn set_groups(&self) -> Result<Vec<String>> {
        let df = get_json_frame(&self.client, &format!("{}/groups", self.base)).await?;
        let ids = df
            .column("group_id")
            .map_err(MtgdbError::from)?
            .cast(&DataType::String)
            .map_err(MtgdbError::from)?;
        let ids = ids.str().map_err(MtgdbError::from)?;
        Ok(ids.into_iter().flatten().map(str::to_string).collect())
    }

    async fn group_prices(&self, group_id: &str) -> Result<DataFrame> {
        get_json_frame(&self.client, &format!("{}/{group_id}/prices", self.base)).await
    }
}

pub struct HttpCardhoarderFeed {
    client: reqwest::Client,
    base: String,
    token: String,
}

impl HttpCardhoarderFeed {
    pub fn new(base: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base: base.into(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl CardhoarderFeed for HttpCardhoarderFeed {
    async fn normal_tsv(&self) -> Result<String> {
        get_text(
            &self.client,
            &format!("{}/affiliates/pricefile/{}", self.base, self.token),
        )
        .await
    }

    async fn foil_tsv(&self) -> Result<String> {
        get_text(
            &self.client,
            &format!("{}/affiliates/pricefile/{}?foil=1", self.base, self.token),
        )
        .await
    }
}

pub struct HttpManapoolFeed {
    client: reqwest::Client,
    base: String,
}

impl HttpManapoolFeed {
    pub fn new(base: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base: base.into(),
        })
    }
}

#[async_trait]
impl ManapoolFeed for HttpManapoolFeed {
    async fn bulk_prices(&self) -> Result<DataFrame> {
        get_json_frame(&self.client, &format!("{}/prices", self.base)).await
    }
}

pub struct HttpCardmarketFeed {
    client: reqwest::Client,
    base: String,
}

impl HttpCardmarketFeed {
    pub fn new(base: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base: base.into(),
        })
    }
}

#[async_trait]
impl CardmarketFeed for HttpCardmarketFeed {
    async fn pages(&self) -> Result<Vec<String>> {
        let df = get_json_frame(&self.client, &format!("{}/pages", self.base)).await?;
        let pages = df.column("page").map_err(MtgdbError::from)?;
        let pages = pages.str().map_err(MtgdbError::from)?;
        Ok(pages.into_iter().flatten().map(str::to_string).collect())
    }

    async fn page_prices(&self, page: &str) -> Result<DataFrame> {
        get_json_frame(&self.client, &format!("{}/prices/{page}", self.base)).await
    }
}

pub struct HttpCardkingdomFeed {
    client: reqwest::Client,
    base: String,
}

impl HttpCardkingdomFeed {
    pub fn new(base: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base: base.into(),
        })
    }
}

#[async_trait]
impl CardkingdomFeed for HttpCardkingdomFeed {
    async fn inventory(&self) -> Result<DataFrame> {
        get_json_frame(&self.client, &format!("{}/pricelist", self.base)).await
    }
}
