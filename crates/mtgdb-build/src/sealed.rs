//! Sealed products.
//!
//! Purchasable boxes, packs, and decks per set, with deterministic UUIDs
//! derived from the product name and purchase-URL keys matching the card
//! recipes.

use mtgdb_common::{uuid5, Result};
use polars::prelude::*;

use crate::assemble::model::{Identifiers, PurchaseUrls, SealedProduct};
use crate::cache::SourceCache;
use crate::pipeline::util::str_col_opt;

const LINKS_PREFIX: &str = "https://mtgjson.com/links/";

pub fn sealed_for_set(cache: &SourceCache, set_code: &str) -> Result<Vec<SealedProduct>> {
    let df = cache.sealed_products().collect()?;
    if df.height() == 0 {
        return Ok(Vec::new());
    }

    let set_codes = str_col_opt(&df, "set_code");
    let names = str_col_opt(&df, "name");
    let categories = str_col_opt(&df, "category");
    let subtypes = str_col_opt(&df, "subtype");
    let release_dates = str_col_opt(&df, "release_date");
    let tcg_ids = str_col_opt(&df, "tcgplayer_product_id");

    let mut out = Vec::new();
    for i in 0..df.height() {
        if set_codes[i].as_deref().map(str::to_uppercase).as_deref() != Some(set_code) {
            continue;
        }
        let Some(name) = names[i].as_deref() else {
            continue;
        };
        let uuid = uuid5::sealed_product_uuid(name);

        let purchase_urls = tcg_ids[i].as_deref().map(|tcg| PurchaseUrls {
            tcgplayer: Some(format!(
                "{LINKS_PREFIX}{}",
                uuid5::url_hash(&format!("{tcg}{uuid}"))
            )),
            ..Default::default()
        });

        out.push(SealedProduct {
            card_count: None,
            category: categories[i].clone(),
            identifiers: Identifiers {
                tcgplayer_product_id: tcg_ids[i].clone(),
                ..Default::default()
            },
            name: name.to_string(),
            purchase_urls,
            release_date: release_dates[i].clone(),
            subtype: subtypes[i].clone(),
            uuid,
        });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cache::registry::SourceKind;

    #[test]
    fn sealed_uuid_is_name_derived() {
        let products = df!(
            "name" => ["Kamigawa Neon Dynasty Bundle"],
            "set_code" => ["NEO"],
            "category" => [Some("bundle")],
            "subtype" => [Some("gift_bundle")],
            "release_date" => [Some("2022-02-18")],
            "tcgplayer_product_id" => [Some("250")],
        )
        .unwrap();
        let mut frames = std::collections::HashMap::new();
        frames.insert(SourceKind::SealedProducts, products);
        let cache = crate::cache::SourceCache::from_frames(frames);

        let sealed = sealed_for_set(&cache, "NEO").unwrap();
        assert_eq!(sealed.len(), 1);
        assert_eq!(
            sealed[0].uuid,
            uuid5::sealed_product_uuid("Kamigawa Neon Dynasty Bundle")
        );
        assert!(sealed[0].purchase_urls.as_ref().unwrap().tcgplayer.is_some());
    }
}
