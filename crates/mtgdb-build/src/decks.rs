//! Preconstructed deck expansion.
//!
//! Deck lists arrive as flat rows `(deck, board, uuid, count, finish)`;
//! grouping by deck and board rebuilds the wire shape. Boards keep their
//! source order; decks sort by name.

use mtgdb_common::Result;
use polars::prelude::*;
use std::collections::BTreeMap;

use crate::assemble::model::{Deck, DeckCard};
use crate::cache::SourceCache;
use crate::pipeline::util::{i64_col, str_col_opt};

pub fn decks_for_set(cache: &SourceCache, set_code: &str) -> Result<Vec<Deck>> {
    let df = cache.deck_lists().collect()?;
    if df.height() == 0 {
        return Ok(Vec::new());
    }

    let set_codes = str_col_opt(&df, "set_code");
    let names = str_col_opt(&df, "deck_name");
    let codes = str_col_opt(&df, "deck_code");
    let types = str_col_opt(&df, "deck_type");
    let release_dates = str_col_opt(&df, "release_date");
    let boards = str_col_opt(&df, "board");
    let uuids = str_col_opt(&df, "card_uuid");
    let counts = i64_col(&df, "count");
    let finishes = str_col_opt(&df, "finish");

    let mut decks: BTreeMap<String, Deck> = BTreeMap::new();
    for i in 0..df.height() {
        if set_codes[i].as_deref().map(str::to_uppercase).as_deref() != Some(set_code) {
            continue;
        }
        let Some(name) = names[i].as_deref() else {
            continue;
        };
        let deck = decks.entry(name.to_string()).or_insert_with(|| Deck {
            code: codes[i].clone().unwrap_or_else(|| set_code.to_string()),
            name: name.to_string(),
            release_date: release_dates[i].clone(),
            deck_type: types[i].clone().unwrap_or_default(),
            ..Default::default()
        });

        let Some(uuid) = uuids[i].as_deref() else {
            continue;
        };
        let card = DeckCard {
            count: counts[i].unwrap_or(1),
            finish: finishes[i].clone().unwrap_or_else(|| "nonfoil".to_string()),
            uuid: uuid.to_string(),
        };
        match boards[i].as_deref().unwrap_or("mainBoard") {
            "commander" => deck.commander.push(card),
            "displayCommander" | "display_commander" => deck.display_commander.push(card),
            "sideBoard" | "side_board" => deck.side_board.push(card),
            "tokens" => deck.tokens.push(card),
            "planes" => deck.planes.push(card),
            "schemes" => deck.schemes.push(card),
            _ => deck.main_board.push(card),
        }
    }

    Ok(decks.into_values().collect())
}

/// Scryfall ids referenced by the requested decks, for deck-only builds.
pub fn deck_face_filter(cache: &SourceCache, deck_names: &[String]) -> Result<Vec<String>> {
    let df = cache.deck_lists().collect()?;
    if df.height() == 0 {
        return Ok(Vec::new());
    }
    let names = str_col_opt(&df, "deck_name");
    let uuids = str_col_opt(&df, "card_uuid");
    let mut out: Vec<String> = (0..df.height())
        .filter(|&i| {
            names[i]
                .as_deref()
                .map(|n| deck_names.iter().any(|d| d == n))
                .unwrap_or(false)
        })
        .filter_map(|i| uuids[i].clone())
        .collect();
    out.sort();
    out.dedup();
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cache::registry::SourceKind;

    #[test]
    fn boards_group_correctly() {
        let lists = df!(
            "deck_name" => ["Evasive Maneuvers", "Evasive Maneuvers", "Evasive Maneuvers"],
            "deck_code" => ["C13", "C13", "C13"],
            "set_code" => ["C13", "C13", "C13"],
            "release_date" => ["2013-11-01", "2013-11-01", "2013-11-01"],
            "deck_type" => ["Commander Deck", "Commander Deck", "Commander Deck"],
            "board" => ["commander", "mainBoard", "mainBoard"],
            "card_uuid" => ["u-cmd", "u-1", "u-2"],
            "count" => [1i64, 1, 2],
            "finish" => ["nonfoil", "nonfoil", "nonfoil"],
        )
        .unwrap();
        let mut frames = std::collections::HashMap::new();
        frames.insert(SourceKind::DeckLists, lists);
        let cache = crate::cache::SourceCache::from_frames(frames);

        let decks = decks_for_set(&cache, "C13").unwrap();
        assert_eq!(decks.len(), 1);
        assert_eq!(decks[0].commander.len(), 1);
        assert_eq!(decks[0].main_board.len(), 2);
        assert_eq!(decks[0].main_board[1].count, 2);
    }
}
