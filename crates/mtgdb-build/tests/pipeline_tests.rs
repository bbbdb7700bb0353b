//! End-to-end pipeline tests over in-memory source fixtures.
//!
//! Sources are constructed as JSON payloads and parsed the same way the
//! cache parses real downloads, so nested columns (card faces, legalities)
//! take their production shapes.

#![recursion_limit = "256"]

use mtgdb_build::assemble::Assembler;
use mtgdb_build::cache::registry::SourceKind;
use mtgdb_build::cache::SourceCache;
use mtgdb_build::lookups::Lookups;
use mtgdb_build::pipeline::{build_cards, PipelineContext};
use mtgdb_build::{BuildConfig, BuildReport};
use mtgdb_common::uuid5;
use polars::prelude::*;
use std::collections::HashMap;
use std::io::Cursor;

const BOLT_SCRYFALL_ID: &str = "56ebc372-aabd-4174-a943-c7bf59e5028d";
const DELVER_SCRYFALL_ID: &str = "11bf83bb-c95b-4b4f-9a56-ce7a1816307a";

fn card(record: serde_json::Value) -> serde_json::Value {
    // Every bulk column the pipeline touches, with per-record overrides.
    let mut base = serde_json::json!({
        "id": "00000000-0000-0000-0000-000000000000",
        "oracle_id": "o-default",
        "name": "Placeholder",
        "lang": "en",
        "set": "lea",
        "set_type": "core",
        "collector_number": "1",
        "layout": "normal",
        "mana_cost": "",
        "cmc": 0.0,
        "colors": [],
        "color_identity": [],
        "type_line": "Instant",
        "oracle_text": "",
        "flavor_text": null,
        "power": null,
        "toughness": null,
        "loyalty": null,
        "defense": null,
        "artist": "Someone",
        "artist_ids": [],
        "watermark": null,
        "illustration_id": null,
        "rarity": "common",
        "border_color": "black",
        "frame": "1993",
        "frame_effects": [],
        "security_stamp": null,
        "hand_modifier": null,
        "life_modifier": null,
        "content_warning": false,
        "full_art": false,
        "digital": false,
        "oversized": false,
        "promo": false,
        "reprint": false,
        "reserved": false,
        "story_spotlight": false,
        "textless": false,
        "game_changer": false,
        "booster": true,
        "edhrec_rank": null,
        "printed_name": null,
        "printed_type_line": null,
        "printed_text": null,
        "flavor_name": null,
        "released_at": "1993-08-05",
        "promo_types": [],
        "keywords": [],
        "finishes": ["nonfoil"],
        "games": ["paper"],
        "multiverse_ids": [],
        "attraction_lights": null,
        "mtgo_id": null,
        "mtgo_foil_id": null,
        "arena_id": null,
        "tcgplayer_id": null,
        "tcgplayer_etched_id": null,
        "cardmarket_id": null,
        "card_back_id": null,
        "card_faces": null,
        "legalities": {"vintage": "legal", "standard": "not_legal"},
        "all_parts": null,
    });
    if let (Some(base_obj), Some(patch)) = (base.as_object_mut(), record.as_object()) {
        for (k, v) in patch {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}

fn face(name: &str, mana_cost: &str, type_line: &str, text: &str, power: Option<&str>, toughness: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "mana_cost": mana_cost,
        "type_line": type_line,
        "oracle_text": text,
        "flavor_text": null,
        "power": power,
        "toughness": toughness,
        "loyalty": null,
        "defense": null,
        "artist": "Someone",
        "watermark": null,
        "oracle_id": null,
        "illustration_id": null,
    })
}

fn json_frame(records: Vec<serde_json::Value>) -> DataFrame {
    let body = serde_json::to_vec(&serde_json::Value::Array(records)).unwrap();
    JsonReader::new(Cursor::new(body))
        .with_json_format(JsonFormat::Json)
        .finish()
        .unwrap()
}

fn sets_meta_frame() -> DataFrame {
    df!(
        "code" => ["lea", "isd", "emn", "ymid", "mid", "tktk", "ktk"],
        "name" => [
            "Limited Edition Alpha",
            "Innistrad",
            "Eldritch Moon",
            "Alchemy: Innistrad",
            "Innistrad: Midnight Hunt",
            "Khans of Tarkir Tokens",
            "Khans of Tarkir",
        ],
        "released_at" => [
            "1993-08-05", "2011-09-30", "2016-07-22", "2021-12-09",
            "2021-09-24", "2014-09-26", "2014-09-26",
        ],
        "set_type" => ["core", "expansion", "expansion", "alchemy", "expansion", "token", "expansion"],
        "parent_set_code" => [None::<&str>, None, None, Some("mid"), None, Some("ktk"), None],
        "block" => [None::<&str>, None, None, None, None, None, None],
        "keyrune_code" => ["LEA", "ISD", "EMN", "MID", "MID", "KTK", "KTK"],
        "mtgo_code" => [None::<&str>, None, None, None, None, None, None],
        "arena_code" => [None::<&str>, None, None, None, None, None, None],
        "tcgplayer_id" => [None::<i64>, None, None, None, None, None, None],
        "nonfoil_only" => [true, false, false, false, false, false, false],
        "foil_only" => [false, false, false, false, false, false, false],
        "digital" => [false, false, false, true, false, false, false],
    )
    .unwrap()
}

fn fixture_cache() -> SourceCache {
    let bulk = json_frame(vec![
        // Scenario 1: a plain single-faced card.
        card(serde_json::json!({
            "id": BOLT_SCRYFALL_ID,
            "oracle_id": "o-bolt",
            "name": "Lightning Bolt",
            "set": "lea",
            "collector_number": "161",
            "mana_cost": "{R}",
            "cmc": 1.0,
            "colors": ["R"],
            "color_identity": ["R"],
            "oracle_text": "Lightning Bolt deals 3 damage to any target.",
        })),
        // Scenario 2: a transform card with two faces.
        card(serde_json::json!({
            "id": DELVER_SCRYFALL_ID,
            "oracle_id": "o-delver",
            "name": "Delver of Secrets // Insectile Aberration",
            "set": "isd",
            "collector_number": "51",
            "layout": "transform",
            "mana_cost": "{U}",
            "cmc": 1.0,
            "colors": ["U"],
            "color_identity": ["U"],
            "type_line": "Creature \u{2014} Human Wizard // Creature \u{2014} Human Insect",
            "card_faces": [
                face("Delver of Secrets", "{U}", "Creature \u{2014} Human Wizard",
                     "At the beginning of your upkeep, look at the top card of your library.",
                     Some("1"), Some("1")),
                face("Insectile Aberration", "", "Creature \u{2014} Human Insect",
                     "Flying", Some("3"), Some("2")),
            ],
        })),
        // Scenario 3: the meld triplet.
        card(serde_json::json!({
            "id": "sf-bruna",
            "oracle_id": "o-bruna",
            "name": "Bruna, the Fading Light",
            "set": "emn",
            "collector_number": "15a",
            "layout": "meld",
            "mana_cost": "{5}{W}{W}",
            "cmc": 7.0,
            "colors": ["W"],
            "color_identity": ["W"],
            "type_line": "Legendary Creature \u{2014} Angel Horror",
            "power": "5",
            "toughness": "7",
        })),
        card(serde_json::json!({
            "id": "sf-gisela",
            "oracle_id": "o-gisela",
            "name": "Gisela, the Broken Blade",
            "set": "emn",
            "collector_number": "28a",
            "layout": "meld",
            "mana_cost": "{2}{W}{W}",
            "cmc": 4.0,
            "colors": ["W"],
            "color_identity": ["W"],
            "type_line": "Legendary Creature \u{2014} Angel Horror",
            "power": "4",
            "toughness": "3",
        })),
        card(serde_json::json!({
            "id": "sf-brisela",
            "oracle_id": "o-brisela",
            "name": "Brisela, Voice of Nightmares",
            "set": "emn",
            "collector_number": "15b",
            "layout": "meld",
            "mana_cost": "",
            "cmc": 11.0,
            "colors": [],
            "color_identity": ["W"],
            "type_line": "Legendary Creature \u{2014} Eldrazi Angel",
            "power": "9",
            "toughness": "10",
        })),
        // Scenario 4: a rebalanced variant and its original.
        card(serde_json::json!({
            "id": "sf-a-bolt",
            "oracle_id": "o-a-bolt",
            "name": "A-Lightning Bolt",
            "set": "ymid",
            "collector_number": "1",
            "mana_cost": "{R}",
            "cmc": 1.0,
            "colors": ["R"],
            "color_identity": ["R"],
        })),
        // Token plus the spell that creates it.
        card(serde_json::json!({
            "id": "sf-hordeling",
            "oracle_id": "o-hordeling",
            "name": "Hordeling Outburst",
            "set": "ktk",
            "collector_number": "109",
            "layout": "normal",
            "type_line": "Sorcery",
            "mana_cost": "{1}{R}{R}",
            "cmc": 3.0,
            "colors": ["R"],
            "color_identity": ["R"],
            "oracle_text": "Create three 1/1 red Goblin creature tokens.",
        })),
        card(serde_json::json!({
            "id": "sf-goblin-token",
            "oracle_id": "o-goblin-token",
            "name": "Goblin",
            "set": "tktk",
            "collector_number": "9",
            "layout": "token",
            "type_line": "Token Creature \u{2014} Goblin",
            "colors": ["R"],
            "color_identity": ["R"],
            "power": "1",
            "toughness": "1",
        })),
    ]);

    let meld = df!(
        "part_a" => ["Bruna, the Fading Light"],
        "part_b" => ["Gisela, the Broken Blade"],
        "result" => ["Brisela, Voice of Nightmares"],
    )
    .unwrap();

    let mut frames: HashMap<SourceKind, DataFrame> = HashMap::new();
    frames.insert(SourceKind::CardBulk, bulk);
    frames.insert(SourceKind::SetsMeta, sets_meta_frame());
    frames.insert(SourceKind::MeldTriplets, meld);
    SourceCache::from_frames(frames)
}

struct BuildFixture {
    config: BuildConfig,
    _dir: tempfile::TempDir,
}

fn run_pipeline(cache: &SourceCache) -> BuildFixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = BuildConfig::new();
    config.cache_path = dir.path().join("cache");
    config.output_path = dir.path().join("out");

    let lookups = Lookups::build(cache).unwrap();
    let report = BuildReport::new();
    let ctx = PipelineContext {
        cache,
        lookups: &lookups,
        config: &config,
        report: &report,
    };
    build_cards(&ctx).unwrap();
    BuildFixture { config, _dir: dir }
}

#[test]
fn single_set_build_lea() {
    let cache = fixture_cache();
    let fixture = run_pipeline(&cache);

    let report = BuildReport::new();
    let assembler = Assembler::new(&cache, &fixture.config, &report).unwrap();
    let set = assembler.set_object("LEA").unwrap();

    assert_eq!(set.code, "LEA");
    assert_eq!(set.name, "Limited Edition Alpha");
    assert_eq!(set.cards.len(), 1);
    assert!(set.tokens.is_empty());

    let bolt = &set.cards[0];
    assert_eq!(bolt.name, "Lightning Bolt");
    assert_eq!(bolt.uuid, uuid5::face_uuid(BOLT_SCRYFALL_ID, None));
    assert_eq!(
        bolt.identifiers.scryfall_id.as_deref(),
        Some(BOLT_SCRYFALL_ID)
    );
    assert_eq!(bolt.mana_value, 1.0);
    assert_eq!(bolt.colors, vec!["R"]);
    assert_eq!(bolt.legalities.get("vintage").map(String::as_str), Some("Legal"));
    assert!(!bolt.legalities.contains_key("standard"), "not_legal is dropped");
}

#[test]
fn transform_faces_link_symmetrically() {
    let cache = fixture_cache();
    let fixture = run_pipeline(&cache);

    let report = BuildReport::new();
    let assembler = Assembler::new(&cache, &fixture.config, &report).unwrap();
    let set = assembler.set_object("ISD").unwrap();

    assert_eq!(set.cards.len(), 2);
    let front = set.cards.iter().find(|c| c.side.as_deref() == Some("a")).unwrap();
    let back = set.cards.iter().find(|c| c.side.as_deref() == Some("b")).unwrap();

    assert_eq!(front.face_name.as_deref(), Some("Delver of Secrets"));
    assert_eq!(back.face_name.as_deref(), Some("Insectile Aberration"));
    assert_eq!(front.other_face_ids, vec![back.uuid.clone()]);
    assert_eq!(back.other_face_ids, vec![front.uuid.clone()]);
    assert!(front.variations.is_empty());
    // Distinct stable UUIDs per side.
    assert_eq!(front.uuid, uuid5::face_uuid(DELVER_SCRYFALL_ID, Some("a")));
    assert_eq!(back.uuid, uuid5::face_uuid(DELVER_SCRYFALL_ID, Some("b")));
}

#[test]
fn meld_triplet_sides_and_parts() {
    let cache = fixture_cache();
    let fixture = run_pipeline(&cache);

    let report = BuildReport::new();
    let assembler = Assembler::new(&cache, &fixture.config, &report).unwrap();
    let set = assembler.set_object("EMN").unwrap();
    assert_eq!(set.cards.len(), 3);

    let by_name = |name: &str| set.cards.iter().find(|c| c.name == name).unwrap();
    let bruna = by_name("Bruna, the Fading Light");
    let gisela = by_name("Gisela, the Broken Blade");
    let brisela = by_name("Brisela, Voice of Nightmares");

    assert_eq!(bruna.side.as_deref(), Some("a"));
    assert_eq!(gisela.side.as_deref(), Some("a"));
    assert_eq!(brisela.side.as_deref(), Some("b"));
    assert_eq!(
        brisela.card_parts,
        vec!["Bruna, the Fading Light", "Gisela, the Broken Blade"]
    );
}

#[test]
fn rebalanced_linkage_is_symmetric() {
    let cache = fixture_cache();
    let fixture = run_pipeline(&cache);

    let report = BuildReport::new();
    let assembler = Assembler::new(&cache, &fixture.config, &report).unwrap();

    let alchemy = assembler.set_object("YMID").unwrap();
    let rebalanced = &alchemy.cards[0];
    assert_eq!(rebalanced.name, "A-Lightning Bolt");

    let lea = assembler.set_object("LEA").unwrap();
    let original = &lea.cards[0];

    assert_eq!(rebalanced.original_printings, vec![original.uuid.clone()]);
    assert_eq!(original.rebalanced_printings, vec![rebalanced.uuid.clone()]);
}

#[test]
fn token_only_set_emits_tokens_with_metadata() {
    let cache = fixture_cache();
    let fixture = run_pipeline(&cache);

    let report = BuildReport::new();
    let assembler = Assembler::new(&cache, &fixture.config, &report).unwrap();
    let set = assembler.set_object("TKTK").unwrap();

    assert!(set.cards.is_empty());
    assert_eq!(set.tokens.len(), 1);
    assert_eq!(set.name, "Khans of Tarkir Tokens");
    let token = &set.tokens[0];
    assert_eq!(token.name, "Goblin");
    assert_eq!(token.reverse_related, Vec::<String>::new());
}

#[test]
fn spell_links_to_created_token() {
    let cache = fixture_cache();
    let fixture = run_pipeline(&cache);

    let report = BuildReport::new();
    let assembler = Assembler::new(&cache, &fixture.config, &report).unwrap();
    let ktk = assembler.set_object("KTK").unwrap();
    let spell = &ktk.cards[0];
    assert_eq!(spell.name, "Hordeling Outburst");
    assert_eq!(spell.token_ids.len(), 1);
}

#[test]
fn invariants_hold_across_the_build() {
    let cache = fixture_cache();
    let fixture = run_pipeline(&cache);

    let report = BuildReport::new();
    let assembler = Assembler::new(&cache, &fixture.config, &report).unwrap();

    let mut seen_uuids = std::collections::HashSet::new();
    for code in assembler.set_codes().unwrap() {
        let set = assembler.set_object(&code).unwrap();
        assert!(set.total_set_size >= set.base_set_size);
        for card in set.cards.iter().chain(set.tokens.iter()) {
            // Invariant 1: valid v5 UUID, globally unique.
            let parsed = uuid::Uuid::parse_str(&card.uuid).unwrap();
            assert_eq!(parsed.get_version_num(), 5, "{} is not v5", card.name);
            assert!(seen_uuids.insert(card.uuid.clone()), "duplicate uuid");

            // Invariant 3: colors subset of color identity, both ordered.
            for color in &card.colors {
                assert!(
                    card.color_identity.contains(color),
                    "{}: colors not within identity",
                    card.name
                );
            }

            // Invariant 4: finish ordering.
            let order = |f: &str| match f {
                "nonfoil" => 0,
                "foil" => 1,
                "etched" => 2,
                _ => 3,
            };
            let ordinals: Vec<u8> = card.finishes.iter().map(|f| order(f)).collect();
            let mut sorted = ordinals.clone();
            sorted.sort();
            assert_eq!(ordinals, sorted);
        }
    }
}

#[test]
fn rebuild_produces_identical_uuids() {
    let cache = fixture_cache();
    let first = run_pipeline(&cache);
    let second = run_pipeline(&cache);

    let report = BuildReport::new();
    let a = Assembler::new(&cache, &first.config, &report).unwrap();
    let b = Assembler::new(&cache, &second.config, &report).unwrap();

    for code in a.set_codes().unwrap() {
        let set_a = a.set_object(&code).unwrap();
        let set_b = b.set_object(&code).unwrap();
        let uuids_a: Vec<&str> = set_a.cards.iter().map(|c| c.uuid.as_str()).collect();
        let uuids_b: Vec<&str> = set_b.cards.iter().map(|c| c.uuid.as_str()).collect();
        assert_eq!(uuids_a, uuids_b, "uuid drift in {code}");
    }
}
