//! Deterministic UUID derivation.
//!
//! Every downstream consumer keys off these identifiers, so the canonical
//! byte strings are spelled out here and must not change: identical inputs
//! must produce identical UUIDs across runs and across implementations.
//!
//! - Face UUID: v5 over the DNS namespace of `scryfallId + side`, where a
//!   missing side is treated as `"a"`.
//! - Legacy identifier (`mtgjsonV4Id`): token faces hash
//!   `faceName + colors + power + toughness + side + setCode[1:] + scryfallId`;
//!   all other faces hash `"sf" + scryfallId + faceName`.
//! - Sealed products: v5 over the product name.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// v5 UUID over the DNS namespace, as a lowercase hyphenated string.
pub fn uuid5(name: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes()).to_string()
}

/// Face UUID from the canonical `(scryfallId, side)` key.
pub fn face_uuid(scryfall_id: &str, side: Option<&str>) -> String {
    let side = side.unwrap_or("a");
    uuid5(&format!("{scryfall_id}{side}"))
}

/// Inputs for the legacy v4-format identifier.
pub struct LegacyIdParts<'a> {
    pub scryfall_id: &'a str,
    pub name: &'a str,
    pub face_name: Option<&'a str>,
    pub types: &'a [String],
    pub colors: &'a [String],
    pub power: Option<&'a str>,
    pub toughness: Option<&'a str>,
    pub side: Option<&'a str>,
    pub set_code: &'a str,
}

/// Legacy identifier retained in `identifiers.mtgjsonV4Id`.
pub fn legacy_v4_id(parts: &LegacyIdParts<'_>) -> String {
    let card_name = parts.face_name.filter(|f| !f.is_empty()).unwrap_or(parts.name);
    let is_token = parts
        .types
        .iter()
        .any(|t| t == "Token" || t == "Card");

    let seed = if is_token {
        let colors: String = parts.colors.concat();
        let set_suffix = if parts.set_code.len() > 1 {
            parts.set_code[1..].to_uppercase()
        } else {
            String::new()
        };
        format!(
            "{card_name}{colors}{power}{toughness}{side}{set_suffix}{scryfall_id}",
            power = parts.power.unwrap_or(""),
            toughness = parts.toughness.unwrap_or(""),
            side = parts.side.unwrap_or(""),
            scryfall_id = parts.scryfall_id,
        )
    } else {
        format!("sf{}{card_name}", parts.scryfall_id)
    };

    uuid5(&seed)
}

/// UUID for a sealed product, derived from its name.
pub fn sealed_product_uuid(name: &str) -> String {
    uuid5(name)
}

/// First 16 hex characters of SHA-256 over the seed. Used for purchase-URL
/// redirect keys and the referral map.
pub fn url_hash(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let hex = format!("{digest:x}");
    hex[..16].to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn face_uuid_is_stable() {
        let a = face_uuid("56ebc372-aabd-4174-a943-c7bf59e5028d", None);
        let b = face_uuid("56ebc372-aabd-4174-a943-c7bf59e5028d", Some("a"));
        assert_eq!(a, b, "missing side must default to 'a'");
        // Recomputing must never drift.
        assert_eq!(a, face_uuid("56ebc372-aabd-4174-a943-c7bf59e5028d", None));
    }

    #[test]
    fn face_uuid_differs_per_side() {
        let a = face_uuid("id", Some("a"));
        let b = face_uuid("id", Some("b"));
        assert_ne!(a, b);
    }

    #[test]
    fn face_uuid_is_v5() {
        let u = Uuid::parse_str(&face_uuid("abc", Some("a"))).unwrap();
        assert_eq!(u.get_version_num(), 5);
    }

    #[test]
    fn matches_reference_vector() {
        // uuid5(DNS, "hello") is a fixed point of RFC 4122.
        assert_eq!(uuid5("hello"), "9342d47a-1bab-5709-9869-c840b2eac501");
    }

    #[test]
    fn legacy_id_token_formula() {
        let parts = LegacyIdParts {
            scryfall_id: "sfid",
            name: "Goblin",
            face_name: None,
            types: &["Token".to_string()],
            colors: &["R".to_string()],
            power: Some("1"),
            toughness: Some("1"),
            side: None,
            set_code: "TNEO",
        };
        // Token seed: name + colors + p/t + side + set[1:] + scryfall id
        assert_eq!(legacy_v4_id(&parts), uuid5("GoblinR11NEOsfid"));
    }

    #[test]
    fn legacy_id_card_formula() {
        let parts = LegacyIdParts {
            scryfall_id: "sfid",
            name: "Lightning Bolt",
            face_name: None,
            types: &["Instant".to_string()],
            colors: &["R".to_string()],
            power: None,
            toughness: None,
            side: None,
            set_code: "LEA",
        };
        assert_eq!(legacy_v4_id(&parts), uuid5("sfsfidLightning Bolt"));
    }

    #[test]
    fn url_hash_is_16_hex() {
        let h = url_hash("371368ebcd1b1b9ae64ee33bdf4833b0");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(h, url_hash("371368ebcd1b1b9ae64ee33bdf4833b0"));
    }
}
