//! Mana-cost parsing and color ordering.
//!
//! A mana cost is a sequence of `{...}` atoms. Contribution to mana value:
//! a generic digit atom contributes its integer, `X`/`Y`/`Z` contribute 0,
//! hybrid `{2/W}` contributes the larger half, `{HW}`-style halves contribute
//! 0.5, and every other atom (colored pips, phyrexian, snow) contributes 1.

/// Canonical color order. Never alphabetic.
pub const COLOR_ORDER: [&str; 5] = ["W", "U", "B", "R", "G"];

/// Tokenize a mana cost into its `{...}` atoms (braces stripped).
pub fn mana_atoms(cost: &str) -> Vec<&str> {
    let mut atoms = Vec::new();
    let mut rest = cost;
    while let Some(start) = rest.find('{') {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        atoms.push(&rest[start + 1..start + end]);
        rest = &rest[start + end + 1..];
    }
    atoms
}

fn atom_value(atom: &str) -> f64 {
    if let Ok(n) = atom.parse::<u32>() {
        return f64::from(n);
    }
    match atom {
        "X" | "Y" | "Z" => 0.0,
        "½" | "HW" | "HU" | "HB" | "HR" | "HG" => 0.5,
        _ => {
            if let Some((left, right)) = atom.split_once('/') {
                // Hybrid: the higher of the two halves. {2/W} -> max(2, 1).
                return atom_value(left).max(atom_value(right));
            }
            1.0
        }
    }
}

/// Mana value of a full cost string, per the columnar formula.
pub fn mana_value(cost: &str) -> f64 {
    mana_atoms(cost).iter().map(|a| atom_value(a)).sum()
}

/// Extract the distinct colors present in a mana cost, in W-U-B-R-G order.
pub fn colors_in_cost(cost: &str) -> Vec<String> {
    let atoms = mana_atoms(cost);
    COLOR_ORDER
        .iter()
        .filter(|color| {
            atoms
                .iter()
                .any(|atom| atom.split('/').any(|part| part == **color))
        })
        .map(|c| (*c).to_string())
        .collect()
}

/// Sort a color list into W-U-B-R-G order, dropping anything unknown.
pub fn sort_colors(colors: &[String]) -> Vec<String> {
    COLOR_ORDER
        .iter()
        .filter(|c| colors.iter().any(|x| x == **c))
        .map(|c| (*c).to_string())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_atoms() {
        assert_eq!(mana_atoms("{2}{W}{W}"), vec!["2", "W", "W"]);
        assert_eq!(mana_atoms(""), Vec::<&str>::new());
    }

    #[test]
    fn generic_and_pips() {
        assert_eq!(mana_value("{3}{U}{U}"), 5.0);
        assert_eq!(mana_value("{W}"), 1.0);
    }

    #[test]
    fn x_contributes_zero() {
        assert_eq!(mana_value("{X}{X}{R}"), 1.0);
    }

    #[test]
    fn hybrid_takes_max() {
        assert_eq!(mana_value("{2/W}"), 2.0);
        assert_eq!(mana_value("{W/U}"), 1.0);
        // Phyrexian hybrid is still one pip
        assert_eq!(mana_value("{W/P}"), 1.0);
    }

    #[test]
    fn half_pips() {
        assert_eq!(mana_value("{HW}"), 0.5);
        assert_eq!(mana_value("{½}"), 0.5);
    }

    #[test]
    fn colors_sorted_wubrg() {
        assert_eq!(colors_in_cost("{G}{W}{B}"), vec!["W", "B", "G"]);
        assert_eq!(colors_in_cost("{2/W}{U}"), vec!["W", "U"]);
        assert_eq!(colors_in_cost("{3}"), Vec::<String>::new());
    }

    #[test]
    fn sort_colors_is_not_alphabetic() {
        let input = vec!["G".to_string(), "B".to_string(), "U".to_string()];
        assert_eq!(sort_colors(&input), vec!["U", "B", "G"]);
    }
}
