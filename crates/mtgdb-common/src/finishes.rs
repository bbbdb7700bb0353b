//! Finish ordering.
//!
//! Finishes sort by production order, nonfoil < foil < etched, never
//! alphabetically. Unknown finishes (e.g. "signed") sort after the known
//! three, preserving their input order.

fn finish_ordinal(finish: &str) -> u8 {
    match finish {
        "nonfoil" => 0,
        "foil" => 1,
        "etched" => 2,
        _ => 3,
    }
}

/// Sort a finish list into canonical order. Stable for unknowns.
pub fn sort_finishes(finishes: &[String]) -> Vec<String> {
    let mut sorted: Vec<String> = finishes.to_vec();
    sorted.sort_by_key(|f| finish_ordinal(f));
    sorted
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_ordinal_not_alphabet() {
        let input = vec![
            "foil".to_string(),
            "etched".to_string(),
            "nonfoil".to_string(),
        ];
        assert_eq!(sort_finishes(&input), vec!["nonfoil", "foil", "etched"]);
    }

    #[test]
    fn unknown_finishes_sort_last() {
        let input = vec!["signed".to_string(), "foil".to_string()];
        assert_eq!(sort_finishes(&input), vec!["foil", "signed"]);
    }
}
