//! Place-name normalisation for search.
//!
//! Matching is a loose substring test in both directions, so partial
//! typing and common misspellings resolve to the canonical name. Short
//! variants such as "mng" can produce false positives; that trade-off is
//! accepted.

/// Canonical place name and its known spellings, checked in order
const ALIASES: &[(&str, &[&str])] = &[
    ("mangaluru", &["mangalore", "mangaluru", "mng", "kudla"]),
    ("udupi", &["udupi", "udipi"]),
    ("bengaluru", &["bengaluru", "bangalore", "blr"]),
    ("mysuru", &["mysuru", "mysore"]),
    ("surathkal", &["surathkal", "suratkal"]),
    ("kundapura", &["kundapura", "kundapur", "coondapoor"]),
    ("karkala", &["karkala", "karkal"]),
    ("bantwal", &["bantwal", "bantwala"]),
    ("belthangady", &["belthangady", "beltangadi"]),
    ("puttur", &["puttur", "puttuuru"]),
    ("dakshina kannada", &["dakshina kannada", "south canara", "dk"]),
];

/// Lower-cased, trimmed form of `place`, mapped to its canonical name when
/// it overlaps a known variant
pub fn normalize_location(place: &str) -> String {
    let place = place.trim().to_lowercase();
    if place.is_empty() {
        return place;
    }
    ALIASES
        .iter()
        .find(|(_, variants)| {
            variants
                .iter()
                .any(|v| place.contains(v) || v.contains(place.as_str()))
        })
        .map(|(canonical, _)| canonical.to_string())
        .unwrap_or(place)
}

/// Whether a listing's `field` satisfies the user's `query`. An empty query
/// matches everything.
pub fn location_matches(field: &str, query: &str) -> bool {
    let query = normalize_location(query);
    if query.is_empty() {
        return true;
    }
    let field = normalize_location(field);
    !field.is_empty() && (field.contains(&query) || query.contains(&field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_group_collapses_to_canonical() {
        assert_eq!(normalize_location("Mangalore"), "mangaluru");
        assert_eq!(normalize_location("mangaluru"), "mangaluru");
        assert_eq!(normalize_location("  MNG "), "mangaluru");
    }

    #[test]
    fn idempotent() {
        for (canonical, variants) in ALIASES {
            assert_eq!(normalize_location(canonical), *canonical);
            for variant in *variants {
                let once = normalize_location(variant);
                assert_eq!(normalize_location(&once), once);
            }
        }
    }

    #[test]
    fn unknown_place_is_only_trimmed_and_lowercased() {
        assert_eq!(normalize_location("  Hassan "), "hassan");
        assert_eq!(normalize_location(""), "");
    }

    #[test]
    fn partial_typing_resolves() {
        assert_eq!(normalize_location("udu"), "udupi");
        assert!(location_matches("Udupi", "udip"));
    }

    #[test]
    fn matches_are_symmetric_across_spellings() {
        assert!(location_matches("Mangaluru", "Mangalore"));
        assert!(location_matches("Mangalore", "mangaluru"));
        assert!(!location_matches("Udupi", "Mangalore"));
        assert!(location_matches("Anything", "   "));
    }
}
