//! Registry-bounded category matching.
//!
//! Brand and IDH spellings drift between exports (`"Marca  A"`, `"MARCA A"`,
//! `"Marac A"`). Matching is case-insensitive and whitespace-normalized, then
//! falls back to the closest registry entry within a Levenshtein bound.

use strsim::levenshtein;

use crate::text::category_key;

/// Result of resolving one spelling against a registry list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryMatch {
    /// Same canonical key as a registry entry.
    Exact(String),
    /// Closest registry entry within the edit-distance bound.
    Fuzzy { canonical: String, distance: usize },
    /// Nothing close enough.
    Unmatched,
}

impl CategoryMatch {
    /// The canonical spelling, if any.
    pub fn canonical(&self) -> Option<&str> {
        match self {
            CategoryMatch::Exact(c) => Some(c),
            CategoryMatch::Fuzzy { canonical, .. } => Some(canonical),
            CategoryMatch::Unmatched => None,
        }
    }
}

/// Matches free-form spellings against a fixed list of canonical values.
#[derive(Debug, Clone)]
pub struct CategoryMatcher {
    /// `(key, canonical)` pairs in registry order.
    entries: Vec<(String, String)>,
    max_distance: usize,
}

impl CategoryMatcher {
    pub fn new<S: AsRef<str>>(canonical: &[S], max_distance: usize) -> Self {
        let entries = canonical
            .iter()
            .map(|c| (category_key(c.as_ref()), c.as_ref().to_string()))
            .collect();
        Self {
            entries,
            max_distance,
        }
    }

    /// An empty registry list means the dimension is open.
    pub fn is_open(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_distance(&self) -> usize {
        self.max_distance
    }

    /// Resolve `raw`; ties on distance go to the earlier registry entry.
    pub fn resolve(&self, raw: &str) -> CategoryMatch {
        let key = category_key(raw);
        if key.is_empty() {
            return CategoryMatch::Unmatched;
        }

        if let Some((_, canonical)) = self.entries.iter().find(|(k, _)| *k == key) {
            return CategoryMatch::Exact(canonical.clone());
        }

        // Also ignore inner whitespace entirely ("MARCAA" vs "MARCA A").
        let squashed: String = key.chars().filter(|c| !c.is_whitespace()).collect();
        if let Some((_, canonical)) = self
            .entries
            .iter()
            .find(|(k, _)| k.chars().filter(|c| !c.is_whitespace()).eq(squashed.chars()))
        {
            return CategoryMatch::Exact(canonical.clone());
        }

        if self.max_distance == 0 {
            return CategoryMatch::Unmatched;
        }

        let mut best: Option<(usize, &String)> = None;
        for (k, canonical) in &self.entries {
            let d = levenshtein(&key, k);
            if d <= self.max_distance && best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, canonical));
            }
        }

        match best {
            Some((distance, canonical)) => CategoryMatch::Fuzzy {
                canonical: canonical.clone(),
                distance,
            },
            None => CategoryMatch::Unmatched,
        }
    }

    /// Exact-key lookup only (no edit distance).
    pub fn lookup_exact(&self, raw: &str) -> Option<&str> {
        let key = category_key(raw);
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, c)| c.as_str())
    }

    /// Canonical values in registry order.
    pub fn canonical_values(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, c)| c.as_str())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn brands() -> CategoryMatcher {
        CategoryMatcher::new(&["Marca A", "Marca B", "Nutriplus"], 2)
    }

    #[test]
    fn test_exact_case_and_whitespace_insensitive() {
        let m = brands();
        assert_eq!(m.resolve("  marca   a "), CategoryMatch::Exact("Marca A".into()));
        assert_eq!(m.resolve("NUTRIPLUS"), CategoryMatch::Exact("Nutriplus".into()));
    }

    #[test]
    fn test_exact_ignoring_inner_spaces() {
        assert_eq!(brands().resolve("MarcaB"), CategoryMatch::Exact("Marca B".into()));
    }

    #[test]
    fn test_fuzzy_within_bound() {
        let got = brands().resolve("Nutriplsu");
        assert_eq!(
            got,
            CategoryMatch::Fuzzy {
                canonical: "Nutriplus".into(),
                distance: 2
            }
        );
        assert_eq!(got.canonical(), Some("Nutriplus"));
    }

    #[test]
    fn test_fuzzy_tie_goes_to_first_entry() {
        // "MARCA C" is one edit from both "MARCA A" and "MARCA B".
        assert_eq!(
            brands().resolve("Marca C"),
            CategoryMatch::Fuzzy {
                canonical: "Marca A".into(),
                distance: 1
            }
        );
    }

    #[test]
    fn test_unmatched_beyond_bound() {
        assert_eq!(brands().resolve("Zeta"), CategoryMatch::Unmatched);
        assert_eq!(brands().resolve("   "), CategoryMatch::Unmatched);
    }

    #[test]
    fn test_zero_distance_disables_fuzzy() {
        let m = CategoryMatcher::new(&["Nutriplus"], 0);
        assert_eq!(m.resolve("Nutriplsu"), CategoryMatch::Unmatched);
        assert_eq!(m.resolve("nutriplus"), CategoryMatch::Exact("Nutriplus".into()));
    }

    #[test]
    fn test_accents_folded() {
        let m = CategoryMatcher::new(&["Café Real"], 1);
        assert_eq!(m.resolve("CAFE REAL"), CategoryMatch::Exact("Café Real".into()));
    }

    #[test]
    fn test_open_registry() {
        let m = CategoryMatcher::new::<&str>(&[], 2);
        assert!(m.is_open());
        assert_eq!(m.resolve("anything"), CategoryMatch::Unmatched);
    }
}
