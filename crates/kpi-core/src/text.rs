//! Text folding helpers shared by header resolution, category matching and
//! question parsing.

// ── Accent folding ────────────────────────────────────────────────────────────

/// Map a Latin accented character to its unaccented base letter.
fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
        'Á' | 'À' | 'Ä' | 'Â' | 'Ã' => 'A',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'É' | 'È' | 'Ë' | 'Ê' => 'E',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'O',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ç' => 'c',
        'Ç' => 'C',
        other => other,
    }
}

/// Replace accented Latin letters with their base letter, keeping case.
pub fn strip_accents(s: &str) -> String {
    s.chars().map(fold_char).collect()
}

// ── Folding ───────────────────────────────────────────────────────────────────

/// Lowercase, strip accents, turn punctuation into spaces and collapse runs of
/// whitespace.
///
/// ```
/// use kpi_core::text::fold;
///
/// assert_eq!(fold("¿Cuál fue el TOTAL?"), "cual fue el total");
/// ```
pub fn fold(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(fold_char)
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// [`fold`] split into tokens.
pub fn tokenize(s: &str) -> Vec<String> {
    fold(s).split_whitespace().map(str::to_string).collect()
}

/// Canonical key for a category value: accent-folded, upper-cased, single
/// spaces. Punctuation is kept because product codes often carry it.
pub fn category_key(s: &str) -> String {
    strip_accents(s)
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical form of a column header: trimmed, accent-folded, symbols
/// removed, spaces turned into `_`, upper-cased.
///
/// ```
/// use kpi_core::text::normalize_label;
///
/// assert_eq!(normalize_label("  Año "), "ANO");
/// assert_eq!(normalize_label("psv brand"), "PSV_BRAND");
/// assert_eq!(normalize_label("Vol. (Kg)"), "VOL_KG");
/// ```
pub fn normalize_label(s: &str) -> String {
    let kept: String = strip_accents(s.trim())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect();
    kept.split(|c: char| c.is_whitespace() || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_accents_keeps_case() {
        assert_eq!(strip_accents("Último AÑO"), "Ultimo ANO");
    }

    #[test]
    fn test_fold_removes_punctuation() {
        assert_eq!(fold("¡Hola!  ¿qué   tal?"), "hola que tal");
        assert_eq!(fold("variación %"), "variacion");
    }

    #[test]
    fn test_fold_empty() {
        assert_eq!(fold("  ¿? "), "");
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Total de VENTAS, enero 2024"),
            vec!["total", "de", "ventas", "enero", "2024"]
        );
    }

    #[test]
    fn test_category_key() {
        assert_eq!(category_key("  marca   ñandú "), "MARCA NANDU");
        assert_eq!(category_key("IDH-01"), "IDH-01");
    }

    #[test]
    fn test_normalize_label_variants() {
        assert_eq!(normalize_label("PERIODO"), "PERIODO");
        assert_eq!(normalize_label("main material code"), "MAIN_MATERIAL_CODE");
        assert_eq!(normalize_label("Main__Material  Code"), "MAIN_MATERIAL_CODE");
        assert_eq!(normalize_label("Marca*"), "MARCA");
    }
}
