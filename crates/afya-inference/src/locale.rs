//! Language code tables.

/// Locale used when a language has no mapping.
pub const DEFAULT_LOCALE: &str = "en-US";

/// Language codes the assistant answers in.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "sw", "ha", "yo", "ig", "fr"];

/// Primary subtag of a language code, e.g. `"sw"` for `"sw-KE"`.
fn primary(code: &str) -> &str {
    code.trim().split(['-', '_']).next().unwrap_or_default()
}

/// Recognition locale for a language code. Unmapped codes fall back to `en-US`.
pub fn recognition_locale(language: &str) -> &'static str {
    match primary(language).to_ascii_lowercase().as_str() {
        "en" => "en-US",
        "sw" => "sw-KE",
        "ha" => "ha-NG",
        "yo" => "yo-NG",
        "ig" => "ig-NG",
        "fr" => "fr-FR",
        _ => DEFAULT_LOCALE,
    }
}

/// Human-readable language name for prompts. Unknown codes are returned as given.
pub fn language_name(language: &str) -> &str {
    match primary(language).to_ascii_lowercase().as_str() {
        "en" => "English",
        "sw" => "Swahili",
        "ha" => "Hausa",
        "yo" => "Yoruba",
        "ig" => "Igbo",
        "fr" => "French",
        _ => language.trim(),
    }
}

pub fn is_supported(language: &str) -> bool {
    let code = primary(language).to_ascii_lowercase();
    SUPPORTED_LANGUAGES.contains(&code.as_str())
}
