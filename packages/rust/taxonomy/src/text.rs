//! Tokenization and light stemming shared by the dictionary and the classifier.
//!
//! Both sides of a keyword match go through [`stems`], so a dictionary phrase
//! like `"pizzas"` matches `"pizza"` in page text and vice versa.

/// Lowercase alphanumeric tokens. Apostrophes inside a word are dropped
/// (`joe's` → `joes`); every other non-alphanumeric char separates tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if (c == '\'' || c == '\u{2019}') && !current.is_empty() {
            continue;
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Reduce a lowercase token to a crude stem. At most one rule applies.
pub fn stem(token: &str) -> String {
    let len = token.chars().count();
    if len <= 3 || !token.is_ascii() {
        return token.to_string();
    }

    if let Some(base) = token.strip_suffix("ies").filter(|_| len > 4) {
        return format!("{base}y");
    }
    if token.ends_with("sses") {
        return token[..token.len() - 2].to_string();
    }
    for sibilant in ["ches", "shes", "xes", "zzes"] {
        if token.ends_with(sibilant) {
            return token[..token.len() - 2].to_string();
        }
    }
    if token.ends_with("ss") || token.ends_with("us") || token.ends_with("is") {
        return token.to_string();
    }
    if let Some(base) = token.strip_suffix('s') {
        return base.to_string();
    }
    if let Some(base) = token.strip_suffix("ing").filter(|_| len > 5) {
        return base.to_string();
    }
    if let Some(base) = token.strip_suffix("ed").filter(|_| len > 4) {
        return base.to_string();
    }

    token.to_string()
}

/// Tokenize then stem.
pub fn stems(text: &str) -> Vec<String> {
    tokenize(text).iter().map(|t| stem(t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_apostrophes_and_punctuation() {
        assert_eq!(tokenize("Joe's Pizza, LLC."), ["joes", "pizza", "llc"]);
        assert_eq!(tokenize("Joe’s  wood-fired"), ["joes", "wood", "fired"]);
    }

    #[test]
    fn stem_handles_common_suffixes() {
        assert_eq!(stem("pizzas"), "pizza");
        assert_eq!(stem("bakeries"), "bakery");
        assert_eq!(stem("dishes"), "dish");
        assert_eq!(stem("catering"), "cater");
        assert_eq!(stem("catered"), "cater");
        assert_eq!(stem("glass"), "glass");
        assert_eq!(stem("services"), "service");
        assert_eq!(stem("bus"), "bus");
        assert_eq!(stem("menu"), "menu");
    }

    #[test]
    fn stems_are_idempotent_on_singular_forms() {
        for word in ["pizza", "restaurant", "dentist", "bakery"] {
            assert_eq!(stem(word), stem(&stem(word)), "{word}");
        }
    }
}
