//! Naive English pluralization, enough to match "user" against `users`
//! and "categories" against `category`.

pub fn pluralize(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.ends_with('y') && !ends_with_vowel_y(&lower) {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| lower.ends_with(suffix)) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

pub fn singularize(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.ends_with("ies") && word.len() > 3 {
        format!("{}y", &word[..word.len() - 3])
    } else if ["ses", "xes", "zes", "ches", "shes"].iter().any(|suffix| lower.ends_with(suffix)) {
        word[..word.len() - 2].to_string()
    } else if lower.ends_with('s') && !lower.ends_with("ss") && word.len() > 1 {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

/// Literal form, then plural, then singular
pub fn candidates(word: &str) -> Vec<String> {
    let mut out = vec![word.to_string()];
    for form in [pluralize(word), singularize(word)] {
        if !out.contains(&form) {
            out.push(form);
        }
    }
    out
}

fn ends_with_vowel_y(lower: &str) -> bool {
    let mut chars = lower.chars().rev();
    chars.next();
    matches!(chars.next(), Some('a' | 'e' | 'i' | 'o' | 'u'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("address"), "addresses");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("address"), "address");
    }

    #[test]
    fn test_candidate_order() {
        assert_eq!(candidates("order"), vec!["order", "orders"]);
        assert_eq!(candidates("orders"), vec!["orders", "orderses", "order"]);
    }
}
