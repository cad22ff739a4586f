//! Text rendering utilities for human-friendly error messages.
//!
//! Provides helpers to format build chains, Rust type names,
//! and "did you mean?" suggestions for binding keys.

/// Renders a build chain as a readable string.
///
/// # Examples
/// ```
/// use bindery_support::rendering::render_chain;
///
/// let chain = vec!["app", "router", "config", "app"];
/// assert_eq!(render_chain(&chain), "app → router → config → app");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Shortens a fully qualified type name for display.
///
/// ```
/// use bindery_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("my_app::routing::Router"), "Router");
/// assert_eq!(
///     shorten_type_name("alloc::sync::Arc<dyn my_app::view::Engine>"),
///     "Arc<dyn Engine>"
/// );
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut chars = full_name.chars().peekable();
    let mut segment = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                result.push_str(&segment);
                result.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    result.push_str(&segment);
    result
}

/// Levenshtein distance between two strings, counted in chars.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Suggests registered keys that look like a mistyped `requested` key.
///
/// Candidates are ranked by substring containment first, then by edit
/// distance. A candidate is kept when its distance is at most a third of
/// the longer name (and at least 1).
///
/// ```
/// use bindery_support::rendering::suggest_similar;
///
/// let suggestions = suggest_similar("confg", &["config", "router", "view"], 3);
/// assert_eq!(suggestions, vec!["config".to_string()]);
/// ```
pub fn suggest_similar(requested: &str, available: &[&str], max_suggestions: usize) -> Vec<String> {
    let requested_lower = requested.to_lowercase();

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .filter(|name| **name != requested)
        .filter_map(|&name| {
            let name_lower = name.to_lowercase();

            if !requested_lower.is_empty()
                && (name_lower.contains(&requested_lower) || requested_lower.contains(&name_lower))
            {
                return Some((name, 0));
            }

            let distance = edit_distance(&requested_lower, &name_lower);
            let threshold = (name_lower.chars().count().max(requested_lower.chars().count()) / 3).max(1);
            (distance <= threshold).then_some((name, distance))
        })
        .collect();

    scored.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| name.to_string())
        .collect()
}
