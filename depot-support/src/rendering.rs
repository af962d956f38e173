//! Text rendering utilities for human-friendly diagnostics.
//!
//! The container reports keys built from `std::any::type_name`, which are
//! long and path-qualified. These helpers turn them into something a person
//! can read in a log line or an error message.

/// Renders a resolution chain as a readable string.
///
/// # Examples
/// ```
/// use depot_support::rendering::render_chain;
///
/// let chain = vec!["UserService", "UserRepo", "Database", "UserService"];
/// let rendered = render_chain(&chain);
/// assert_eq!(rendered, "UserService → UserRepo → Database → UserService");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Renders a list of labels as `a, b and c`.
///
/// ```
/// use depot_support::rendering::render_list;
///
/// assert_eq!(render_list(&["Square"]), "Square");
/// assert_eq!(render_list(&["Square", "Circle"]), "Square and Circle");
/// assert_eq!(render_list(&["A", "B", "C"]), "A, B and C");
/// ```
pub fn render_list(items: &[impl AsRef<str>]) -> String {
    match items {
        [] => String::new(),
        [only] => only.as_ref().to_string(),
        [init @ .., last] => {
            let head: Vec<&str> = init.iter().map(|s| s.as_ref()).collect();
            format!("{} and {}", head.join(", "), last.as_ref())
        }
    }
}

/// Shortens a fully qualified type name for display.
///
/// ```
/// use depot_support::rendering::shorten_type_name;
///
/// let short = shorten_type_name("my_app::services::user::UserService");
/// assert_eq!(short, "UserService");
///
/// let short = shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>");
/// assert_eq!(short, "Arc<dyn Logger>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut chars = full_name.chars().peekable();
    let mut current_segment = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                current_segment.clear();
            }
            '<' | '>' | ',' | ' ' | '[' | ']' | '(' | ')' | '&' | ';' => {
                result.push_str(&current_segment);
                result.push(ch);
                current_segment.clear();
            }
            _ => current_segment.push(ch),
        }
    }

    result.push_str(&current_segment);
    result
}

/// Generates "did you mean?" candidates from the labels that are registered.
///
/// Matches on case-insensitive substrings of the full label first, then of
/// the shortened type name, then on a shared prefix of at least three
/// characters. Results are ordered best first.
///
/// ```
/// use depot_support::rendering::suggest_similar;
///
/// let available = ["app::UserService", "app::Database"];
/// let found = suggest_similar("app::UserServise", &available, 3);
/// assert_eq!(found, vec!["app::UserService".to_string()]);
/// ```
pub fn suggest_similar(
    requested: &str,
    available: &[impl AsRef<str>],
    max_suggestions: usize,
) -> Vec<String> {
    let requested_lower = requested.to_lowercase();
    let requested_short = shorten_type_name(requested).to_lowercase();

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .map(|name| name.as_ref())
        .filter(|name| !name.eq_ignore_ascii_case(requested))
        .filter_map(|name| {
            let name_lower = name.to_lowercase();
            let name_short = shorten_type_name(name).to_lowercase();

            if name_lower.contains(&requested_lower) || requested_lower.contains(&name_lower) {
                return Some((name, 100));
            }

            if name_short.contains(&requested_short) || requested_short.contains(&name_short) {
                return Some((name, 80));
            }

            let common = name_short
                .chars()
                .zip(requested_short.chars())
                .take_while(|(a, b)| a == b)
                .count();

            (common >= 3).then_some((name, common * 10))
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| name.to_string())
        .collect()
}
