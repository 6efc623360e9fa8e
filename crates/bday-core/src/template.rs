//! Placeholder substitution for event templates
//!
//! Only `{name}` and `{days}` are known. Anything else in braces, and any
//! unbalanced brace, is copied through unchanged.

/// Render `template`, replacing `{key}` with the matching value from `vars`
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let Some(close) = after.find(['}', '{']).filter(|i| after.as_bytes()[*i] == b'}') else {
            // No closing brace before the next opening one
            out.push('{');
            rest = after;
            continue;
        };

        let key = &after[..close];
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Reminder text for `days_before`, with the wording fixes for 0 and 1 day
pub fn render_reminder(template: &str, name: &str, days_before: u32) -> String {
    let days = days_before.to_string();
    let vars = [("name", name), ("days", days.as_str())];

    match days_before {
        0 if !template.contains("{days}") => format!("Today is {}'s birthday!", name),
        0 => render(template, &vars)
            .replace("in 0 days", "today")
            .replace("in 0 day", "today")
            .replace("is in today", "is today"),
        1 => render(template, &vars).replace("1 days", "1 day"),
        _ => render(template, &vars),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_name() {
        assert_eq!(render("🎂 {name}'s Birthday", &[("name", "Alice")]), "🎂 Alice's Birthday");
        assert_eq!(render("{name} & {name}", &[("name", "Bo")]), "Bo & Bo");
    }

    #[test]
    fn test_unknown_placeholder_is_literal() {
        assert_eq!(
            render("{name} is {age} today", &[("name", "Alice")]),
            "Alice is {age} today"
        );
    }

    #[test]
    fn test_unbalanced_braces() {
        assert_eq!(render("{name", &[("name", "A")]), "{name");
        assert_eq!(render("name}", &[("name", "A")]), "name}");
        assert_eq!(render("{{name}", &[("name", "A")]), "{A");
        assert_eq!(render("{}", &[("name", "A")]), "{}");
    }

    #[test]
    fn test_no_recursive_substitution() {
        assert_eq!(render("{name}", &[("name", "{days}"), ("days", "3")]), "{days}");
    }

    #[test]
    fn test_reminder_plural() {
        let template = "Reminder: {name}'s birthday is in {days} days!";
        assert_eq!(render_reminder(template, "Bob", 7), "Reminder: Bob's birthday is in 7 days!");
        assert_eq!(render_reminder(template, "Bob", 1), "Reminder: Bob's birthday is in 1 day!");
        assert_eq!(render_reminder(template, "Bob", 0), "Reminder: Bob's birthday is today!");
    }

    #[test]
    fn test_reminder_zero_without_days() {
        assert_eq!(render_reminder("Party for {name}", "Bob", 0), "Today is Bob's birthday!");
    }
}
