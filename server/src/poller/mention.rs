//! Mention Matcher
//!
//! Case-insensitive substring match of an agent name against free text.
//!
//! Known limitation: matching is plain substring search, so a name that is
//! also a common word ("Echo") or that is contained in another agent's name
//! ("Eyrie" inside "EyrieBot") produces false positives. Word-boundary and
//! disambiguation rules are not applied.

/// Whether `text` references `agent_name`, either as `@agent_name` or bare.
pub fn matches(text: &str, agent_name: &str) -> bool {
    if text.is_empty() || agent_name.is_empty() {
        return false;
    }

    let text = text.to_lowercase();
    let name = agent_name.to_lowercase();

    text.contains(&format!("@{name}")) || text.contains(&name)
}
