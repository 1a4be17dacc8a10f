//! Leading-byte watch rules.
//!
//! Matching is a pure decision over payload and rule list; painting the
//! terminal with the result is left to [`crate::console`].

use crate::settings::{ConsoleColor, WatchRule};

/// Colors to paint one segment with. A `None` channel keeps the terminal default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighlightStyle {
    pub foreground: Option<ConsoleColor>,
    pub background: Option<ConsoleColor>,
}

impl From<&WatchRule> for HighlightStyle {
    fn from(rule: &WatchRule) -> Self {
        Self {
            foreground: rule.foreground_color,
            background: rule.background_color,
        }
    }
}

/// First rule, in list order, whose leading byte equals `payload[0]`.
pub fn first_match<'a>(payload: &[u8], rules: &'a [WatchRule]) -> Option<(usize, &'a WatchRule)> {
    let first = *payload.first()?;
    rules
        .iter()
        .enumerate()
        .find(|(_, rule)| rule.leading_byte == Some(first))
}

/// Highlight for `payload`, or `None` when no rule matches.
pub fn highlight_for(payload: &[u8], rules: &[WatchRule]) -> Option<HighlightStyle> {
    first_match(payload, rules).map(|(_, rule)| HighlightStyle::from(rule))
}
