use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{EmojiRef, Message, Reaction};

const SKIN_TONE_SEPARATOR: &str = "::";
const SKIN_TONE_PREFIX: &str = "skin-tone-";

#[allow(clippy::expect_used)]
static INLINE_EMOJI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":[a-z0-9_+\-]+:").expect("inline emoji pattern is valid"));

/// Custom emoji of a workspace and the aliases pointing at them (or at
/// standard emoji).
#[derive(Debug, Clone, Default)]
pub struct EmojiCatalog {
    custom: BTreeSet<String>,
    aliases: HashMap<String, String>,
}

impl EmojiCatalog {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, EmojiRef)>,
    {
        let mut catalog = Self::default();
        for (name, target) in entries {
            match target {
                EmojiRef::Alias(canonical) => {
                    catalog.aliases.insert(name, canonical);
                }
                EmojiRef::Image(_) => {
                    catalog.custom.insert(name);
                }
            }
        }
        catalog
    }

    /// Resolves a raw emoji name to its counting key: the skin tone is
    /// dropped first, then aliases are followed.
    pub fn canonical_name<'a>(&'a self, raw: &'a str) -> &'a str {
        let base = strip_skin_tone(raw);
        self.aliases.get(base).map(String::as_str).unwrap_or(base)
    }

    pub fn is_custom(&self, name: &str) -> bool {
        self.custom.contains(name)
    }

    pub fn custom_count(&self) -> usize {
        self.custom.len()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub fn into_custom(self) -> BTreeSet<String> {
        self.custom
    }
}

/// `thumbsup::skin-tone-2` -> `thumbsup`
pub fn strip_skin_tone(name: &str) -> &str {
    name.split_once(SKIN_TONE_SEPARATOR)
        .map_or(name, |(base, _)| base)
}

fn is_skin_tone_modifier(name: &str) -> bool {
    matches!(
        name.strip_prefix(SKIN_TONE_PREFIX),
        Some("2" | "3" | "4" | "5" | "6")
    )
}

/// Emoji names written inline as `:name:`, in order of appearance.
///
/// A `:skin-tone-N:` token glued to the previous token (`:wave::skin-tone-3:`)
/// modifies that emoji and is not reported on its own.
pub fn inline_emoji(text: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut previous_end = None;

    for m in INLINE_EMOJI.find_iter(text) {
        let name = m.as_str().trim_matches(':');
        let is_modifier = previous_end == Some(m.start()) && is_skin_tone_modifier(name);
        previous_end = Some(m.end());

        if name.is_empty() || is_modifier {
            continue;
        }
        names.push(name);
    }

    names
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmojiStat {
    pub inline: u64,
    pub reaction: u64,
    pub unique_reaction: u64,
}

impl EmojiStat {
    /// Times the emoji was used. Reactions count once per message no matter
    /// how many people reacted.
    pub fn total(&self) -> u64 {
        self.unique_reaction + self.inline
    }
}

/// Usage counters keyed by canonical emoji name.
#[derive(Debug, Clone, Default)]
pub struct EmojiStats {
    entries: BTreeMap<String, EmojiStat>,
}

impl EmojiStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, catalog: &EmojiCatalog, raw: &str) -> &mut EmojiStat {
        let name = catalog.canonical_name(raw);
        self.entries.entry(name.to_string()).or_default()
    }

    pub fn count_inline(&mut self, catalog: &EmojiCatalog, raw: &str) {
        self.entry(catalog, raw).inline += 1;
    }

    pub fn count_reaction(&mut self, catalog: &EmojiCatalog, reaction: &Reaction) {
        let stat = self.entry(catalog, &reaction.name);
        stat.reaction += reaction.count;
        stat.unique_reaction += 1;
    }

    pub fn count_text(&mut self, catalog: &EmojiCatalog, text: &str) {
        for name in inline_emoji(text) {
            self.count_inline(catalog, name);
        }
    }

    pub fn count_message(&mut self, catalog: &EmojiCatalog, message: &Message) {
        if let Some(text) = &message.text {
            self.count_text(catalog, text);
        }
        for reaction in &message.reactions {
            self.count_reaction(catalog, reaction);
        }
    }

    pub fn get(&self, name: &str) -> Option<&EmojiStat> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EmojiStat)> {
        self.entries.iter().map(|(name, stat)| (name.as_str(), stat))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
