use crate::text::{char_len, collapse_whitespace, strip_surrounding_quotes, strip_tokens};
use crate::types::ConversationTurn;

/// Turns must be longer than this (in characters) to count as an answer
/// without a completion marker.
pub const MIN_SUBSTANTIVE_CHARS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnAuthor {
    Expected,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPredicate {
    // Content contains the expected completion marker.
    ContainsMarker,
    // Longer than MIN_SUBSTANTIVE_CHARS.
    Substantive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStrip {
    ExpectedMarker,
    AllKnownMarkers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionRule {
    pub priority: u8,
    pub author: TurnAuthor,
    pub predicate: TurnPredicate,
    pub strip: MarkerStrip,
}

pub const DEFAULT_EXTRACTION_RULES: [ExtractionRule; 3] = [
    ExtractionRule {
        priority: 1,
        author: TurnAuthor::Expected,
        predicate: TurnPredicate::ContainsMarker,
        strip: MarkerStrip::ExpectedMarker,
    },
    ExtractionRule {
        priority: 2,
        author: TurnAuthor::Expected,
        predicate: TurnPredicate::Substantive,
        strip: MarkerStrip::ExpectedMarker,
    },
    ExtractionRule {
        priority: 3,
        author: TurnAuthor::Any,
        predicate: TurnPredicate::Substantive,
        strip: MarkerStrip::AllKnownMarkers,
    },
];

/// Picks the authoritative answer out of a multi-turn exchange.
///
/// Rules are evaluated in priority order; within a rule the newest matching
/// turn wins. The first turn of the conversation is the initiating prompt: it
/// is never a candidate and replies that merely echo it are rejected.
#[derive(Debug, Clone)]
pub struct ResultExtractor {
    rules: Vec<ExtractionRule>,
    known_markers: Vec<String>,
}

impl ResultExtractor {
    pub fn new(known_markers: Vec<String>) -> Self {
        Self::with_rules(DEFAULT_EXTRACTION_RULES.to_vec(), known_markers)
    }

    pub fn with_rules(mut rules: Vec<ExtractionRule>, known_markers: Vec<String>) -> Self {
        rules.sort_by_key(|r| r.priority);
        Self {
            rules,
            known_markers,
        }
    }

    pub fn rules(&self) -> &[ExtractionRule] {
        &self.rules
    }

    pub fn extract(
        &self,
        turns: &[ConversationTurn],
        expected_source: &str,
        marker: Option<&str>,
    ) -> Option<String> {
        let marker = marker.filter(|m| !m.trim().is_empty());
        let (first, replies) = turns.split_first()?;
        let prompt = clean(&self.strip_all_markers(&first.content, marker));

        for rule in &self.rules {
            if rule.predicate == TurnPredicate::ContainsMarker && marker.is_none() {
                continue;
            }

            for turn in replies.iter().rev() {
                if rule.author == TurnAuthor::Expected && turn.source != expected_source {
                    continue;
                }

                if let Some(text) = self.apply(rule, turn, marker, &prompt) {
                    return Some(text);
                }
            }
        }

        None
    }

    fn apply(
        &self,
        rule: &ExtractionRule,
        turn: &ConversationTurn,
        marker: Option<&str>,
        prompt: &str,
    ) -> Option<String> {
        if rule.predicate == TurnPredicate::ContainsMarker
            && !marker.is_some_and(|m| turn.content.contains(m))
        {
            return None;
        }

        let stripped = match rule.strip {
            MarkerStrip::ExpectedMarker => match marker {
                Some(m) => strip_tokens(&turn.content, &[m]).0,
                None => turn.content.clone(),
            },
            MarkerStrip::AllKnownMarkers => self.strip_all_markers(&turn.content, marker),
        };
        let text = clean(&stripped);

        let accepted = text != prompt
            && match rule.predicate {
                TurnPredicate::ContainsMarker => !text.is_empty(),
                TurnPredicate::Substantive => char_len(&text) > MIN_SUBSTANTIVE_CHARS,
            };

        accepted.then_some(text)
    }

    fn strip_all_markers(&self, content: &str, marker: Option<&str>) -> String {
        let mut tokens: Vec<&str> = self.known_markers.iter().map(String::as_str).collect();
        tokens.extend(marker);
        strip_tokens(content, &tokens).0
    }
}

impl Default for ResultExtractor {
    fn default() -> Self {
        Self::new(vec![])
    }
}

fn clean(text: &str) -> String {
    let collapsed = collapse_whitespace(text);
    strip_surrounding_quotes(&collapsed).to_string()
}
