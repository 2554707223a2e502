//! The extraction pattern table.
//!
//! Coverage lives here as data: one compiled pattern per family, applied in
//! a fixed order, so each rule can be audited and tested on its own. No
//! scoring, no inference; a rule either matches a line or it does not.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which pattern family produced an extracted action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    ActionItem,
    Commitment,
    TimeBound,
    FollowUp,
}

/// A pattern family: the kind it classifies as, and the regex that fires it.
pub struct FamilyRule {
    pub kind: MatchKind,
    pub pattern: Regex,
}

/// The four families, in application order. Explicit markers first, then
/// first-person commitments, then time-anchored statements, then follow-up
/// phrases.
pub fn family_rules() -> Vec<FamilyRule> {
    vec![
        FamilyRule {
            kind: MatchKind::ActionItem,
            pattern: Regex::new(r"(?i)\b(?:action items?|to-?do|task|next steps?)\s*:\s*(.+)")
                .expect("valid pattern"),
        },
        FamilyRule {
            kind: MatchKind::Commitment,
            pattern: Regex::new(
                r"(?i)\b(?:i['’]ll|i will|i['’]m going to|we['’]ll|we will|we['’]re going to|let me)\s+([^.!?]+)",
            )
            .expect("valid pattern"),
        },
        FamilyRule {
            kind: MatchKind::TimeBound,
            // The anchor itself; the surrounding clause is recovered by the
            // extractor and the anchor stripped out of the action text.
            pattern: time_anchor_pattern(),
        },
        FamilyRule {
            kind: MatchKind::FollowUp,
            pattern: Regex::new(
                r"(?i)\b(?:follow[- ]?up with|reach out to|get back to|touch base with|check in with|schedule (?:a )?(?:call|meeting|sync) with)\s+([^.!?]+)",
            )
            .expect("valid pattern"),
        },
    ]
}

const TIME_EXPR: &str = r"(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday|tomorrow|end of (?:day|week|month)|eod|eow|eom|\d{1,2}[/-]\d{1,2})";

/// "by <time>" / "before <time>", capturing the time expression.
pub fn time_anchor_pattern() -> Regex {
    Regex::new(&format!(r"(?i)\b(?:by|before)\s+({TIME_EXPR})\b")).expect("valid pattern")
}

/// "within N days" / "in 2 weeks", capturing the quantity expression.
pub fn time_within_pattern() -> Regex {
    Regex::new(r"(?i)\b(?:within|in)\s+(\d+\s+(?:days?|weeks?|hours?))\b").expect("valid pattern")
}

/// "Name:" speaker prefix. Requires capitalized word(s) followed by a colon.
pub fn speaker_colon_pattern() -> Regex {
    Regex::new(r"^([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)\s*:\s*").expect("valid pattern")
}

/// "[Name]" speaker prefix.
pub fn speaker_bracket_pattern() -> Regex {
    Regex::new(r"^\[([^\]]+)\]\s*").expect("valid pattern")
}

/// Leading bullet glyphs on pre-parsed items.
pub fn bullet_pattern() -> Regex {
    Regex::new(r"^[-•*]\s*").expect("valid pattern")
}

/// First-person lead-in, stripped when normalizing a time-bound clause so
/// it collapses onto the matching commitment in the dedup set.
pub fn leadin_pattern() -> Regex {
    Regex::new(
        r"(?i)^(?:i['’]ll|i will|i['’]m going to|we['’]ll|we will|we['’]re going to|let me)\s+",
    )
    .expect("valid pattern")
}

/// Explicit marker prefix, stripped when normalizing a time-bound clause.
pub fn marker_prefix_pattern() -> Regex {
    Regex::new(r"(?i)^(?:action items?|to-?do|task|next steps?)\s*:\s*").expect("valid pattern")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_are_ordered() {
        let kinds: Vec<MatchKind> = family_rules().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MatchKind::ActionItem,
                MatchKind::Commitment,
                MatchKind::TimeBound,
                MatchKind::FollowUp
            ]
        );
    }

    #[test]
    fn action_item_marker_captures_remainder() {
        let rules = family_rules();
        let caps = rules[0]
            .pattern
            .captures("Next steps: circulate the draft")
            .unwrap();
        assert_eq!(&caps[1], "circulate the draft");
    }

    #[test]
    fn commitment_matches_contractions_and_plain_forms() {
        let rule = &family_rules()[1];
        for line in [
            "I'll send the invoice",
            "I will send the invoice",
            "we're going to revisit pricing",
            "Let me check with finance",
        ] {
            assert!(rule.pattern.is_match(line), "no match: {line}");
        }
        assert!(!rule.pattern.is_match("They will send the invoice... maybe"));
    }

    #[test]
    fn time_anchor_captures_expression() {
        let caps = time_anchor_pattern().captures("send it by Friday please").unwrap();
        assert_eq!(&caps[1], "Friday");
        let caps = time_anchor_pattern().captures("done before eow").unwrap();
        assert_eq!(&caps[1], "eow");
        let caps = time_anchor_pattern().captures("ship by 8/14").unwrap();
        assert_eq!(&caps[1], "8/14");
        assert!(time_anchor_pattern().captures("by the way").is_none());
    }

    #[test]
    fn time_within_captures_quantity() {
        let caps = time_within_pattern().captures("circle back within 3 days").unwrap();
        assert_eq!(&caps[1], "3 days");
    }

    #[test]
    fn follow_up_requires_a_party() {
        let rule = &family_rules()[3];
        let caps = rule.pattern.captures("touch base with Jane next time").unwrap();
        assert_eq!(&caps[1], "Jane next time");
        assert!(!rule.pattern.is_match("we should follow up at some point"));
    }

    #[test]
    fn speaker_prefixes() {
        let caps = speaker_colon_pattern().captures("Jane Doe: I'll do it").unwrap();
        assert_eq!(&caps[1], "Jane Doe");
        // A lowercase second word is not a name
        assert!(speaker_colon_pattern().captures("Action items: do it").is_none());
        let caps = speaker_bracket_pattern().captures("[Jane] I'll do it").unwrap();
        assert_eq!(&caps[1], "Jane");
    }
}
