use std::collections::HashSet;

use regex::Regex;

use crate::rules::{
    bullet_pattern, family_rules, leadin_pattern, marker_prefix_pattern,
    speaker_bracket_pattern, speaker_colon_pattern, time_anchor_pattern, time_within_pattern,
    FamilyRule, MatchKind,
};
use crate::types::ExtractedAction;

/// Deterministic, pattern-based extraction of explicit actions from
/// transcript text. Same input, byte-identical output: no scoring, no
/// randomness, no model calls.
pub struct ActionExtractor {
    families: Vec<FamilyRule>,
    time_anchor: Regex,
    time_within: Regex,
    speaker_colon: Regex,
    speaker_bracket: Regex,
    bullet: Regex,
    leadin: Regex,
    marker_prefix: Regex,
}

impl Default for ActionExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionExtractor {
    pub fn new() -> Self {
        Self {
            families: family_rules(),
            time_anchor: time_anchor_pattern(),
            time_within: time_within_pattern(),
            speaker_colon: speaker_colon_pattern(),
            speaker_bracket: speaker_bracket_pattern(),
            bullet: bullet_pattern(),
            leadin: leadin_pattern(),
            marker_prefix: marker_prefix_pattern(),
        }
    }

    /// Mine actions from transcript text plus an optional pre-parsed list.
    ///
    /// Pre-parsed items come first, accepted verbatim; then the text is
    /// scanned line by line against the family rules in order. Duplicate
    /// captures (case-insensitive on the action text) collapse to the
    /// first occurrence.
    pub fn extract(
        &self,
        text: &str,
        preparsed: &[String],
        attendees: &[String],
    ) -> Vec<ExtractedAction> {
        let mut actions: Vec<ExtractedAction> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for item in preparsed {
            let cleaned = self.bullet.replace(item.trim(), "").trim().to_string();
            if cleaned.is_empty() {
                continue;
            }
            push_unique(
                &mut actions,
                &mut seen,
                ExtractedAction {
                    related_person_ids: person_refs(&cleaned, attendees),
                    text: cleaned,
                    mentioned_by: None,
                    mentioned_time: None,
                    match_kind: MatchKind::ActionItem,
                    source_context: "provided list".into(),
                },
            );
        }

        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        for (i, line) in lines.iter().enumerate() {
            if line.chars().count() < 10 {
                continue;
            }
            let context = line_context(&lines, i);
            let speaker = self.speaker(line);

            for rule in &self.families {
                for (action_text, time) in self.apply(rule, line) {
                    push_unique(
                        &mut actions,
                        &mut seen,
                        ExtractedAction {
                            related_person_ids: person_refs(&action_text, attendees),
                            text: action_text,
                            mentioned_by: speaker.clone(),
                            mentioned_time: time,
                            match_kind: rule.kind,
                            source_context: context.clone(),
                        },
                    );
                }
            }
        }

        actions
    }

    fn apply(&self, rule: &FamilyRule, line: &str) -> Vec<(String, Option<String>)> {
        match rule.kind {
            MatchKind::ActionItem => rule
                .pattern
                .captures_iter(line)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str().trim().trim_end_matches(['.', '!', '?']).trim().to_string())
                .filter(|text| text.chars().count() >= 3)
                .map(|text| (text, None))
                .collect(),

            MatchKind::Commitment => rule
                .pattern
                .captures_iter(line)
                .filter_map(|caps| caps.get(1))
                .map(|m| self.strip_time(m.as_str()))
                .filter(|(text, _)| text.chars().count() > 5)
                .collect(),

            MatchKind::TimeBound => {
                // Anchors locate the clause; the action text is the clause
                // with the anchor, any marker or speaker prefix, and any
                // first-person lead-in removed. A commitment that carries
                // its own time anchor therefore lands on the same dedup key
                // instead of being reported twice.
                let mut anchors: Vec<(usize, usize)> = self
                    .time_anchor
                    .find_iter(line)
                    .chain(self.time_within.find_iter(line))
                    .map(|m| (m.start(), m.end()))
                    .collect();
                anchors.sort_unstable();

                anchors
                    .into_iter()
                    .map(|(start, end)| {
                        let clause = clause_around(line, start, end);
                        let clause = self.speaker_colon.replace(clause, "");
                        let clause = self.speaker_bracket.replace(&clause, "");
                        let clause = self.marker_prefix.replace(&clause, "");
                        let (stripped, time) = self.strip_time(&clause);
                        let text = normalize_span(&self.leadin.replace(&stripped, ""));
                        (text, time)
                    })
                    .filter(|(text, _)| text.chars().count() > 3)
                    .collect()
            }

            MatchKind::FollowUp => rule
                .pattern
                .captures_iter(line)
                .filter_map(|caps| caps.get(1))
                .map(|m| {
                    let (party, time) = self.strip_time(m.as_str());
                    (format!("Follow up with {party}"), time)
                })
                .filter(|(text, _)| text.chars().count() > "Follow up with ".len())
                .collect(),
        }
    }

    /// Remove the first time expression from a span, returning the cleaned
    /// span and the expression as written.
    fn strip_time(&self, span: &str) -> (String, Option<String>) {
        for re in [&self.time_anchor, &self.time_within] {
            if let Some(caps) = re.captures(span) {
                if let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) {
                    let mut remainder = String::with_capacity(span.len());
                    remainder.push_str(&span[..whole.start()]);
                    remainder.push(' ');
                    remainder.push_str(&span[whole.end()..]);
                    return (normalize_span(&remainder), Some(expr.as_str().to_string()));
                }
            }
        }
        (normalize_span(span), None)
    }

    fn speaker(&self, line: &str) -> Option<String> {
        if let Some(caps) = self.speaker_colon.captures(line) {
            return caps.get(1).map(|m| m.as_str().to_string());
        }
        if let Some(caps) = self.speaker_bracket.captures(line) {
            return caps.get(1).map(|m| m.as_str().to_string());
        }
        None
    }
}

/// Convenience wrapper when no extractor instance is at hand.
pub fn extract_actions(
    text: &str,
    preparsed: &[String],
    attendees: &[String],
) -> Vec<ExtractedAction> {
    ActionExtractor::new().extract(text, preparsed, attendees)
}

fn push_unique(
    actions: &mut Vec<ExtractedAction>,
    seen: &mut HashSet<String>,
    action: ExtractedAction,
) {
    if seen.insert(action.text.to_lowercase()) {
        actions.push(action);
    }
}

/// Attendees referenced by a span: matched by local-part-as-name (dots and
/// underscores read as spaces) or by whole email, never by anything cleverer.
fn person_refs(span: &str, attendees: &[String]) -> Vec<String> {
    let lowered = span.to_lowercase();
    let mut found = Vec::new();
    for attendee in attendees {
        let name = attendee
            .split('@')
            .next()
            .unwrap_or(attendee.as_str())
            .replace(['.', '_'], " ")
            .to_lowercase();
        let hit = (!name.is_empty() && lowered.contains(&name))
            || lowered.contains(&attendee.to_lowercase());
        if hit && !found.contains(attendee) {
            found.push(attendee.clone());
        }
    }
    found
}

/// The line plus its neighbors, capped for audit display.
fn line_context(lines: &[&str], i: usize) -> String {
    let start = i.saturating_sub(1);
    let end = (i + 2).min(lines.len());
    let joined = lines[start..end].join(" ");
    joined.chars().take(200).collect()
}

fn clause_around(line: &str, start: usize, end: usize) -> &str {
    let boundary = &['.', '!', '?', ';'][..];
    let begin = line[..start].rfind(boundary).map_or(0, |p| p + 1);
    let finish = line[end..].find(boundary).map_or(line.len(), |p| end + p);
    line[begin..finish].trim()
}

fn normalize_span(span: &str) -> String {
    span.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches([' ', ',', '.', ';', ':'])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ActionExtractor {
        ActionExtractor::new()
    }

    #[test]
    fn timed_commitment_and_marker_yield_two_actions() {
        let actions = extractor().extract(
            "I'll send the MSA by Friday. Action items: review pricing with legal.",
            &[],
            &["jane@acme.com".to_string()],
        );

        assert_eq!(actions.len(), 2, "got: {actions:#?}");

        let item = actions
            .iter()
            .find(|a| a.match_kind == MatchKind::ActionItem)
            .unwrap();
        assert_eq!(item.text, "review pricing with legal");

        let commitment = actions
            .iter()
            .find(|a| a.match_kind == MatchKind::Commitment)
            .unwrap();
        assert_eq!(commitment.text, "send the MSA");
        assert_eq!(commitment.mentioned_time.as_deref(), Some("Friday"));
    }

    #[test]
    fn extraction_is_deterministic() {
        let text = "Jane: I'll draft the proposal by Monday.\n\
                    Rob: touch base with Jane about the rollout.\n\
                    Next steps: confirm budget within 2 weeks.";
        let attendees = vec!["jane@acme.com".to_string(), "rob@acme.com".to_string()];
        let items = vec!["- send the recap".to_string()];

        let first = extractor().extract(text, &items, &attendees);
        let second = extractor().extract(text, &items, &attendees);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn verbatim_repeats_collapse_case_insensitively() {
        let actions = extractor().extract(
            "I'll circulate the notes to everyone.\nI'LL CIRCULATE THE NOTES TO EVERYONE.",
            &[],
            &[],
        );
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].text, "circulate the notes to everyone");
    }

    #[test]
    fn preparsed_items_come_first_verbatim() {
        let actions = extractor().extract(
            "I'll confirm the venue for the offsite.",
            &["• review security questionnaire".to_string()],
            &[],
        );
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].text, "review security questionnaire");
        assert_eq!(actions[0].match_kind, MatchKind::ActionItem);
        assert_eq!(actions[0].source_context, "provided list");
        assert_eq!(actions[1].match_kind, MatchKind::Commitment);
    }

    #[test]
    fn speaker_attributed_from_prefix() {
        let actions = extractor().extract("Rob: I'll send the summary to everyone.", &[], &[]);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].mentioned_by.as_deref(), Some("Rob"));

        let actions = extractor().extract("[Jane] let me check the contract terms.", &[], &[]);
        assert_eq!(actions[0].mentioned_by.as_deref(), Some("Jane"));
    }

    #[test]
    fn follow_up_party_captured() {
        let actions = extractor().extract("We should touch base with Jane by Friday.", &[], &[]);
        let follow_up = actions
            .iter()
            .find(|a| a.match_kind == MatchKind::FollowUp)
            .unwrap();
        assert_eq!(follow_up.text, "Follow up with Jane");
        assert_eq!(follow_up.mentioned_time.as_deref(), Some("Friday"));
    }

    #[test]
    fn within_expression_is_time_bound() {
        let actions = extractor().extract("Deliver the audit results within 3 days.", &[], &[]);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].match_kind, MatchKind::TimeBound);
        assert_eq!(actions[0].text, "Deliver the audit results");
        assert_eq!(actions[0].mentioned_time.as_deref(), Some("3 days"));
    }

    #[test]
    fn person_references_resolved_from_attendees() {
        let attendees = vec!["jane.doe@acme.com".to_string(), "rob@other.com".to_string()];
        let actions = extractor().extract("I'll sync the numbers with Jane Doe today.", &[], &attendees);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].related_person_ids, vec!["jane.doe@acme.com"]);
    }

    #[test]
    fn short_and_blank_lines_are_skipped() {
        let actions = extractor().extract("ok.\n\nyes\nto-do: x", &[], &[]);
        assert!(actions.is_empty());
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(extractor().extract("", &[], &[]).is_empty());
    }

    #[test]
    fn source_context_includes_neighbor_lines() {
        let actions = extractor().extract(
            "Intro chatter before the decision.\nI'll update the forecast spreadsheet.\nThanks everyone.",
            &[],
            &[],
        );
        assert_eq!(actions.len(), 1);
        assert!(actions[0].source_context.contains("Intro chatter"));
        assert!(actions[0].source_context.contains("Thanks everyone."));
    }
}
