//! Safety/interaction gate (spec §4.10, C10 pure half): an ordered chain of
//! rewrite rules applied to every outbound spoken response before it reaches
//! the TTS provider.
//!
//! Kept deliberately open-ended ([`SafetyRule`] objects in a `Vec`) per the
//! Open Question decision recorded in `DESIGN.md`: more rules can be
//! appended without touching the four specified here.

use chrono::{DateTime, Duration, Utc};

/// Where a candidate response text originated, relevant to rule 1 (P0
/// suppression of low-confidence directional imperatives only applies to
/// model-generated dialogue, not literal sensor alerts).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    DialogueEngine,
    SensorAlert,
    DigitalTaskResult,
}

/// The most recent P0 (obstacle/hazard) alert, if any, used by rule 4's
/// conflict check (spec §4.10: "a directional instruction must not
/// contradict a P0 hint issued within the last 10s").
#[derive(Debug, Clone)]
pub struct RecentP0Hint {
    pub text: String,
    pub issued_at: DateTime<Utc>,
}

/// Everything a [`SafetyRule`] needs to judge one candidate response.
#[derive(Debug, Clone)]
pub struct SafetyContext {
    pub source: ResponseSource,
    pub confidence: f32,
    pub now: DateTime<Utc>,
    pub recent_p0_hint: Option<RecentP0Hint>,
    pub max_response_chars: usize,
}

/// One rule's verdict: the (possibly rewritten) text, and whether it changed
/// anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyResult {
    pub text: String,
    pub downgraded: bool,
    pub applied_rule_ids: Vec<&'static str>,
}

impl SafetyResult {
    fn passthrough(text: String) -> Self {
        Self {
            text,
            downgraded: false,
            applied_rule_ids: Vec::new(),
        }
    }
}

/// One ordered step of the safety/interaction gate.
pub trait SafetyRule: Send + Sync {
    /// Stable identifier recorded into [`SafetyAudit::rule_ids`].
    fn id(&self) -> &'static str;

    /// Inspect (and possibly rewrite) `text`. Returns `None` if the rule did
    /// not touch this response.
    fn apply(&self, text: &str, ctx: &SafetyContext) -> Option<String>;
}

/// Rule 1 — P0 stop-and-confirm preamble: any response sourced from a
/// low-confidence dialogue turn that contains a directional imperative
/// ("turn left", "go straight", "step forward") is suppressed entirely and
/// replaced with a confirmation prompt, because acting on it could steer
/// the user into a hazard the system isn't sure about.
pub struct SuppressLowConfidenceDirectives {
    pub confidence_floor: f32,
}

const DIRECTIONAL_IMPERATIVES: &[&str] = &[
    "turn left",
    "turn right",
    "go straight",
    "go forward",
    "step forward",
    "step back",
    "move forward",
    "walk forward",
    "proceed",
];

fn contains_directional_imperative(text: &str) -> bool {
    let lower = text.to_lowercase();
    DIRECTIONAL_IMPERATIVES.iter().any(|phrase| lower.contains(phrase))
}

impl SafetyRule for SuppressLowConfidenceDirectives {
    fn id(&self) -> &'static str {
        "suppress_low_confidence_directives"
    }

    fn apply(&self, text: &str, ctx: &SafetyContext) -> Option<String> {
        if ctx.source != ResponseSource::DialogueEngine {
            return None;
        }
        if ctx.confidence >= self.confidence_floor {
            return None;
        }
        if !contains_directional_imperative(text) {
            return None;
        }
        Some("I'm not confident enough to give directions right now. Could you confirm what you'd like me to do?".to_string())
    }
}

/// Rule 2 — low-confidence softening: below the floor but without a
/// directional imperative, prefix with a hedge rather than suppressing.
pub struct SoftenLowConfidence {
    pub confidence_floor: f32,
}

impl SafetyRule for SoftenLowConfidence {
    fn id(&self) -> &'static str {
        "soften_low_confidence"
    }

    fn apply(&self, text: &str, ctx: &SafetyContext) -> Option<String> {
        if ctx.source != ResponseSource::DialogueEngine || ctx.confidence >= self.confidence_floor {
            return None;
        }
        if text.to_lowercase().starts_with("i think") || text.to_lowercase().starts_with("i'm not sure") {
            return None;
        }
        Some(format!("I think {}", lowercase_first(text)))
    }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Rule 3 — length cap with sentence-boundary truncation: spoken responses
/// longer than `max_response_chars` are cut at the nearest preceding
/// sentence boundary (`.`, `!`, `?`) rather than mid-word.
pub struct CapLength;

impl SafetyRule for CapLength {
    fn id(&self) -> &'static str {
        "cap_length"
    }

    fn apply(&self, text: &str, ctx: &SafetyContext) -> Option<String> {
        if text.chars().count() <= ctx.max_response_chars {
            return None;
        }
        let truncated: String = text.chars().take(ctx.max_response_chars).collect();
        let cut = truncated
            .rfind(['.', '!', '?'])
            .map_or_else(|| truncated.clone(), |idx| truncated[..=idx].to_string());
        if cut.trim().is_empty() {
            Some(truncated)
        } else {
            Some(cut)
        }
    }
}

/// Rule 4 — conflict detection: a directional instruction must not
/// contradict a P0 hazard hint issued within the last 10 seconds. When it
/// does, the P0 hint wins and the new response is replaced with a
/// re-assertion of the hazard.
pub struct ConflictWithRecentP0 {
    pub window: Duration,
}

impl Default for ConflictWithRecentP0 {
    fn default() -> Self {
        Self {
            window: Duration::seconds(10),
        }
    }
}

impl SafetyRule for ConflictWithRecentP0 {
    fn id(&self) -> &'static str {
        "conflict_with_recent_p0"
    }

    fn apply(&self, text: &str, ctx: &SafetyContext) -> Option<String> {
        let hint = ctx.recent_p0_hint.as_ref()?;
        if ctx.now - hint.issued_at > self.window {
            return None;
        }
        if !contains_directional_imperative(text) {
            return None;
        }
        Some(format!("{} Please proceed carefully.", hint.text))
    }
}

/// A per-invocation audit record: every safety-gate call produces one, even
/// when no rule fired (spec §4.10: "every invocation, not only downgraded
/// ones, is recorded").
#[derive(Debug, Clone)]
pub struct SafetyAudit {
    pub trace_id: String,
    pub source: ResponseSource,
    pub downgraded: bool,
    pub rule_ids: Vec<&'static str>,
}

/// The default ordered rule chain (spec §4.10 rules 1-4, in order).
#[must_use]
pub fn default_rules(confidence_floor: f32) -> Vec<Box<dyn SafetyRule>> {
    vec![
        Box::new(SuppressLowConfidenceDirectives { confidence_floor }),
        Box::new(SoftenLowConfidence { confidence_floor }),
        Box::new(CapLength),
        Box::new(ConflictWithRecentP0::default()),
    ]
}

/// Run `text` through `rules` in order, short-circuiting to rule 1's
/// suppression but otherwise letting every subsequent rule see the output
/// of the one before it. Returns the final text plus an audit record keyed
/// by `trace_id`.
#[must_use]
pub fn apply_safety_rules(
    text: &str,
    ctx: &SafetyContext,
    rules: &[Box<dyn SafetyRule>],
    trace_id: String,
) -> (SafetyResult, SafetyAudit) {
    let mut current = text.to_string();
    let mut downgraded = false;
    let mut applied_rule_ids = Vec::new();

    for rule in rules {
        if let Some(rewritten) = rule.apply(&current, ctx) {
            downgraded = true;
            applied_rule_ids.push(rule.id());
            current = rewritten;
        }
    }

    if downgraded {
        tracing::debug!(trace_id = %trace_id, rule_ids = ?applied_rule_ids, "safety gate downgraded response");
    }

    let audit = SafetyAudit {
        trace_id,
        source: ctx.source,
        downgraded,
        rule_ids: applied_rule_ids.clone(),
    };

    (
        SafetyResult {
            text: current,
            downgraded,
            applied_rule_ids,
        },
        audit,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(source: ResponseSource, confidence: f32) -> SafetyContext {
        SafetyContext {
            source,
            confidence,
            now: Utc::now(),
            recent_p0_hint: None,
            max_response_chars: 200,
        }
    }

    #[test]
    fn low_confidence_directive_is_suppressed() {
        let rules = default_rules(0.6);
        let (result, audit) = apply_safety_rules(
            "turn left at the corner",
            &ctx(ResponseSource::DialogueEngine, 0.3),
            &rules,
            "trace-1".to_string(),
        );
        assert!(result.downgraded);
        assert!(audit.downgraded);
        assert!(result.text.contains("not confident"));
        assert_eq!(audit.rule_ids[0], "suppress_low_confidence_directives");
    }

    #[test]
    fn non_directive_low_confidence_is_softened_not_suppressed() {
        let rules = default_rules(0.6);
        let (result, _audit) = apply_safety_rules(
            "there is a bench nearby",
            &ctx(ResponseSource::DialogueEngine, 0.3),
            &rules,
            "trace-2".to_string(),
        );
        assert!(result.text.starts_with("I think"));
    }

    #[test]
    fn high_confidence_passes_through_unmodified() {
        let rules = default_rules(0.6);
        let (result, audit) = apply_safety_rules(
            "there is a bench nearby",
            &ctx(ResponseSource::DialogueEngine, 0.95),
            &rules,
            "trace-3".to_string(),
        );
        assert!(!result.downgraded);
        assert!(!audit.downgraded);
        assert_eq!(result.text, "there is a bench nearby");
    }

    #[test]
    fn overlong_response_truncates_at_sentence_boundary() {
        let rules: Vec<Box<dyn SafetyRule>> = vec![Box::new(CapLength)];
        let mut c = ctx(ResponseSource::DigitalTaskResult, 1.0);
        c.max_response_chars = 20;
        let (result, _audit) = apply_safety_rules(
            "Short first bit. This part runs long past the cap.",
            &c,
            &rules,
            "trace-4".to_string(),
        );
        assert_eq!(result.text, "Short first bit.");
    }

    #[test]
    fn directional_conflicting_with_recent_p0_is_overridden() {
        let rules: Vec<Box<dyn SafetyRule>> = vec![Box::new(ConflictWithRecentP0::default())];
        let now = Utc::now();
        let mut c = ctx(ResponseSource::DialogueEngine, 0.9);
        c.now = now;
        c.recent_p0_hint = Some(RecentP0Hint {
            text: "Obstacle detected ahead.".to_string(),
            issued_at: now - Duration::seconds(3),
        });
        let (result, audit) = apply_safety_rules("go straight", &c, &rules, "trace-5".to_string());
        assert!(audit.downgraded);
        assert!(result.text.starts_with("Obstacle detected ahead."));
    }

    #[test]
    fn stale_p0_hint_outside_window_does_not_conflict() {
        let rules: Vec<Box<dyn SafetyRule>> = vec![Box::new(ConflictWithRecentP0::default())];
        let now = Utc::now();
        let mut c = ctx(ResponseSource::DialogueEngine, 0.9);
        c.now = now;
        c.recent_p0_hint = Some(RecentP0Hint {
            text: "Obstacle detected ahead.".to_string(),
            issued_at: now - Duration::seconds(30),
        });
        let (result, audit) = apply_safety_rules("go straight", &c, &rules, "trace-6".to_string());
        assert!(!audit.downgraded);
        assert_eq!(result.text, "go straight");
    }

    #[test]
    fn every_invocation_produces_an_audit_even_when_nothing_fires() {
        let rules = default_rules(0.6);
        let (_result, audit) = apply_safety_rules(
            "all clear",
            &ctx(ResponseSource::SensorAlert, 1.0),
            &rules,
            "trace-7".to_string(),
        );
        assert!(audit.rule_ids.is_empty());
        assert!(!audit.downgraded);
        assert_eq!(audit.trace_id, "trace-7");
    }
}
