//! Keyword-based intent classification for a context extraction question.
//!
//! Mirrors the shape of a search-intent classifier: ordered keyword buckets,
//! first match wins, with a fallback default for ambiguous questions.

use serde::{Deserialize, Serialize};

/// Extraction strategy, chosen by [`Intent::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// "how does X work", "what is Y", "explain Z" -- architectural overview.
    Explain,
    /// "what breaks if", "impact of", "downstream of" -- blast radius.
    Impact,
    /// "where is X", "find the file for Y" -- pinpoint a single definition.
    Locate,
    /// "list all X", "every Y" -- enumeration over a type or pattern.
    List,
    /// "callers of X", "path from A to B" -- call/reference graph traversal.
    Navigate,
    /// No keyword bucket matched; balanced default weights.
    Default,
}

/// The result of classifying a question, with a confidence in [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct ClassifiedIntent {
    pub intent: Intent,
    pub confidence: f64,
}

impl Intent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Explain => "explain",
            Intent::Impact => "impact",
            Intent::Locate => "locate",
            Intent::List => "list",
            Intent::Navigate => "navigate",
            Intent::Default => "default",
        }
    }

    /// Classify a question into an intent, highest-precedence bucket first.
    ///
    /// Bucket order matters: "what breaks if I rename this" should read as
    /// Impact, not Explain, even though it contains "what".
    #[must_use]
    pub fn classify(question: &str) -> ClassifiedIntent {
        let q = question.to_lowercase();

        const IMPACT: &[&str] = &[
            "impact", "break", "breaks", "affect", "blast radius", "downstream",
            "ripple", "if i change", "if i remove", "depends on it",
        ];
        const NAVIGATE: &[&str] = &[
            "caller", "callers", "callee", "callees", "who calls", "calls into",
            "path from", "path between", "trace the call", "call chain",
        ];
        const LOCATE: &[&str] = &[
            "where is", "where does", "which file", "locate", "find the definition",
            "show me where",
        ];
        const LIST: &[&str] = &[
            "list all", "list every", "enumerate", "all functions", "all classes",
            "every occurrence",
        ];
        const EXPLAIN: &[&str] = &[
            "how does", "how do", "what is", "what does", "why does", "explain",
            "understand", "describe", "overview", "architecture", "works",
        ];

        let buckets: [(Intent, &[&str]); 5] = [
            (Intent::Impact, IMPACT),
            (Intent::Navigate, NAVIGATE),
            (Intent::Locate, LOCATE),
            (Intent::List, LIST),
            (Intent::Explain, EXPLAIN),
        ];

        for (intent, keywords) in buckets {
            let hits = keywords.iter().filter(|kw| q.contains(*kw)).count();
            if hits > 0 {
                let confidence = (0.6 + 0.15 * hits as f64).min(0.95);
                return ClassifiedIntent { intent, confidence };
            }
        }

        ClassifiedIntent {
            intent: Intent::Default,
            confidence: 0.3,
        }
    }

    /// Pipeline overrides this intent applies on top of [`super::models::ExtractionConfig`]
    /// defaults. `None` means "leave the configured value alone".
    #[must_use]
    pub fn strategy(self) -> StrategyOverrides {
        match self {
            Intent::Explain => StrategyOverrides {
                expand_depth: Some(2),
                exclude_tests: Some(true),
                include_parent: Some(true),
            },
            Intent::Impact => StrategyOverrides {
                expand_depth: Some(2),
                exclude_tests: Some(true),
                include_parent: Some(false),
            },
            Intent::Locate => StrategyOverrides {
                expand_depth: Some(0),
                exclude_tests: Some(false),
                include_parent: Some(false),
            },
            Intent::List => StrategyOverrides {
                expand_depth: Some(0),
                exclude_tests: Some(false),
                include_parent: Some(false),
            },
            Intent::Navigate => StrategyOverrides {
                expand_depth: Some(3),
                exclude_tests: Some(true),
                include_parent: Some(false),
            },
            Intent::Default => StrategyOverrides {
                expand_depth: None,
                exclude_tests: None,
                include_parent: None,
            },
        }
    }
}

/// Per-intent deltas applied to the caller's [`super::models::ExtractionConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyOverrides {
    pub expand_depth: Option<u32>,
    pub exclude_tests: Option<bool>,
    pub include_parent: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_explain() {
        let c = Intent::classify("how does authentication work?");
        assert_eq!(c.intent, Intent::Explain);
    }

    #[test]
    fn test_classify_impact() {
        let c = Intent::classify("what breaks if I remove AuthService?");
        assert_eq!(c.intent, Intent::Impact);
    }

    #[test]
    fn test_classify_navigate() {
        let c = Intent::classify("who calls login?");
        assert_eq!(c.intent, Intent::Navigate);
    }

    #[test]
    fn test_classify_locate() {
        let c = Intent::classify("where is AuthService defined?");
        assert_eq!(c.intent, Intent::Locate);
    }

    #[test]
    fn test_classify_list() {
        let c = Intent::classify("list all classes in the auth module");
        assert_eq!(c.intent, Intent::List);
    }

    #[test]
    fn test_classify_default_on_bare_identifier() {
        let c = Intent::classify("AuthService");
        assert_eq!(c.intent, Intent::Default);
        assert!(c.confidence < 0.5);
    }

    #[test]
    fn test_navigate_strategy_has_deeper_expansion() {
        let strategy = Intent::Navigate.strategy();
        assert_eq!(strategy.expand_depth, Some(3));
    }

    #[test]
    fn test_default_strategy_overrides_nothing() {
        let strategy = Intent::Default.strategy();
        assert!(strategy.expand_depth.is_none());
        assert!(strategy.exclude_tests.is_none());
    }
}
