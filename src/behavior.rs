//! Behaviour analysis: turns a candidate's running telemetry into a pattern,
//! a suspicion flag and a difficulty recommendation.
//!
//! The analysis is a pure function of [`BehaviorMetrics`]; identical input
//! always yields an identical [`BehaviorAnalysis`].

use serde::{Deserialize, Serialize};
use std::fmt;

// Policy thresholds.  Tuning these changes behaviour, not the wire contract.
pub const RUSHING_MAX_AVG_SECS: f64 = 3.0;
pub const RUSHING_MIN_QUESTIONS: u32 = 3;
pub const QUICK_MAX_AVG_SECS: f64 = 10.0;
pub const THOUGHTFUL_MIN_AVG_SECS: f64 = 45.0;
pub const ADVANCED_MIN_RATE: f64 = 0.8;
pub const BASIC_MAX_RATE: f64 = 0.4;
pub const HESITANT_CHANGE_RATIO: f64 = 0.3;

const INSIGHT_FIRST_CONTACT: &str = "讓我們開始了解你吧！";
const INSIGHT_RUSHING: &str = "放慢腳步，仔細閱讀每個題目！";
const INSIGHT_QUICK: &str = "你的反應很快！";
const INSIGHT_THOUGHTFUL: &str = "你很謹慎思考每個問題";
const INSIGHT_ADVANCED: &str = "看來這些題目對你來說太簡單了，讓我出點有挑戰性的！";
const INSIGHT_BASIC: &str = "沒關係，讓我換個角度問問看";
const INSIGHT_HESITANT: &str = "相信你的第一直覺！";
const INSIGHT_DEFAULT: &str = "繼續保持！";

/// Snapshot of how a candidate has been answering so far.  Supplied by the
/// caller on every request; missing fields take the documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorMetrics {
    #[serde(default = "default_avg_response", alias = "avgResponseTime")]
    pub avg_response_time_seconds: f64,
    #[serde(default = "default_correct_rate")]
    pub correct_rate: f64,
    #[serde(default)]
    pub consecutive_correct: u32,
    #[serde(default)]
    pub consecutive_wrong: u32,
    #[serde(default)]
    pub change_count: u32,
    #[serde(default)]
    pub question_count: u32,
    #[serde(default)]
    pub question_index: u32,
    #[serde(default = "default_total_questions")]
    pub total_questions: u32,
}

fn default_avg_response() -> f64 {
    30.0
}
fn default_correct_rate() -> f64 {
    0.5
}
fn default_total_questions() -> u32 {
    12
}

impl Default for BehaviorMetrics {
    fn default() -> Self {
        Self {
            avg_response_time_seconds: default_avg_response(),
            correct_rate: default_correct_rate(),
            consecutive_correct: 0,
            consecutive_wrong: 0,
            change_count: 0,
            question_count: 0,
            question_index: 0,
            total_questions: default_total_questions(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    Normal,
    Quick,
    Thoughtful,
    Hesitant,
    Rushing,
}

impl Pattern {
    pub fn label(&self) -> &'static str {
        match self {
            Pattern::Normal => "normal",
            Pattern::Quick => "quick",
            Pattern::Thoughtful => "thoughtful",
            Pattern::Hesitant => "hesitant",
            Pattern::Rushing => "rushing",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Question difficulty tier.  Serialised with the Traditional Chinese labels
/// used in prompts; the English names are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    #[serde(rename = "基礎", alias = "basic")]
    Basic,
    #[serde(rename = "中等", alias = "medium")]
    Medium,
    #[serde(rename = "進階", alias = "advanced")]
    Advanced,
}

impl Difficulty {
    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Basic => "基礎",
            Difficulty::Medium => "中等",
            Difficulty::Advanced => "進階",
        }
    }

    /// Parse a caller supplied tier.  Accepts the Chinese labels and the
    /// English names, case-insensitively for the latter.
    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim() {
            "基礎" => Some(Difficulty::Basic),
            "中等" => Some(Difficulty::Medium),
            "進階" => Some(Difficulty::Advanced),
            other => match other.to_ascii_lowercase().as_str() {
                "basic" => Some(Difficulty::Basic),
                "medium" => Some(Difficulty::Medium),
                "advanced" => Some(Difficulty::Advanced),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorAnalysis {
    pub pattern: Pattern,
    pub is_suspicious: bool,
    pub suggested_difficulty: Difficulty,
    pub insight: String,
}

/// Classify a metrics snapshot.  `None` means the caller has no history yet.
pub fn analyze(metrics: Option<&BehaviorMetrics>) -> BehaviorAnalysis {
    let Some(m) = metrics else {
        return BehaviorAnalysis {
            pattern: Pattern::Normal,
            is_suspicious: false,
            suggested_difficulty: Difficulty::Medium,
            insight: INSIGHT_FIRST_CONTACT.to_string(),
        };
    };

    let mut pattern = Pattern::Normal;
    let mut is_suspicious = false;
    let mut suggested_difficulty = Difficulty::Medium;
    let mut fragments: Vec<&'static str> = Vec::new();

    if m.avg_response_time_seconds < RUSHING_MAX_AVG_SECS && m.question_count > RUSHING_MIN_QUESTIONS
    {
        pattern = Pattern::Rushing;
        is_suspicious = true;
        fragments.push(INSIGHT_RUSHING);
    } else if m.avg_response_time_seconds < QUICK_MAX_AVG_SECS {
        pattern = Pattern::Quick;
        fragments.push(INSIGHT_QUICK);
    } else if m.avg_response_time_seconds > THOUGHTFUL_MIN_AVG_SECS {
        pattern = Pattern::Thoughtful;
        fragments.push(INSIGHT_THOUGHTFUL);
    }

    if m.correct_rate > ADVANCED_MIN_RATE {
        suggested_difficulty = Difficulty::Advanced;
        fragments.push(INSIGHT_ADVANCED);
    } else if m.correct_rate < BASIC_MAX_RATE {
        suggested_difficulty = Difficulty::Basic;
        fragments.push(INSIGHT_BASIC);
    }

    // Applied last so it wins the pattern field over any speed class.
    if f64::from(m.change_count) > f64::from(m.question_count) * HESITANT_CHANGE_RATIO {
        pattern = Pattern::Hesitant;
        fragments.push(INSIGHT_HESITANT);
    }

    let insight = if fragments.is_empty() {
        INSIGHT_DEFAULT.to_string()
    } else {
        fragments.join(" ")
    };

    BehaviorAnalysis {
        pattern,
        is_suspicious,
        suggested_difficulty,
        insight,
    }
}
