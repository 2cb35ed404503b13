//! Validation of generator output.
//!
//! The generator replies with free text.  [`parse_question`] is the only
//! place that turns that text into a [`QuestionResult`]; anything that does
//! not satisfy the question contract is replaced by [`fallback_question`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::behavior::Difficulty;

pub const OPTION_COUNT: usize = 4;
const DEFAULT_CATEGORY: &str = "技術";

/// A multiple-choice question ready to be shown to a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question: String,
    pub options: Vec<String>,
    pub answer: u8,
    pub explanation: String,
    /// Always the tier that was requested.
    pub difficulty: Difficulty,
    pub category: String,
}

/// Greedy: first `{` through last `}` across lines.
static JSON_OBJECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

#[derive(Debug, PartialEq, Eq)]
enum Violation {
    NoObject,
    Json,
    Question,
    Options,
    Answer,
}

impl Violation {
    fn code(&self) -> &'static str {
        match self {
            Violation::NoObject => "no_object",
            Violation::Json => "invalid_json",
            Violation::Question => "question",
            Violation::Options => "options",
            Violation::Answer => "answer",
        }
    }
}

/// Extract and validate a question from untrusted text.  Never fails: any
/// contract violation yields the fallback question.
pub fn parse_question(text: &str, requested: Difficulty) -> QuestionResult {
    parse_question_checked(text, requested).0
}

/// Same as [`parse_question`] but reports whether the fallback was used.
pub fn parse_question_checked(text: &str, requested: Difficulty) -> (QuestionResult, bool) {
    match try_parse(text, requested) {
        Ok(q) => (q, false),
        Err(v) => {
            tracing::warn!(
                violation = v.code(),
                response_len = text.len(),
                "generated question rejected, serving fallback"
            );
            (fallback_question(), true)
        }
    }
}

fn try_parse(text: &str, requested: Difficulty) -> Result<QuestionResult, Violation> {
    let raw = JSON_OBJECT_RE
        .find(text)
        .map(|m| m.as_str())
        .ok_or(Violation::NoObject)?;
    let value: Value = serde_json::from_str(raw).map_err(|_| Violation::Json)?;

    let question = value
        .get("question")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
        .ok_or(Violation::Question)?
        .to_string();

    let options = value
        .get("options")
        .and_then(Value::as_array)
        .filter(|opts| opts.len() == OPTION_COUNT)
        .ok_or(Violation::Options)?
        .iter()
        .map(|o| o.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or(Violation::Options)?;

    let answer = value
        .get("answer")
        .and_then(answer_index)
        .filter(|a| usize::from(*a) < OPTION_COUNT)
        .ok_or(Violation::Answer)?;

    let explanation = value
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let category = value
        .get("category")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string();

    Ok(QuestionResult {
        question,
        options,
        answer,
        explanation,
        difficulty: requested,
        category,
    })
}

fn answer_index(v: &Value) -> Option<u8> {
    match v {
        Value::Number(n) => match n.as_u64() {
            Some(i) => u8::try_from(i).ok(),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && (0.0..=f64::from(u8::MAX)).contains(f))
                .map(|f| f as u8),
        },
        Value::String(s) => s.trim().parse::<u8>().ok(),
        _ => None,
    }
}

/// Hand-written question served whenever generated output is unusable.
pub fn fallback_question() -> QuestionResult {
    QuestionResult {
        question: "在軟體開發中，「技術債」（Technical Debt）最貼切的定義是什麼？".into(),
        options: vec![
            "為了短期交付速度而採用的權宜做法，未來需要額外成本重構或修正".into(),
            "公司購買開發工具與雲端服務所累積的財務負債".into(),
            "開發團隊尚未完成的功能需求清單".into(),
            "程式碼中所有尚未修復的 bug 總數".into(),
        ],
        answer: 0,
        explanation: "技術債是指為了快速交付而選擇較不理想的實作，之後必須投入時間重構、補測試或修正設計，就像借款需要付利息。".into(),
        difficulty: Difficulty::Medium,
        category: "軟體工程".into(),
    }
}
