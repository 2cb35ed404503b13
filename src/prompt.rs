//! Prompt rendering for question generation.
//!
//! The renderer is a pure template: the same [`GenerationRequest`] always
//! produces byte-identical text.

use std::fmt::Write as _;

use crate::behavior::{BehaviorAnalysis, Difficulty, Pattern};
use crate::position::resolve_tech_domain;

/// Only this many of the most recent previous questions are rendered.
pub const MAX_PREVIOUS_QUESTIONS: usize = 10;

/// Everything the prompt needs, resolved up front.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub position: String,
    pub tech_domain: &'static str,
    pub difficulty: Difficulty,
    pub pattern: Pattern,
    pub previous_questions: Vec<String>,
}

impl GenerationRequest {
    /// Resolve the domain, pick the target difficulty (explicit override wins
    /// over the analyser's suggestion) and keep the newest previous questions.
    pub fn new(
        position: &str,
        analysis: &BehaviorAnalysis,
        previous_questions: &[String],
        difficulty_override: Option<Difficulty>,
    ) -> Self {
        let skip = previous_questions
            .len()
            .saturating_sub(MAX_PREVIOUS_QUESTIONS);
        Self {
            position: position.to_string(),
            tech_domain: resolve_tech_domain(position),
            difficulty: difficulty_override.unwrap_or(analysis.suggested_difficulty),
            pattern: analysis.pattern,
            previous_questions: previous_questions[skip..].to_vec(),
        }
    }
}

pub fn build_prompt(req: &GenerationRequest) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("你是 SMAI 技術人才測驗系統的出題 AI。請根據以下條件生成一道選擇題：\n\n");
    writeln!(out, "職位：{}", req.position).ok();
    writeln!(out, "技術領域：{}", req.tech_domain).ok();
    writeln!(out, "難度：{}", req.difficulty).ok();
    writeln!(out, "考生行為模式：{}", req.pattern).ok();

    if !req.previous_questions.is_empty() {
        out.push_str("\n已經問過的題目（請勿重複）：\n");
        for (i, q) in req.previous_questions.iter().enumerate() {
            writeln!(out, "{}. {}", i + 1, q).ok();
        }
    }

    out.push_str("\n請用以下 JSON 格式回覆（只回覆一個 JSON 物件，不要任何其他文字）：\n");
    out.push_str("{\n");
    out.push_str("  \"question\": \"題目內容\",\n");
    out.push_str("  \"options\": [\"選項A\", \"選項B\", \"選項C\", \"選項D\"],\n");
    out.push_str("  \"answer\": 0,\n");
    out.push_str("  \"explanation\": \"答案解釋\",\n");
    writeln!(out, "  \"difficulty\": \"{}\",", req.difficulty).ok();
    out.push_str("  \"category\": \"技術類別\"\n");
    out.push_str("}\n\n");

    out.push_str("注意事項：\n");
    out.push_str("1. 題目要實用，考驗真實工作能力\n");
    out.push_str("2. 選項要有區辨度，避免明顯的誘答\n");
    out.push_str("3. answer 是正確答案的索引（0-3）\n");
    out.push_str("4. 使用正體中文（台灣用語）\n");
    out.push_str("5. 避免冷門或過時的主題");
    out
}
