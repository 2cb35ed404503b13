//! Rule-based progress, encouragement and tip messages.  No external calls.

use serde::{Deserialize, Serialize};

use crate::behavior::BehaviorMetrics;

pub const PERSONALITY_CATEGORY: &str = "人格特質";

pub const TIPS: [&str; 4] = [
    "仔細看每個選項的差異",
    "排除法有時候很有用",
    "相信你的直覺，但也要驗證",
    "如果不確定，先選最接近的答案",
];

const FAST_AND_ACCURATE_MAX_SECS: f64 = 10.0;
const FAST_AND_ACCURATE_MIN_RATE: f64 = 0.7;
const SLOW_MIN_SECS: f64 = 45.0;
const STREAK_CORRECT: u32 = 3;
const STREAK_WRONG: u32 = 2;
const HIGH_RATE: f64 = 0.7;

/// Kind of question currently shown.  Unrecognised kinds are treated as
/// multiple choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Choice,
    Implement,
    Review,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Insight {
    pub message: String,
    pub encouragement: String,
    pub tip: String,
}

pub fn compose(
    metrics: Option<&BehaviorMetrics>,
    kind: Option<QuestionKind>,
    category: Option<&str>,
) -> Insight {
    let defaults = BehaviorMetrics::default();
    let m = metrics.unwrap_or(&defaults);
    Insight {
        message: progress_message(m),
        encouragement: encouragement(m),
        tip: tip(m, kind, category),
    }
}

fn progress_percent(m: &BehaviorMetrics) -> u32 {
    if m.total_questions == 0 {
        return 0;
    }
    (f64::from(m.question_index) / f64::from(m.total_questions) * 100.0).round() as u32
}

fn progress_message(m: &BehaviorMetrics) -> String {
    if m.avg_response_time_seconds < FAST_AND_ACCURATE_MAX_SECS
        && m.correct_rate > FAST_AND_ACCURATE_MIN_RATE
    {
        return "反應快又準確，impressive！".into();
    }
    if m.avg_response_time_seconds > SLOW_MIN_SECS {
        return "慢慢想沒關係，答對最重要".into();
    }
    match progress_percent(m) {
        p if p < 25 => "剛開始熱身，放輕鬆！",
        p if p < 50 => "進度順利，繼續保持！",
        p if p < 75 => "已經過半了，加油！",
        _ => "快到終點了，最後衝刺！",
    }
    .into()
}

fn encouragement(m: &BehaviorMetrics) -> String {
    if m.consecutive_correct >= STREAK_CORRECT {
        format!("連續答對 {} 題！你太厲害了！", m.consecutive_correct)
    } else if m.consecutive_wrong >= STREAK_WRONG {
        "別氣餒，換個角度思考看看".into()
    } else if m.correct_rate > HIGH_RATE {
        "正確率很高，繼續保持！".into()
    } else {
        "每一題都是學習的機會".into()
    }
}

fn tip(m: &BehaviorMetrics, kind: Option<QuestionKind>, category: Option<&str>) -> String {
    if category.map(str::trim) == Some(PERSONALITY_CATEGORY) {
        return "這題沒有對錯，誠實回答就好".into();
    }
    match kind {
        Some(QuestionKind::Implement) => "記得說明你的思路，不只是貼程式碼".into(),
        Some(QuestionKind::Review) => "找出潛在問題，並說明為什麼是問題".into(),
        Some(QuestionKind::Choice) | Some(QuestionKind::Other) | None => {
            TIPS[m.question_index as usize % TIPS.len()].into()
        }
    }
}
