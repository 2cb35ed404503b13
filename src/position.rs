use serde::{Deserialize, Serialize};
use std::fmt;

/// Label used for position codes outside the known set.
pub const GENERIC_TECH_DOMAIN: &str = "軟體開發";

/// Positions the assessment can be taken for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Vue,
    Fullstack,
    Angular,
    Python,
    Ai,
    Devops,
    Iot,
}

impl Position {
    pub const ALL: [Position; 7] = [
        Position::Vue,
        Position::Fullstack,
        Position::Angular,
        Position::Python,
        Position::Ai,
        Position::Devops,
        Position::Iot,
    ];

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.code().eq_ignore_ascii_case(code.trim()))
    }

    pub fn code(&self) -> &'static str {
        match self {
            Position::Vue => "vue",
            Position::Fullstack => "fullstack",
            Position::Angular => "angular",
            Position::Python => "python",
            Position::Ai => "ai",
            Position::Devops => "devops",
            Position::Iot => "iot",
        }
    }

    /// Technology stack the questions for this position draw from.
    pub fn tech_stack(&self) -> &'static str {
        match self {
            Position::Vue => "Vue 3 Composition API, Tailwind CSS, DaisyUI",
            Position::Fullstack => "Vite, Shoelace, Prisma, PostgreSQL",
            Position::Angular => "Angular 21, PrimeNG, TypeScript, Signals",
            Position::Python => "FastAPI, SQLModel, PostgreSQL",
            Position::Ai => "YOLO11, OpenCV, PyTorch, 電腦視覺",
            Position::Devops => "Docker, CI/CD, Shell, Git hooks",
            Position::Iot => "PLC/HMI, Modbus TCP, MQTT, Node-RED",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Technical domain for a raw position code.  Unknown codes map to
/// [`GENERIC_TECH_DOMAIN`]; HTTP handlers reject them before this point.
pub fn resolve_tech_domain(code: &str) -> &'static str {
    Position::from_code(code)
        .map(|p| p.tech_stack())
        .unwrap_or(GENERIC_TECH_DOMAIN)
}
