//! Core library for quizgate.  This module wires together the admission
//! guards, the generation pipeline, the record sink and the HTTP handlers.

mod config;
pub mod behavior;
pub mod error;
pub mod generator;
pub mod guards;
pub mod insight;
pub mod position;
pub mod prompt;
pub mod records;
pub mod sanitize;
pub mod util;
pub mod validate;

pub use config::{AppConfig, RotationConfig};

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, FailedToBufferBody};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::behavior::{analyze, BehaviorMetrics, Difficulty};
use crate::error::ApiError;
use crate::generator::{AnthropicClient, QuestionGenerator};
use crate::guards::rate_limit::{Clock, MemoryRateLimitStore, RateLimitStore, SystemClock};
use crate::guards::GuardPipeline;
use crate::insight::QuestionKind;
use crate::position::Position;
use crate::prompt::{build_prompt, GenerationRequest};
use crate::records::{
    AuditAction, AuditEntry, JsonlRecordSink, MemoryRecordSink, RecordSink, RotatingWriter,
    SinkCounters, SubmissionInput, SubmissionRecord,
};
use crate::sanitize::sanitize_value;
use crate::util::RequestMeta;
use crate::validate::parse_question_checked;

/// Upper bounds (ms) of the generation latency histogram buckets.
const LATENCY_BUCKETS_MS: [u64; 9] = [50, 100, 250, 500, 1000, 2500, 5000, 10000, 30000];

/// Counters exposed on `/metrics`.
pub struct Metrics {
    pub generation_requests_total: AtomicU64,
    pub questions_generated_total: AtomicU64,
    pub fallback_questions_total: AtomicU64,
    pub provider_failures_total: AtomicU64,
    pub insight_requests_total: AtomicU64,
    pub submissions_total: AtomicU64,
    /// One counter per registered guard, in pipeline order.
    pub guard_rejections: Vec<(String, AtomicU64)>,
    pub records: SinkCounters,
    pub hist_counts: Vec<AtomicU64>,
    pub hist_sum_ms: AtomicU64,
    pub hist_count: AtomicU64,
    pub process_start_epoch: f64,
    pub process_start_instant: Instant,
}

impl Metrics {
    fn new(guard_names: &[String], records: SinkCounters) -> Self {
        let start_time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            generation_requests_total: AtomicU64::new(0),
            questions_generated_total: AtomicU64::new(0),
            fallback_questions_total: AtomicU64::new(0),
            provider_failures_total: AtomicU64::new(0),
            insight_requests_total: AtomicU64::new(0),
            submissions_total: AtomicU64::new(0),
            guard_rejections: guard_names
                .iter()
                .map(|n| (n.clone(), AtomicU64::new(0)))
                .collect(),
            records,
            hist_counts: LATENCY_BUCKETS_MS.iter().map(|_| AtomicU64::new(0)).collect(),
            hist_sum_ms: AtomicU64::new(0),
            hist_count: AtomicU64::new(0),
            process_start_epoch: start_time.as_secs_f64(),
            process_start_instant: Instant::now(),
        }
    }

    fn observe_latency(&self, ms: u64) {
        self.hist_sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.hist_count.fetch_add(1, Ordering::Relaxed);
        for (idx, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
            if ms <= *ub {
                self.hist_counts[idx].fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    fn count_rejection(&self, guard: &str) {
        if let Some((_, c)) = self.guard_rejections.iter().find(|(n, _)| n == guard) {
            c.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Shared application state.  Cheap to clone; everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub guards: GuardPipeline,
    pub generator: Option<Arc<dyn QuestionGenerator>>,
    pub records: Arc<dyn RecordSink>,
    pub max_request_bytes: Option<usize>,
    pub metrics: Arc<Metrics>,
}

/// Replaceable collaborators of the service.  Tests swap in a manual clock,
/// a canned generator or an in-memory sink they can read back.
pub struct Collaborators {
    pub rate_limit_store: Arc<dyn RateLimitStore>,
    pub clock: Arc<dyn Clock>,
    pub generator: Option<Arc<dyn QuestionGenerator>>,
    pub records: Arc<dyn RecordSink>,
    pub record_counters: SinkCounters,
}

impl Collaborators {
    /// In-process defaults with no generator configured.
    pub fn in_memory() -> Self {
        Self {
            rate_limit_store: Arc::new(MemoryRateLimitStore::default()),
            clock: Arc::new(SystemClock),
            generator: None,
            records: Arc::new(MemoryRecordSink::default()),
            record_counters: SinkCounters::default(),
        }
    }

    /// Build the production collaborators described by `config`.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let mut collab = Self::in_memory();

        collab.generator = match &config.provider {
            Some(settings) => {
                tracing::info!(
                    endpoint = %settings.endpoint,
                    model = %settings.model,
                    "generation provider configured"
                );
                let client = AnthropicClient::new(settings.clone())?;
                Some(Arc::new(client) as Arc<dyn QuestionGenerator>)
            }
            None => {
                tracing::warn!("ANTHROPIC_API_KEY not set; question generation will fail");
                None
            }
        };

        match config.record_log_file.as_deref() {
            Some(path) => {
                let rotation = &config.rotation;
                match RotatingWriter::open(path, rotation.max_bytes, rotation.keep, rotation.compress)
                {
                    Ok(writer) => {
                        collab.records = Arc::new(JsonlRecordSink::new(
                            writer,
                            collab.record_counters.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "Failed to open RECORD_LOG_FILE; records kept in memory");
                    }
                }
            }
            None => {
                tracing::warn!("RECORD_LOG_FILE not set; records kept in memory");
            }
        }
        Ok(collab)
    }
}

/// Assemble state from a parsed configuration and explicit collaborators.
pub fn build_state_with(config: &AppConfig, collab: Collaborators) -> AppState {
    let guards = GuardPipeline::new(
        &config.guard_order,
        &config.guard_config,
        collab.rate_limit_store,
        collab.clock,
    );
    let metrics = Metrics::new(&guards.names(), collab.record_counters);
    AppState {
        guards,
        generator: collab.generator,
        records: collab.records,
        max_request_bytes: config.max_request_bytes,
        metrics: Arc::new(metrics),
    }
}

/// Build state from environment variables.  See [`AppConfig::from_env`] for
/// the variables read.
pub async fn build_state_from_env() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env().map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
    let collab =
        Collaborators::from_config(&config).map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
    Ok(build_state_with(&config, collab))
}

/// Build the Axum router and attach handlers.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.max_request_bytes;

    let router = Router::new()
        .route(
            "/api/generate-question",
            post(generate_question_handler).fallback(method_not_allowed),
        )
        .route(
            "/api/ai-insight",
            post(ai_insight_handler).fallback(method_not_allowed),
        )
        .route(
            "/api/submit-test",
            post(submit_test_handler).fallback(method_not_allowed),
        )
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler));

    let router = if let Some(limit) = max_request_bytes {
        router.layer(DefaultBodyLimit::max(limit))
    } else {
        router
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Buffer the body and parse it as JSON.  An empty body reads as `{}`.
fn read_json_body(body: Result<Bytes, BytesRejection>) -> Result<Value, ApiError> {
    let bytes = match body {
        Ok(b) => b,
        Err(BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_))) => {
            tracing::warn!("request body exceeded configured limit");
            return Err(ApiError::PayloadTooLarge);
        }
        Err(other) => {
            tracing::debug!(error = %other.body_text(), "failed to read request body");
            return Err(ApiError::InvalidJson);
        }
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(error = %e, "request body is not JSON");
        ApiError::InvalidJson
    })
}

/// Read, sanitize and deserialize a request body.
fn sanitized_body<T: DeserializeOwned>(body: Result<Bytes, BytesRejection>) -> Result<T, ApiError> {
    let value = sanitize_value(read_json_body(body)?);
    serde_json::from_value(value).map_err(|e| {
        tracing::debug!(error = %e, "request body has unexpected shape");
        ApiError::InvalidJson
    })
}

fn record_audit(state: &AppState, entry: AuditEntry) {
    if let Err(e) = state.records.append_audit(&entry) {
        tracing::warn!(error = %e, action = ?entry.action, "audit entry dropped");
    }
}

async fn admit(state: &AppState, meta: &RequestMeta) -> Result<(), ApiError> {
    if let Err(rejection) = state.guards.evaluate(meta).await {
        state.metrics.count_rejection(&rejection.guard);
        record_audit(
            state,
            AuditEntry::new(
                AuditAction::AdmissionRejected,
                meta.client_id.clone(),
                rejection.reason.clone(),
            )
            .with_details(json!({
                "guard": rejection.guard,
                "userAgent": meta.user_agent,
            })),
        );
        return Err(rejection.into());
    }
    Ok(())
}

fn require_position(raw: Option<&str>) -> Result<Position, ApiError> {
    let code = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::PositionRequired)?;
    Position::from_code(code).ok_or_else(|| ApiError::InvalidPosition(code.to_string()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateQuestionBody {
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    behavior: Option<BehaviorMetrics>,
    #[serde(default)]
    previous_questions: Vec<String>,
    #[serde(default)]
    difficulty: Option<String>,
}

/// `POST /api/generate-question`.  Admission, then body checks, then one
/// provider call whose reply is validated before it is returned.
async fn generate_question_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, ApiError> {
    state
        .metrics
        .generation_requests_total
        .fetch_add(1, Ordering::Relaxed);
    let meta = RequestMeta::from_headers(&headers);
    admit(&state, &meta).await?;

    let body: GenerateQuestionBody = sanitized_body(body)?;
    let position = require_position(body.position.as_deref())?;
    let difficulty = match body.difficulty.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            Difficulty::from_label(raw).ok_or_else(|| ApiError::InvalidDifficulty(raw.to_string()))?,
        ),
    };
    let generator = state
        .generator
        .clone()
        .ok_or(ApiError::ProviderNotConfigured)?;

    let analysis = analyze(body.behavior.as_ref());
    if analysis.is_suspicious {
        tracing::info!(client = %meta.client_id, pattern = %analysis.pattern, "suspicious answering pattern");
    }
    let request = GenerationRequest::new(
        position.code(),
        &analysis,
        &body.previous_questions,
        difficulty,
    );
    let prompt = build_prompt(&request);

    let start = Instant::now();
    let outcome = generator.generate(&prompt).await;
    state
        .metrics
        .observe_latency(start.elapsed().as_millis() as u64);
    let text = match outcome {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, position = position.code(), "question generation failed");
            state
                .metrics
                .provider_failures_total
                .fetch_add(1, Ordering::Relaxed);
            record_audit(
                &state,
                AuditEntry::new(AuditAction::ProviderFailed, meta.client_id.clone(), e.to_string()),
            );
            return Err(ApiError::GenerationFailed);
        }
    };

    let (question, used_fallback) = parse_question_checked(&text, request.difficulty);
    let details = json!({
        "position": position.code(),
        "difficulty": request.difficulty,
        "pattern": request.pattern,
        "suspicious": analysis.is_suspicious,
    });
    if used_fallback {
        state
            .metrics
            .fallback_questions_total
            .fetch_add(1, Ordering::Relaxed);
        record_audit(
            &state,
            AuditEntry::new(
                AuditAction::FallbackServed,
                meta.client_id.clone(),
                format!("{} 題目解析失敗，改用備用題", position.code()),
            )
            .with_details(details),
        );
    } else {
        state
            .metrics
            .questions_generated_total
            .fetch_add(1, Ordering::Relaxed);
        record_audit(
            &state,
            AuditEntry::new(
                AuditAction::QuestionGenerated,
                meta.client_id.clone(),
                format!("{} {} 題目已生成", position.code(), request.difficulty),
            )
            .with_details(details),
        );
    }

    Ok(Json(json!({
        "success": true,
        "question": question,
        "aiInsight": analysis.insight,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsightBody {
    #[serde(default)]
    behavior: Option<BehaviorMetrics>,
    #[serde(default)]
    question_type: Option<QuestionKind>,
    #[serde(default)]
    question_category: Option<String>,
    #[serde(default)]
    position: Option<String>,
}

/// `POST /api/ai-insight`.  Rule based, never calls the provider and is not
/// guarded.
async fn ai_insight_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, ApiError> {
    state
        .metrics
        .insight_requests_total
        .fetch_add(1, Ordering::Relaxed);
    let body: InsightBody = sanitized_body(body)?;
    tracing::debug!(position = ?body.position, kind = ?body.question_type, "composing insight");
    let insight = insight::compose(
        body.behavior.as_ref(),
        body.question_type,
        body.question_category.as_deref(),
    );
    Ok(Json(json!({
        "success": true,
        "message": insight.message,
        "encouragement": insight.encouragement,
        "tip": insight.tip,
    })))
}

/// `POST /api/submit-test`.  Stores a finished test and its audit entry.
async fn submit_test_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let meta = RequestMeta::from_headers(&headers);
    admit(&state, &meta).await?;

    let input: SubmissionInput = sanitized_body(body)?;
    let name = input
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(ApiError::NameRequired)?
        .to_string();
    let position = require_position(input.position.as_deref())?;

    let record = SubmissionRecord::from_input(input, name, position);
    if let Err(e) = state.records.record_submission(&record) {
        tracing::error!(error = %e, "failed to store submission");
        return Err(ApiError::StorageFailed);
    }
    state
        .metrics
        .submissions_total
        .fetch_add(1, Ordering::Relaxed);
    record_audit(
        &state,
        AuditEntry::new(
            AuditAction::Submission,
            meta.client_id.clone(),
            format!("{} 提交 {} 測驗", record.name, record.position),
        )
        .with_details(json!({ "submissionId": record.id })),
    );
    tracing::info!(id = %record.id, position = %record.position, "submission stored");

    Ok((
        StatusCode::OK,
        Json(json!({ "success": true, "id": record.id })),
    ))
}

/// Simple health endpoint for container readiness / liveness checks.
async fn healthz_handler(State(state): State<AppState>) -> axum::response::Response {
    let json = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "guardCount": state.guards.len(),
        "providerConfigured": state.generator.is_some(),
    });
    (StatusCode::OK, Json(json)).into_response()
}

fn write_counter(buf: &mut String, name: &str, help: &str, value: u64) {
    use std::fmt::Write as _;
    writeln!(buf, "# HELP {} {}", name, help).ok();
    writeln!(buf, "# TYPE {} counter", name).ok();
    writeln!(buf, "{} {}", name, value).ok();
}

/// Prometheus-style metrics exposition.
async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    use std::fmt::Write as _;
    let m = &state.metrics;
    let mut buf = String::new();

    write_counter(
        &mut buf,
        "quizgate_generation_requests_total",
        "Question generation requests received",
        m.generation_requests_total.load(Ordering::Relaxed),
    );
    write_counter(
        &mut buf,
        "quizgate_questions_generated_total",
        "Generated questions that passed validation",
        m.questions_generated_total.load(Ordering::Relaxed),
    );
    write_counter(
        &mut buf,
        "quizgate_fallback_questions_total",
        "Fallback questions served after a rejected generation",
        m.fallback_questions_total.load(Ordering::Relaxed),
    );
    write_counter(
        &mut buf,
        "quizgate_provider_failures_total",
        "Generation provider calls that failed",
        m.provider_failures_total.load(Ordering::Relaxed),
    );
    write_counter(
        &mut buf,
        "quizgate_insight_requests_total",
        "Insight requests received",
        m.insight_requests_total.load(Ordering::Relaxed),
    );
    write_counter(
        &mut buf,
        "quizgate_submissions_total",
        "Test submissions stored",
        m.submissions_total.load(Ordering::Relaxed),
    );
    write_counter(
        &mut buf,
        "quizgate_record_lines_total",
        "Record lines written to RECORD_LOG_FILE",
        m.records.lines_total.load(Ordering::Relaxed),
    );
    write_counter(
        &mut buf,
        "quizgate_record_write_errors_total",
        "Record line write failures",
        m.records.write_errors_total.load(Ordering::Relaxed),
    );

    writeln!(
        &mut buf,
        "# HELP quizgate_admission_rejections_total Requests refused per guard\n# TYPE quizgate_admission_rejections_total counter"
    )
    .ok();
    for (name, count) in &m.guard_rejections {
        writeln!(
            &mut buf,
            "quizgate_admission_rejections_total{{guard=\"{}\"}} {}",
            name,
            count.load(Ordering::Relaxed)
        )
        .ok();
    }

    writeln!(
        &mut buf,
        "# HELP quizgate_generation_latency_ms Provider call latency histogram milliseconds\n# TYPE quizgate_generation_latency_ms histogram"
    )
    .ok();
    let count = m.hist_count.load(Ordering::Relaxed);
    let mut cumulative: u64 = 0;
    for (i, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
        cumulative += m.hist_counts[i].load(Ordering::Relaxed);
        writeln!(
            &mut buf,
            "quizgate_generation_latency_ms_bucket{{le=\"{}\"}} {}",
            ub, cumulative
        )
        .ok();
    }
    writeln!(
        &mut buf,
        "quizgate_generation_latency_ms_bucket{{le=\"+Inf\"}} {}",
        count
    )
    .ok();
    writeln!(
        &mut buf,
        "quizgate_generation_latency_ms_sum {}",
        m.hist_sum_ms.load(Ordering::Relaxed)
    )
    .ok();
    writeln!(&mut buf, "quizgate_generation_latency_ms_count {}", count).ok();

    writeln!(
        &mut buf,
        "# HELP quizgate_record_file_size_bytes Current size of RECORD_LOG_FILE (0 if disabled)\n# TYPE quizgate_record_file_size_bytes gauge"
    )
    .ok();
    writeln!(
        &mut buf,
        "quizgate_record_file_size_bytes {}",
        m.records.file_size_bytes.load(Ordering::Relaxed)
    )
    .ok();
    writeln!(
        &mut buf,
        "# HELP quizgate_build_info Build information\n# TYPE quizgate_build_info gauge"
    )
    .ok();
    writeln!(
        &mut buf,
        "quizgate_build_info{{version=\"{}\"}} 1",
        env!("CARGO_PKG_VERSION")
    )
    .ok();
    writeln!(
        &mut buf,
        "# HELP quizgate_process_start_time_seconds Process start time (Unix epoch seconds)\n# TYPE quizgate_process_start_time_seconds gauge"
    )
    .ok();
    writeln!(
        &mut buf,
        "quizgate_process_start_time_seconds {}",
        m.process_start_epoch
    )
    .ok();
    writeln!(
        &mut buf,
        "# HELP quizgate_process_uptime_seconds Process uptime seconds\n# TYPE quizgate_process_uptime_seconds gauge"
    )
    .ok();
    writeln!(
        &mut buf,
        "quizgate_process_uptime_seconds {}",
        m.process_start_instant.elapsed().as_secs_f64()
    )
    .ok();

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        buf,
    )
        .into_response()
}
