// src/api.rs
// Job API: start a research run in the background, poll its progress.

use std::sync::Arc;
use std::thread;

use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::orchestrator::{ResearchOrchestrator, ResearchRequest};
use crate::progress::{FanoutSink, Progress, ProgressEvent, ProgressSink, TracingSink};
use crate::report::ResearchReport;

pub type JobStore = Arc<DashMap<String, JobStatus>>;

// Shared state for the server
pub struct AppState {
    pub orchestrator: Arc<ResearchOrchestrator>,
    pub jobs: JobStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Processing,
    Completed,
    Failed,
}

#[derive(Serialize)]
pub struct JobCreatedResponse {
    pub job_id: String,
    pub status: JobState,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: String,
    pub status: JobState,
    pub events: Vec<ProgressEvent>,
    pub report: Option<ResearchReport>,
    pub output_path: Option<String>,
    pub error: Option<String>,
}

impl JobStatus {
    fn processing(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: JobState::Processing,
            events: Vec::new(),
            report: None,
            output_path: None,
            error: None,
        }
    }
}

/// Appends each progress event to the job's entry so pollers can follow along.
pub struct JobSink {
    jobs: JobStore,
    job_id: String,
}

impl JobSink {
    pub fn new(jobs: JobStore, job_id: impl Into<String>) -> Self {
        Self {
            jobs,
            job_id: job_id.into(),
        }
    }
}

impl ProgressSink for JobSink {
    fn emit(&self, event: &str, payload: &Value) {
        if let Some(mut job) = self.jobs.get_mut(&self.job_id) {
            job.events.push(ProgressEvent {
                event: event.to_string(),
                payload: payload.clone(),
                at: Utc::now(),
            });
        }
    }
}

/// Run one job to completion and record its outcome in the store.
pub fn run_job(orchestrator: &ResearchOrchestrator, jobs: &JobStore, job_id: &str, request: &ResearchRequest) {
    let sinks: Vec<Arc<dyn ProgressSink>> = vec![
        Arc::new(TracingSink),
        Arc::new(JobSink::new(Arc::clone(jobs), job_id)),
    ];
    let progress = Progress::new(Arc::new(FanoutSink::new(sinks)));

    let outcome = orchestrator.run_research(request, &progress);
    if let Some(mut job) = jobs.get_mut(job_id) {
        match outcome {
            Ok(run) => {
                job.status = JobState::Completed;
                job.output_path = run.output_path.map(|p| p.display().to_string());
                job.report = Some(run.report);
            }
            Err(e) => {
                job.status = JobState::Failed;
                job.error = Some(e.to_string());
            }
        }
    }
}

// POST /api/research
pub async fn start_research(
    data: web::Data<AppState>,
    req: web::Json<ResearchRequest>,
) -> impl Responder {
    let job_id = Uuid::new_v4().to_string();
    data.jobs.insert(job_id.clone(), JobStatus::processing(&job_id));

    let orchestrator = Arc::clone(&data.orchestrator);
    let jobs = Arc::clone(&data.jobs);
    let request = req.into_inner();
    let thread_job_id = job_id.clone();

    // The pipeline is blocking; keep it off the actix workers.
    thread::spawn(move || {
        tracing::info!(job_id = %thread_job_id, "research job started");
        run_job(&orchestrator, &jobs, &thread_job_id, &request);
        tracing::info!(job_id = %thread_job_id, "research job finished");
    });

    HttpResponse::Accepted().json(JobCreatedResponse {
        job_id,
        status: JobState::Processing,
    })
}

// GET /api/status/{job_id}
pub async fn get_job_status(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let job_id = path.into_inner();

    match data.jobs.get(&job_id) {
        Some(job) => HttpResponse::Ok().json(job.clone()),
        None => HttpResponse::NotFound().body("Job not found"),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/research", web::post().to(start_research))
        .route("/api/status/{id}", web::get().to(get_job_status));
}
