//! Embedding job inspection commands

use crate::db::Database;
use crate::error::Result;
use crate::lifecycle::ProcessingStatus;
use crate::models::EmbeddingJob;
use serde::{Deserialize, Serialize};

/// Job row plus derived progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    #[serde(flatten)]
    pub job: EmbeddingJob,
    pub progress_percentage: f64,
    pub remaining_items: i64,
}

impl From<EmbeddingJob> for JobInfo {
    fn from(job: EmbeddingJob) -> Self {
        Self {
            progress_percentage: job.progress_percentage(),
            remaining_items: job.remaining_items(),
            job,
        }
    }
}

pub async fn cmd_list_jobs(db: &Database, status: Option<ProcessingStatus>) -> Result<Vec<JobInfo>> {
    Ok(db
        .list_embedding_jobs(status)
        .await?
        .into_iter()
        .map(JobInfo::from)
        .collect())
}

pub async fn cmd_show_job(db: &Database, id: &str) -> Result<JobInfo> {
    Ok(db.get_embedding_job(id).await?.into())
}

/// Cancel a pending or running job
pub async fn cmd_cancel_job(db: &Database, id: &str, reason: &str) -> Result<JobInfo> {
    let job: EmbeddingJob = db.mark_cancelled(id, reason).await?;
    Ok(job.into())
}

pub fn print_jobs(jobs: &[JobInfo]) {
    println!("\n⚙️  Embedding Jobs\n");

    if jobs.is_empty() {
        println!("No jobs.");
        return;
    }

    for info in jobs {
        print_job_line(info);
    }
}

fn print_job_line(info: &JobInfo) {
    let job = &info.job;
    println!("• {} {} [{}]", job.job_type, job.id, job.status.status);
    println!(
        "  Progress: {}/{} ({:.1}%), {} failed, {} remaining",
        job.processed_items,
        job.total_items,
        info.progress_percentage,
        job.failed_items,
        info.remaining_items
    );
    println!("  Created: {}", job.timestamps.created_at);
    println!();
}

pub fn print_job(info: &JobInfo) {
    print_job_line(info);
    let job = &info.job;
    println!("  Model: {}", job.embedding_model_id);
    if !job.status.status_message.is_empty() {
        println!("  Message: {}", job.status.status_message);
    }
    if let Some(started) = &job.status.processing_started_at {
        println!("  Started: {}", started);
    }
    if let Some(completed) = &job.status.processing_completed_at {
        println!("  Finished: {}", completed);
    }
    println!("  Parameters: {}", job.parameters());
    let result = job.result_data();
    if !result.is_null() && result != serde_json::json!({}) {
        println!("  Result: {}", result);
    }
}
