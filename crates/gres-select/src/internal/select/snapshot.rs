use crate::internal::gres::config::SelectConfig;
use crate::internal::gres::job::JobGresList;
use crate::internal::gres::resources::JobSelectInfo;
use crate::internal::gres::sock::SockGres;
use crate::internal::select::assign::select_and_set;
use serde::{Deserialize, Serialize};

/// Everything a device selection of one job reads, captured so that the
/// selection can be replayed outside of the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectAttempt {
    #[serde(default)]
    pub config: SelectConfig,
    pub job: JobSelectInfo,
    pub job_gres: JobGresList,
    /// Candidate devices of every job node, in the order of the job's nodes
    pub sock_gres: Vec<Vec<SockGres>>,
}

impl SelectAttempt {
    pub fn from_json(data: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Runs the selection; the result is recorded in `job_gres`.
    pub fn run(&mut self) -> crate::Result<()> {
        log::debug!(
            "Replaying gres selection of job {} on {} nodes",
            self.job.job_id,
            self.sock_gres.len()
        );
        select_and_set(&self.sock_gres, &mut self.job_gres, &self.job, &self.config)
    }
}
