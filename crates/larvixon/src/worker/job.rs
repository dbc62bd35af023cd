use crate::pipeline::ProcessOutcome;

/// A request to process one analysis. Carries only the id; everything else
/// is reloaded from the record store when the job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisJob {
    pub analysis_id: i64,
}

impl AnalysisJob {
    pub fn new(analysis_id: i64) -> Self {
        Self { analysis_id }
    }
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub analysis_id: i64,
    pub outcome: ProcessOutcome,
}

impl JobReport {
    pub fn new(job: AnalysisJob, outcome: ProcessOutcome) -> Self {
        Self {
            analysis_id: job.analysis_id,
            outcome,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.is_completed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FailureKind;

    #[test]
    fn test_report_success_follows_outcome() {
        let job = AnalysisJob::new(3);
        let ok = JobReport::new(job, ProcessOutcome::Completed { results: vec![] });
        assert_eq!(ok.analysis_id, 3);
        assert!(ok.succeeded());

        let failed = JobReport::new(
            job,
            ProcessOutcome::Failed {
                kind: FailureKind::Internal,
                message: "x".to_string(),
            },
        );
        assert!(!failed.succeeded());
        assert!(!JobReport::new(job, ProcessOutcome::Skipped).succeeded());
    }
}
