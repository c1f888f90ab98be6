/// One merge job: a batch coordinate the extraction engine (C4) has already
/// staged units/entities/relationships for (§4.5).
#[derive(Debug, Clone)]
pub struct MergeBatch {
    pub correlation_id: String,
    pub batch_id: i32,
    pub project_id: i64,
}

/// Summary of one merge run, for the worker to log/record stats with (§4.6).
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub text_units: usize,
    pub entities_upserted: usize,
    pub entities_merged_away: usize,
    pub relationships_upserted: usize,
    pub relationships_merged_away: usize,
    pub entities_pruned: usize,
    pub relationships_pruned: usize,
    pub description_jobs_enqueued: usize,
}
