use std::collections::BTreeSet;

use chrono::{DateTime, Duration, TimeZone, Utc};

use mgnify_catalog::model::{
    AnalysisJob, AnalysisTarget, Assembly, Run, Sample, Study, SuppressionState,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
}

pub fn days_after(days: i64) -> DateTime<Utc> {
    t0() + Duration::days(days)
}

pub fn study(id: u64, owner: &str) -> Study {
    Study {
        id,
        accession: format!("MGYS{id:08}"),
        secondary_accession: format!("ERP{id:06}"),
        project_id: Some(format!("PRJEB{id}")),
        submission_account: Some(owner.to_string()),
        public_release_date: None,
        state: SuppressionState::public(),
    }
}

pub fn sample(id: u64, studies: &[u64]) -> Sample {
    Sample {
        id,
        accession: format!("ERS{id:06}"),
        primary_accession: Some(format!("SAMEA{id}")),
        studies: studies.iter().copied().collect(),
        submission_account: None,
        state: SuppressionState::public(),
    }
}

pub fn run(id: u64, study: u64, sample: Option<u64>) -> Run {
    Run {
        id,
        accession: format!("ERR{id:06}"),
        secondary_accession: None,
        study: Some(study),
        sample,
        experiment_type: Some("metagenomic".to_string()),
        state: SuppressionState::public(),
    }
}

pub fn assembly(id: u64, study: u64, samples: &[u64]) -> Assembly {
    Assembly {
        id,
        accession: format!("ERZ{id:06}"),
        legacy_accession: None,
        study: Some(study),
        runs: BTreeSet::new(),
        samples: samples.iter().copied().collect(),
        state: SuppressionState::public(),
    }
}

pub fn job(id: u64, study: u64, target: AnalysisTarget) -> AnalysisJob {
    AnalysisJob {
        id,
        study,
        sample: None,
        target,
        pipeline_version: "5.0".to_string(),
        last_update: t0(),
        mgx_accession: None,
        last_mgx_indexed: None,
        state: SuppressionState::public(),
    }
}
