//! Job payload definitions for the ingest queue

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Kinds of work the ingest queue carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    /// Parse and persist one staged claim-bundle file
    ParseClaimFile,
    /// Marks an upload batch as fully submitted
    FinalizeSession,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::ParseClaimFile => "parse_claim_file",
            JobKind::FinalizeSession => "finalize_session",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "parse_claim_file" => Some(JobKind::ParseClaimFile),
            "finalize_session" => Some(JobKind::FinalizeSession),
            _ => None,
        }
    }
}

/// Payload for one staged claim file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseJob {
    /// Absolute path of the staged file; owned by the worker from the
    /// moment the job is enqueued, deleted when the job finishes
    pub staged_path: PathBuf,
    /// Original (pre-sanitization) upload filename, for logs and events
    pub original_name: String,
    /// Correlation id for the upload batch
    pub import_session_id: Uuid,
    /// Identity of the uploader; progress channel id
    pub caller_id: String,
}

impl ParseJob {
    /// Idempotency key: at most one job per physical file per session.
    pub fn job_key(import_session_id: Uuid, file_id: Uuid) -> String {
        format!("{}:{}", import_session_id, file_id)
    }
}

/// Payload for the trailing session-finalize job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeJob {
    pub import_session_id: Uuid,
    pub caller_id: String,
}

impl FinalizeJob {
    pub fn job_key(import_session_id: Uuid) -> String {
        format!("{}:finalize", import_session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_round_trip() {
        for kind in [JobKind::ParseClaimFile, JobKind::FinalizeSession] {
            assert_eq!(JobKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(JobKind::from_str("unknown"), None);
    }

    #[test]
    fn test_job_key_is_deterministic() {
        let session = Uuid::new_v4();
        let file = Uuid::new_v4();
        assert_eq!(
            ParseJob::job_key(session, file),
            ParseJob::job_key(session, file)
        );
        assert_ne!(
            ParseJob::job_key(session, file),
            ParseJob::job_key(session, Uuid::new_v4())
        );
    }

    #[test]
    fn test_parse_job_serialization() {
        let job = ParseJob {
            staged_path: PathBuf::from("/tmp/stage/a__b.xml"),
            original_name: "b.xml".to_string(),
            import_session_id: Uuid::new_v4(),
            caller_id: "user-1".to_string(),
        };
        let json = serde_json::to_value(&job).unwrap();
        let back: ParseJob = serde_json::from_value(json).unwrap();
        assert_eq!(back.original_name, job.original_name);
        assert_eq!(back.import_session_id, job.import_session_id);
    }
}
