//! engine::webhook
//!
//! Pull request lifecycle events from the forge.
//!
//! # Payloads
//!
//! Two shapes are accepted:
//!
//! - the engine's own `{"event": "merged" | "closed", "prNumber": 7, "mergeCommitHash": "..."}`
//! - GitHub `pull_request` events, where `action: "closed"` with
//!   `merged: true` is a merge
//!
//! Anything else that parses is acknowledged and ignored.
//!
//! # Signatures
//!
//! Requests carry `sha256=<hex>` HMAC-SHA256 of the raw body, keyed by the
//! shared secret, in the same form as GitHub's `X-Hub-Signature-256`.
//! Verification runs before the body is parsed.

use std::collections::BTreeSet;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::{info, warn};

use super::{Engine, EngineError};
use crate::core::model::{BranchStatus, PublishBranch};
use crate::core::types::{BranchId, CommitHash, RepoPath};
use crate::store::PublishRecord;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("webhook secret is not configured")]
    SecretNotConfigured,

    #[error("missing webhook signature")]
    MissingSignature,

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("malformed webhook payload: {0}")]
    Malformed(String),
}

/// A parsed webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Merged {
        pr_number: u64,
        merge_commit_hash: Option<CommitHash>,
    },
    Closed {
        pr_number: u64,
    },
    Ignored(String),
}

/// What handling an event did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Merged(MergeReport),
    Closed { branch: BranchId },
    UnknownPr { pr_number: u64 },
    Ignored { event: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub branch: BranchId,
    pub pr_number: u64,
    /// Document paths promoted to `published`.
    pub promoted: Vec<RepoPath>,
    /// Document paths archived because the branch deleted their file.
    pub retired: Vec<RepoPath>,
    pub cleared_ops: usize,
}

/// Signature header value for `body`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, WebhookError> {
    let mut mac = mac_for(secret)?;
    mac.update(body);
    Ok(format!(
        "{SIGNATURE_PREFIX}{}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Check `signature` against the HMAC of `body`, in constant time.
pub fn verify_signature(
    secret: &str,
    signature: Option<&str>,
    body: &[u8],
) -> Result<(), WebhookError> {
    let mut mac = mac_for(secret)?;
    let header = signature.ok_or(WebhookError::MissingSignature)?;
    let encoded = header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(WebhookError::InvalidSignature)?;
    let expected = hex::decode(encoded).map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature)
}

fn mac_for(secret: &str) -> Result<HmacSha256, WebhookError> {
    if secret.is_empty() {
        return Err(WebhookError::SecretNotConfigured);
    }
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::SecretNotConfigured)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventPayload {
    event: String,
    pr_number: u64,
    merge_commit_hash: Option<String>,
}

#[derive(Deserialize)]
struct PullRequestPayload {
    action: String,
    pull_request: PullRequestBody,
}

#[derive(Deserialize)]
struct PullRequestBody {
    number: u64,
    #[serde(default)]
    merged: bool,
    merge_commit_sha: Option<String>,
}

/// Parse a webhook body.
///
/// `event_header` is the forge's event name header (`X-GitHub-Event`),
/// when present.
pub fn parse_event(event_header: Option<&str>, body: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| WebhookError::Malformed(e.to_string()))?;

    if value.get("event").is_some() {
        let payload: EventPayload =
            serde_json::from_value(value).map_err(|e| WebhookError::Malformed(e.to_string()))?;
        return match payload.event.as_str() {
            "merged" => Ok(WebhookEvent::Merged {
                pr_number: payload.pr_number,
                merge_commit_hash: parse_commit(payload.merge_commit_hash)?,
            }),
            "closed" => Ok(WebhookEvent::Closed {
                pr_number: payload.pr_number,
            }),
            other => Ok(WebhookEvent::Ignored(other.to_string())),
        };
    }

    if let Some(event) = event_header.filter(|e| *e != "pull_request") {
        return Ok(WebhookEvent::Ignored(event.to_string()));
    }

    if value.get("pull_request").is_none() {
        return Err(WebhookError::Malformed(
            "expected an `event` or `pull_request` field".into(),
        ));
    }
    let payload: PullRequestPayload =
        serde_json::from_value(value).map_err(|e| WebhookError::Malformed(e.to_string()))?;
    let pr = payload.pull_request;
    match payload.action.as_str() {
        "closed" if pr.merged => Ok(WebhookEvent::Merged {
            pr_number: pr.number,
            merge_commit_hash: parse_commit(pr.merge_commit_sha)?,
        }),
        "closed" => Ok(WebhookEvent::Closed {
            pr_number: pr.number,
        }),
        action => Ok(WebhookEvent::Ignored(format!("pull_request.{action}"))),
    }
}

fn parse_commit(hash: Option<String>) -> Result<Option<CommitHash>, WebhookError> {
    hash.map(CommitHash::new)
        .transpose()
        .map_err(|e| WebhookError::Malformed(e.to_string()))
}

impl Engine {
    /// Verify, parse and apply a webhook request.
    ///
    /// # Errors
    ///
    /// `EngineError::Unauthorized` for a missing or bad signature, checked
    /// before anything else. `EngineError::Webhook` for an unparseable body.
    pub fn handle_webhook(
        &self,
        secret: &str,
        signature: Option<&str>,
        event_header: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookOutcome, EngineError> {
        verify_signature(secret, signature, body).map_err(|e| match e {
            WebhookError::SecretNotConfigured => EngineError::Webhook(e),
            other => EngineError::Unauthorized(other.to_string()),
        })?;

        match parse_event(event_header, body)? {
            WebhookEvent::Merged {
                pr_number,
                merge_commit_hash,
            } => Ok(self
                .on_merged(pr_number, merge_commit_hash)?
                .map(WebhookOutcome::Merged)
                .unwrap_or(WebhookOutcome::UnknownPr { pr_number })),
            WebhookEvent::Closed { pr_number } => Ok(self
                .on_closed(pr_number)?
                .map(|branch| WebhookOutcome::Closed { branch: branch.id })
                .unwrap_or(WebhookOutcome::UnknownPr { pr_number })),
            WebhookEvent::Ignored(event) => {
                info!(event = %event, "webhook event ignored");
                Ok(WebhookOutcome::Ignored { event })
            }
        }
    }

    /// Apply a merged pull request.
    ///
    /// Marks the branch merged, clears the project's committed ops and
    /// promotes exactly the documents whose paths were pushed on the
    /// branch. Paths whose last committed op was a delete are archived
    /// instead. The merge commit goes into history only; `remote_hash`
    /// keeps the blob hash recorded at publish time. Returns `None` for an
    /// unknown pull request.
    pub fn on_merged(
        &self,
        pr_number: u64,
        merge_commit_hash: Option<CommitHash>,
    ) -> Result<Option<MergeReport>, EngineError> {
        let Some(branch) = self.db.branches().find_by_pr(pr_number)? else {
            info!(pr_number, "merge for unknown pull request ignored");
            return Ok(None);
        };

        let branch = self
            .db
            .branches()
            .set_status(&branch.id, BranchStatus::Merged)?;
        let deleted = self.db.ops().committed_deletes(&branch.project_id)?;
        let cleared_ops = self.db.ops().clear_committed(&branch.project_id)?;

        let project = self.db.projects().get(&branch.project_id)?;
        let (deleted_paths, written_paths): (BTreeSet<RepoPath>, BTreeSet<RepoPath>) = branch
            .committed_file_paths
            .iter()
            .filter_map(|p| project.content_root.strip(p))
            .partition(|p| deleted.contains(p));

        let record = PublishRecord {
            editor: project.owner.clone(),
            remote_hash: None,
            commit_hash: merge_commit_hash,
            message: Some(format!("Merged pull request #{pr_number}")),
        };
        let documents = self.db.documents();
        let promoted: Vec<RepoPath> = if written_paths.is_empty() {
            Vec::new()
        } else {
            documents
                .publish_paths(&project.id, &written_paths, record.clone())?
                .into_iter()
                .map(|d| d.file_path)
                .collect()
        };
        let retired: Vec<RepoPath> = if deleted_paths.is_empty() {
            Vec::new()
        } else {
            documents
                .retire_paths(&project.id, &deleted_paths, record)?
                .into_iter()
                .map(|d| d.file_path)
                .collect()
        };

        info!(
            pr_number,
            branch = %branch.branch_name,
            promoted = promoted.len(),
            retired = retired.len(),
            cleared_ops,
            "pull request merged"
        );
        Ok(Some(MergeReport {
            branch: branch.id,
            pr_number,
            promoted,
            retired,
            cleared_ops,
        }))
    }

    /// Apply a pull request closed without merging.
    ///
    /// Only the branch status changes. Ops committed to the branch stay
    /// `committed`; their content is not re-staged. A branch that is
    /// already merged is left as is.
    pub fn on_closed(&self, pr_number: u64) -> Result<Option<PublishBranch>, EngineError> {
        let Some(branch) = self.db.branches().find_by_pr(pr_number)? else {
            info!(pr_number, "close for unknown pull request ignored");
            return Ok(None);
        };
        if branch.status == BranchStatus::Merged {
            return Ok(Some(branch));
        }

        let branch = self
            .db
            .branches()
            .set_status(&branch.id, BranchStatus::Closed)?;
        warn!(
            pr_number,
            branch = %branch.branch_name,
            "pull request closed without merge; committed changes were not published"
        );
        Ok(Some(branch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "s3cret";

    #[test]
    fn signature_round_trip() {
        let body = br#"{"event":"merged","prNumber":1}"#;
        let header = sign(SECRET, body).unwrap();
        assert!(header.starts_with("sha256="));
        assert_eq!(verify_signature(SECRET, Some(&header), body), Ok(()));
    }

    #[test]
    fn tampered_body_rejected() {
        let header = sign(SECRET, b"original").unwrap();
        assert_eq!(
            verify_signature(SECRET, Some(&header), b"tampered"),
            Err(WebhookError::InvalidSignature)
        );
    }

    #[test]
    fn missing_and_garbled_signatures_rejected() {
        assert_eq!(
            verify_signature(SECRET, None, b"x"),
            Err(WebhookError::MissingSignature)
        );
        assert_eq!(
            verify_signature(SECRET, Some("sha1=abcd"), b"x"),
            Err(WebhookError::InvalidSignature)
        );
        assert_eq!(
            verify_signature(SECRET, Some("sha256=zz"), b"x"),
            Err(WebhookError::InvalidSignature)
        );
    }

    #[test]
    fn empty_secret_refused() {
        assert_eq!(sign("", b"x"), Err(WebhookError::SecretNotConfigured));
    }

    #[test]
    fn parses_engine_payload() {
        let hash = "a".repeat(40);
        let body = format!(r#"{{"event":"merged","prNumber":7,"mergeCommitHash":"{hash}"}}"#);
        assert_eq!(
            parse_event(None, body.as_bytes()).unwrap(),
            WebhookEvent::Merged {
                pr_number: 7,
                merge_commit_hash: Some(CommitHash::new(hash).unwrap()),
            }
        );
        assert_eq!(
            parse_event(None, br#"{"event":"closed","prNumber":7}"#).unwrap(),
            WebhookEvent::Closed { pr_number: 7 }
        );
        assert_eq!(
            parse_event(None, br#"{"event":"reopened","prNumber":7}"#).unwrap(),
            WebhookEvent::Ignored("reopened".into())
        );
    }

    #[test]
    fn parses_github_pull_request_events() {
        let merged = br#"{"action":"closed","pull_request":{"number":3,"merged":true,"merge_commit_sha":null}}"#;
        assert_eq!(
            parse_event(Some("pull_request"), merged).unwrap(),
            WebhookEvent::Merged {
                pr_number: 3,
                merge_commit_hash: None,
            }
        );

        let closed = br#"{"action":"closed","pull_request":{"number":3,"merged":false}}"#;
        assert_eq!(
            parse_event(None, closed).unwrap(),
            WebhookEvent::Closed { pr_number: 3 }
        );

        let opened = br#"{"action":"opened","pull_request":{"number":3}}"#;
        assert_eq!(
            parse_event(None, opened).unwrap(),
            WebhookEvent::Ignored("pull_request.opened".into())
        );
    }

    #[test]
    fn other_github_events_ignored() {
        assert_eq!(
            parse_event(Some("ping"), br#"{"zen":"Keep it simple."}"#).unwrap(),
            WebhookEvent::Ignored("ping".into())
        );
    }

    #[test]
    fn malformed_payloads_rejected() {
        assert!(matches!(
            parse_event(None, b"not json"),
            Err(WebhookError::Malformed(_))
        ));
        assert!(matches!(
            parse_event(None, br#"{"hello":1}"#),
            Err(WebhookError::Malformed(_))
        ));
        assert!(matches!(
            parse_event(None, br#"{"event":"merged","prNumber":1,"mergeCommitHash":"xyz"}"#),
            Err(WebhookError::Malformed(_))
        ));
    }
}
