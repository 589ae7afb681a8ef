//! Push event parsing and routing

use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{DeployError, Result};

pub const SIGNATURE_HEADERS: [&str; 2] = ["X-Hub-Signature-256", "X-Hub-Signature"];
pub const EVENT_HEADERS: [&str; 2] = ["X-GitHub-Event", "X-Gitlab-Event"];
pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

const BRANCH_REF_PREFIX: &str = "refs/heads/";
const UNKNOWN_EVENT: &str = "unknown";

/// Returns the first header from `names` that is present, non-empty and
/// valid UTF-8.
pub fn first_header<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    })
}

/// GitHub sends `push`, GitLab sends `Push Hook`.
pub fn is_push_event(event_type: &str) -> bool {
    event_type == "push" || event_type == "Push Hook"
}

/// Strips a leading `refs/heads/`. Anything else, including an empty ref,
/// is returned untouched.
pub fn branch_from_ref(git_ref: &str) -> &str {
    git_ref.strip_prefix(BRANCH_REF_PREFIX).unwrap_or(git_ref)
}

/// The parts of a push payload this server cares about
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushEvent {
    pub git_ref: String,
    pub after: Option<String>,
    pub head_commit: Option<HeadCommit>,
    pub pusher: Option<Pusher>,
    pub repository: Option<Repository>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct HeadCommit {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub author: Option<CommitAuthor>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CommitAuthor {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Pusher {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Repository {
    #[serde(default)]
    pub full_name: Option<String>,
}

impl PushEvent {
    /// Reads a push event out of an already parsed payload.
    ///
    /// Only `ref` is load-bearing: a non-string `ref` is rejected, while
    /// odd shapes in the informational fields are ignored.
    pub fn from_value(payload: &Value) -> Result<Self> {
        let object = payload.as_object().ok_or_else(|| {
            DeployError::MalformedPushEvent("payload is not a JSON object".to_string())
        })?;

        let git_ref = match object.get("ref") {
            None => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(DeployError::MalformedPushEvent(format!(
                    "ref is not a string: {}",
                    other
                )));
            }
        };

        let lenient = |key: &str| object.get(key).cloned().unwrap_or(Value::Null);
        Ok(Self {
            git_ref,
            after: serde_json::from_value(lenient("after")).unwrap_or_default(),
            head_commit: serde_json::from_value(lenient("head_commit")).unwrap_or_default(),
            pusher: serde_json::from_value(lenient("pusher")).unwrap_or_default(),
            repository: serde_json::from_value(lenient("repository")).unwrap_or_default(),
        })
    }

    pub fn branch(&self) -> &str {
        branch_from_ref(&self.git_ref)
    }

    pub fn commit_sha(&self) -> Option<&str> {
        self.after.as_deref()
    }

    pub fn commit_message(&self) -> Option<&str> {
        self.head_commit.as_ref()?.message.as_deref()
    }

    pub fn commit_author(&self) -> Option<&str> {
        self.head_commit.as_ref()?.author.as_ref()?.name.as_deref()
    }

    pub fn pusher_name(&self) -> Option<&str> {
        self.pusher.as_ref()?.name.as_deref()
    }

    pub fn repository_name(&self) -> Option<&str> {
        self.repository.as_ref()?.full_name.as_deref()
    }
}

/// What to do with a verified webhook
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Push to the configured branch; run the deploy script
    Deploy(PushEvent),
    /// Push to some other branch
    Skipped(String),
    /// Anything that is not a push
    Ignored(String),
}

/// Classifies a verified webhook payload.
///
/// The body must be valid JSON whatever the event type. Every outcome is
/// logged before returning.
pub fn dispatch(
    payload: &[u8],
    event_type: Option<&str>,
    target_branch: &str,
) -> Result<DispatchOutcome> {
    let data: Value = serde_json::from_slice(payload)?;

    let Some(event_type) = event_type else {
        info!("Received webhook without an event type header");
        return Ok(DispatchOutcome::Ignored(UNKNOWN_EVENT.to_string()));
    };
    info!("Received {} event", event_type);

    if !is_push_event(event_type) {
        info!("Ignoring {} event", event_type);
        return Ok(DispatchOutcome::Ignored(event_type.to_string()));
    }

    let event = PushEvent::from_value(&data)?;
    let branch = event.branch().to_string();
    info!("Detected push to branch '{}'", branch);
    debug!(
        "Push details: commit={:?} author={:?} pusher={:?} repository={:?}",
        event.commit_sha(),
        event.commit_author(),
        event.pusher_name(),
        event.repository_name()
    );

    if branch == target_branch {
        info!("Branch '{}' is the deploy branch, starting deployment", branch);
        Ok(DispatchOutcome::Deploy(event))
    } else {
        info!(
            "Skipping deployment for branch '{}' (deploy branch is '{}')",
            branch, target_branch
        );
        Ok(DispatchOutcome::Skipped(branch))
    }
}
