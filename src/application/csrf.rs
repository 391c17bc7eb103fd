//! Recovery after a failed anti-forgery check.
//!
//! The rejected request is re-dispatched to the post operation its path names.
//! Whatever that operation returns on failure, the caller only ever sees a
//! redirect to the site root.

use metrics::counter;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::context::RequestContext;
use crate::application::posts::{self, DeleteStep, Outcome, PostError, PostOperation, Submission};
use crate::application::repos::PostStore;

pub const METRIC_CSRF_RECOVERIES: &str = "quill_csrf_recoveries_total";

/// A request rejected by the anti-forgery check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfFailure {
    pub path: String,
    pub submission: Submission,
    /// Diagnostic only; never rendered.
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryRoute {
    Create,
    Update,
    Delete,
    Root,
}

impl RecoveryRoute {
    /// First match wins: `/post/new`, then `/update`, then `/delete`.
    pub fn classify(path: &str) -> Self {
        if path.contains("/post/new") {
            RecoveryRoute::Create
        } else if path.contains("/update") {
            RecoveryRoute::Update
        } else if path.contains("/delete") {
            RecoveryRoute::Delete
        } else {
            RecoveryRoute::Root
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryRoute::Create => "create",
            RecoveryRoute::Update => "update",
            RecoveryRoute::Delete => "delete",
            RecoveryRoute::Root => "root",
        }
    }
}

/// The id in a `/post/{id}/...` path.
pub fn post_id_from_path(path: &str) -> Option<Uuid> {
    let mut segments = path.split('/').filter(|segment| !segment.is_empty());
    while let Some(segment) = segments.next() {
        if segment == "post" {
            return segments.next().and_then(|raw| Uuid::parse_str(raw).ok());
        }
    }
    None
}

fn operation_for(route: RecoveryRoute, failure: CsrfFailure) -> Option<PostOperation> {
    let CsrfFailure {
        path, submission, ..
    } = failure;
    match route {
        RecoveryRoute::Create => Some(PostOperation::Create(submission)),
        RecoveryRoute::Update => {
            post_id_from_path(&path).map(|id| PostOperation::Update { id, submission })
        }
        RecoveryRoute::Delete => {
            let step = match submission {
                Submission::Show => DeleteStep::Confirm,
                Submission::Submit(_) => DeleteStep::Confirmed,
            };
            post_id_from_path(&path).map(|id| PostOperation::Delete { id, step })
        }
        RecoveryRoute::Root => None,
    }
}

pub async fn recover(
    failure: CsrfFailure,
    ctx: &RequestContext,
    store: &dyn PostStore,
) -> Outcome {
    let route = RecoveryRoute::classify(&failure.path);
    debug!(
        target: "quill::csrf",
        path = %failure.path,
        reason = %failure.reason,
        route = route.as_str(),
        "re-dispatching rejected request"
    );

    if route == RecoveryRoute::Root {
        record(route, "root");
        return Outcome::redirect_root();
    }

    let path = failure.path.clone();
    let result = match operation_for(route, failure) {
        Some(operation) => posts::execute(operation, ctx, store).await,
        None => Err(PostError::NotFound),
    };

    match result {
        Ok(outcome) => {
            record(route, "redispatched");
            outcome
        }
        Err(err) => {
            info!(
                target: "quill::csrf",
                path = %path,
                route = route.as_str(),
                error = %err,
                "masking failure from re-dispatched operation"
            );
            record(route, "masked");
            Outcome::redirect_root()
        }
    }
}

fn record(route: RecoveryRoute, result: &'static str) {
    counter!(METRIC_CSRF_RECOVERIES, "route" => route.as_str(), "result" => result).increment(1);
}
