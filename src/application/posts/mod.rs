//! The closed set of post operations.
//!
//! Every operation takes the request context and a store handle explicitly and
//! starts with the shared authentication guard.

mod operations;
pub mod types;

use uuid::Uuid;

use crate::application::context::RequestContext;
use crate::application::repos::PostStore;

pub use operations::{create, delete, detail, list, update};
pub use types::{
    DeleteStep, FormTarget, ListQuery, Outcome, PostError, PostForm, Submission,
};

pub const METRIC_POSTS_WRITTEN: &str = "quill_posts_written_total";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOperation {
    List(ListQuery),
    Detail(Uuid),
    Create(Submission),
    Update { id: Uuid, submission: Submission },
    Delete { id: Uuid, step: DeleteStep },
}

impl PostOperation {
    pub fn name(&self) -> &'static str {
        match self {
            PostOperation::List(_) => "list",
            PostOperation::Detail(_) => "detail",
            PostOperation::Create(_) => "create",
            PostOperation::Update { .. } => "update",
            PostOperation::Delete { .. } => "delete",
        }
    }
}

pub async fn execute(
    operation: PostOperation,
    ctx: &RequestContext,
    store: &dyn PostStore,
) -> Result<Outcome, PostError> {
    match operation {
        PostOperation::List(query) => list(ctx, store, query).await,
        PostOperation::Detail(id) => detail(ctx, store, id).await,
        PostOperation::Create(submission) => create(ctx, store, submission).await,
        PostOperation::Update { id, submission } => update(ctx, store, id, submission).await,
        PostOperation::Delete { id, step } => delete(ctx, store, id, step).await,
    }
}
