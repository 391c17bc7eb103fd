use metrics::counter;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::application::context::{RequestContext, require_user};
use crate::application::pagination::{POSTS_PER_PAGE, PageRequest, PageSelector, Paginated};
use crate::application::repos::{
    CreatePostParams, PostQueryFilter, PostStore, TextMatch, UpdatePostParams,
};
use crate::domain::posts::{PostInput, ValidPost};

use super::METRIC_POSTS_WRITTEN;
use super::types::{DeleteStep, FormTarget, ListQuery, Outcome, PostError, PostForm, Submission};

/// Posts whose content contains the search term, ignoring case, newest first.
pub async fn list(
    ctx: &RequestContext,
    store: &dyn PostStore,
    query: ListQuery,
) -> Result<Outcome, PostError> {
    require_user(ctx)?;

    let selector = query
        .page
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(str::parse::<PageSelector>)
        .transpose()?;

    let filter =
        PostQueryFilter::content_contains(query.search.clone(), TextMatch::CaseInsensitive);
    let total = store.count_posts(&filter).await?;
    let request = PageRequest::resolve(selector, total, POSTS_PER_PAGE)?;
    let items = store.list_posts(&filter, request).await?;

    Ok(Outcome::Listing {
        page: Paginated::new(items, request, total),
        search: query.search,
    })
}

pub async fn detail(
    ctx: &RequestContext,
    store: &dyn PostStore,
    id: Uuid,
) -> Result<Outcome, PostError> {
    require_user(ctx)?;

    store
        .find_post(id)
        .await?
        .map(Outcome::Post)
        .ok_or(PostError::NotFound)
}

pub async fn create(
    ctx: &RequestContext,
    store: &dyn PostStore,
    submission: Submission,
) -> Result<Outcome, PostError> {
    let user = require_user(ctx)?;

    let input = match submission {
        Submission::Show => return Ok(Outcome::Form(PostForm::blank(FormTarget::Create))),
        Submission::Submit(input) => input,
    };
    let ValidPost { title, content } = validated(FormTarget::Create, input)?;

    let record = store
        .create_post(CreatePostParams {
            title,
            content,
            author_id: user.id,
            date_posted: OffsetDateTime::now_utc(),
        })
        .await?;

    counter!(METRIC_POSTS_WRITTEN, "op" => "create").increment(1);
    info!(target: "quill::posts", post_id = %record.id, author = %user.id, "post created");

    Ok(Outcome::redirect_root())
}

/// Overwrites title and content. The updater becomes the post's author.
pub async fn update(
    ctx: &RequestContext,
    store: &dyn PostStore,
    id: Uuid,
    submission: Submission,
) -> Result<Outcome, PostError> {
    let user = require_user(ctx)?;
    let existing = store.find_post(id).await?.ok_or(PostError::NotFound)?;

    let input = match submission {
        Submission::Show => {
            let input = PostInput::new(existing.title, existing.content);
            return Ok(Outcome::Form(PostForm::filled(FormTarget::Update(id), input)));
        }
        Submission::Submit(input) => input,
    };
    let ValidPost { title, content } = validated(FormTarget::Update(id), input)?;

    store
        .update_post(UpdatePostParams {
            id,
            title,
            content,
            author_id: user.id,
        })
        .await?;

    counter!(METRIC_POSTS_WRITTEN, "op" => "update").increment(1);
    info!(
        target: "quill::posts",
        post_id = %id,
        previous_author = %existing.author_id,
        author = %user.id,
        "post updated"
    );

    Ok(Outcome::redirect_to_post(id))
}

pub async fn delete(
    ctx: &RequestContext,
    store: &dyn PostStore,
    id: Uuid,
    step: DeleteStep,
) -> Result<Outcome, PostError> {
    let user = require_user(ctx)?;

    match step {
        DeleteStep::Confirm => store
            .find_post(id)
            .await?
            .map(Outcome::ConfirmDelete)
            .ok_or(PostError::NotFound),
        DeleteStep::Confirmed => {
            store.delete_post(id).await?;

            counter!(METRIC_POSTS_WRITTEN, "op" => "delete").increment(1);
            info!(target: "quill::posts", post_id = %id, deleted_by = %user.id, "post deleted");

            Ok(Outcome::redirect_root())
        }
    }
}

fn validated(target: FormTarget, input: PostInput) -> Result<ValidPost, PostError> {
    match input.validate() {
        Ok(valid) => Ok(valid),
        Err(errors) => Err(PostError::Validation(PostForm::with_errors(
            target, input, errors,
        ))),
    }
}
