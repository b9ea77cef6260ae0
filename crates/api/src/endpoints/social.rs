//! Event channel endpoints: posts, comments and reactions.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get, put},
};
use serde::Serialize;
use volunteer_common::AppResult;
use volunteer_core::{CommentView, CreateCommentInput, CreatePostInput, PostView, ReactInput};
use volunteer_db::entities::{
    channel, comment, json_strings, post,
    reaction::{self, ReactionKind},
};

use super::users::UserSummary;
use crate::{
    extractors::{AuthUser, Pagination},
    middleware::AppState,
    response::{ApiResponse, Paginated, no_content},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResponse {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub description: Option<String>,
    pub posts_count: i64,
    pub last_posted_at: Option<String>,
    pub created_at: String,
}

impl From<channel::Model> for ChannelResponse {
    fn from(c: channel::Model) -> Self {
        Self {
            id: c.id,
            event_id: c.event_id,
            name: c.name,
            description: c.description,
            posts_count: c.posts_count,
            last_posted_at: c.last_posted_at.map(|t| t.to_rfc3339()),
            created_at: c.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub author: Option<UserSummary>,
    pub content: String,
    pub image_urls: Vec<String>,
    pub comments_count: i32,
    pub reactions_count: i32,
    pub my_reaction: Option<ReactionKind>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<post::Model> for PostResponse {
    fn from(p: post::Model) -> Self {
        Self {
            image_urls: json_strings(&p.image_urls),
            id: p.id,
            channel_id: p.channel_id,
            author_id: p.author_id,
            author: None,
            content: p.content,
            comments_count: p.comments_count,
            reactions_count: p.reactions_count,
            my_reaction: None,
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.map(|t| t.to_rfc3339()),
        }
    }
}

impl From<PostView> for PostResponse {
    fn from(view: PostView) -> Self {
        Self {
            author: view.author.map(Into::into),
            my_reaction: view.my_reaction,
            ..view.post.into()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author: Option<UserSummary>,
    pub content: String,
    pub created_at: String,
}

impl From<comment::Model> for CommentResponse {
    fn from(c: comment::Model) -> Self {
        Self {
            id: c.id,
            post_id: c.post_id,
            author_id: c.author_id,
            author: None,
            content: c.content,
            created_at: c.created_at.to_rfc3339(),
        }
    }
}

impl From<CommentView> for CommentResponse {
    fn from(view: CommentView) -> Self {
        Self {
            author: view.author.map(Into::into),
            ..view.comment.into()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionResponse {
    pub post_id: String,
    pub user_id: String,
    pub kind: ReactionKind,
    pub created_at: String,
}

impl From<reaction::Model> for ReactionResponse {
    fn from(r: reaction::Model) -> Self {
        Self {
            post_id: r.post_id,
            user_id: r.user_id,
            kind: r.kind,
            created_at: r.created_at.to_rfc3339(),
        }
    }
}

async fn event_channel(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<ApiResponse<ChannelResponse>> {
    let channel = state
        .social_service
        .channel_for_event(&user, &event_id)
        .await?;
    Ok(ApiResponse::ok(channel.into()))
}

async fn list_posts(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    pagination: Pagination,
) -> AppResult<ApiResponse<Paginated<PostResponse>>> {
    let (posts, total) = state
        .social_service
        .list_posts(&user, &channel_id, pagination.limit, pagination.offset())
        .await?;

    let items = posts.into_iter().map(PostResponse::from).collect();
    Ok(ApiResponse::ok(Paginated::new(items, total, &pagination)))
}

async fn create_post(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(input): Json<CreatePostInput>,
) -> AppResult<ApiResponse<PostResponse>> {
    let post = state
        .social_service
        .create_post(&user, &channel_id, input)
        .await?;

    let mut response = PostResponse::from(post);
    response.author = Some(user.into());
    Ok(ApiResponse::created(response))
}

async fn delete_post(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.social_service.delete_post(&user, &post_id).await?;
    Ok(no_content())
}

async fn list_comments(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    pagination: Pagination,
) -> AppResult<ApiResponse<Paginated<CommentResponse>>> {
    let (comments, total) = state
        .social_service
        .list_comments(&user, &post_id, pagination.limit, pagination.offset())
        .await?;

    let items = comments.into_iter().map(CommentResponse::from).collect();
    Ok(ApiResponse::ok(Paginated::new(items, total, &pagination)))
}

async fn add_comment(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(input): Json<CreateCommentInput>,
) -> AppResult<ApiResponse<CommentResponse>> {
    let comment = state
        .social_service
        .add_comment(&user, &post_id, input)
        .await?;

    let mut response = CommentResponse::from(comment);
    response.author = Some(user.into());
    Ok(ApiResponse::created(response))
}

async fn delete_comment(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.social_service.delete_comment(&user, &comment_id).await?;
    Ok(no_content())
}

async fn react(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(input): Json<ReactInput>,
) -> AppResult<ApiResponse<ReactionResponse>> {
    let reaction = state
        .social_service
        .react(&user, &post_id, input.kind)
        .await?;
    Ok(ApiResponse::ok(reaction.into()))
}

async fn unreact(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.social_service.unreact(&user, &post_id).await?;
    Ok(no_content())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events/{id}/channel", get(event_channel))
        .route("/channels/{id}/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", delete(delete_post))
        .route("/posts/{id}/comments", get(list_comments).post(add_comment))
        .route("/comments/{id}", delete(delete_comment))
        .route("/posts/{id}/reactions", put(react).delete(unreact))
}
