//! Event social feed: channels, posts, comments and reactions.
//!
//! Every approved event owns one channel. Its members are the event's
//! creator, admins, and users holding a registered or waitlisted
//! registration.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::Set;
use serde::Deserialize;
use validator::Validate;
use volunteer_common::{AppError, AppResult, IdGenerator};
use volunteer_db::{
    entities::{
        channel, comment, event,
        notification::NotificationKind,
        post,
        reaction::{self, ReactionKind},
        user,
    },
    repositories::{
        ChannelRepository, CommentRepository, EventRepository, PostRepository,
        ReactionRepository, RegistrationRepository, UserRepository,
    },
};

use crate::services::notification::{NewNotification, NotificationService};

/// Most members notified about one new post.
pub const MAX_POST_FANOUT: usize = 200;

const MAX_POST_IMAGES: usize = 4;

/// Build the channel row for an event.
pub(crate) fn new_channel(id: String, event: &event::Model) -> channel::ActiveModel {
    channel::ActiveModel {
        id: Set(id),
        event_id: Set(event.id.clone()),
        name: Set(event.title.clone()),
        description: Set(Some(format!("Updates and chat for {}", event.title))),
        posts_count: Set(0),
        last_posted_at: Set(None),
        created_at: Set(Utc::now().into()),
    }
}

/// Input for a new post.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

/// Input for a new comment.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCommentInput {
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
}

/// Input for reacting to a post.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReactInput {
    pub kind: ReactionKind,
}

/// A post with its author and the caller's reaction.
#[derive(Debug, Clone)]
pub struct PostView {
    pub post: post::Model,
    pub author: Option<user::Model>,
    pub my_reaction: Option<ReactionKind>,
}

/// A comment with its author.
#[derive(Debug, Clone)]
pub struct CommentView {
    pub comment: comment::Model,
    pub author: Option<user::Model>,
}

/// Social feed service.
#[derive(Clone)]
pub struct SocialService {
    event_repo: EventRepository,
    registration_repo: RegistrationRepository,
    channel_repo: ChannelRepository,
    post_repo: PostRepository,
    comment_repo: CommentRepository,
    reaction_repo: ReactionRepository,
    user_repo: UserRepository,
    notification_service: NotificationService,
    id_gen: IdGenerator,
}

impl SocialService {
    /// Create a new social service.
    #[must_use]
    pub const fn new(
        event_repo: EventRepository,
        registration_repo: RegistrationRepository,
        channel_repo: ChannelRepository,
        post_repo: PostRepository,
        comment_repo: CommentRepository,
        reaction_repo: ReactionRepository,
        user_repo: UserRepository,
        notification_service: NotificationService,
    ) -> Self {
        Self {
            event_repo,
            registration_repo,
            channel_repo,
            post_repo,
            comment_repo,
            reaction_repo,
            user_repo,
            notification_service,
            id_gen: IdGenerator::new(),
        }
    }

    /// The channel of an event, for its members.
    pub async fn channel_for_event(
        &self,
        actor: &user::Model,
        event_id: &str,
    ) -> AppResult<channel::Model> {
        let event = self.event_repo.get_by_id(event_id).await?;
        let channel = self
            .channel_repo
            .find_by_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("This event has no channel yet".to_string()))?;
        self.ensure_member(actor, &event).await?;
        Ok(channel)
    }

    /// Posts of a channel, newest first.
    pub async fn list_posts(
        &self,
        actor: &user::Model,
        channel_id: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<PostView>, u64)> {
        let channel = self.channel_repo.get_by_id(channel_id).await?;
        self.ensure_channel_member(actor, &channel).await?;

        let (posts, total) = self
            .post_repo
            .find_by_channel(channel_id, limit, offset)
            .await?;
        if posts.is_empty() {
            return Ok((Vec::new(), total));
        }

        let post_ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
        let mut author_ids: Vec<String> = posts.iter().map(|p| p.author_id.clone()).collect();
        author_ids.sort();
        author_ids.dedup();

        let authors = self.users_by_id(&author_ids).await?;
        let my_reactions: HashMap<String, ReactionKind> = self
            .reaction_repo
            .find_by_user_for_posts(&actor.id, &post_ids)
            .await?
            .into_iter()
            .map(|r| (r.post_id, r.kind))
            .collect();

        let views = posts
            .into_iter()
            .map(|post| PostView {
                author: authors.get(&post.author_id).cloned(),
                my_reaction: my_reactions.get(&post.id).copied(),
                post,
            })
            .collect();

        Ok((views, total))
    }

    /// Post to a channel and tell the other members.
    pub async fn create_post(
        &self,
        actor: &user::Model,
        channel_id: &str,
        input: CreatePostInput,
    ) -> AppResult<post::Model> {
        input.validate()?;
        let content = input.content.trim().to_string();
        if content.is_empty() {
            return Err(AppError::Validation("Post content is empty".to_string()));
        }
        let image_urls = validate_image_urls(input.image_urls)?;

        let channel = self.channel_repo.get_by_id(channel_id).await?;
        let event = self.ensure_channel_member(actor, &channel).await?;

        let model = post::ActiveModel {
            id: Set(self.id_gen.generate()),
            channel_id: Set(channel.id.clone()),
            author_id: Set(actor.id.clone()),
            content: Set(content),
            image_urls: Set(serde_json::json!(image_urls)),
            comments_count: Set(0),
            reactions_count: Set(0),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };
        let post = self.post_repo.create(model).await?;
        self.channel_repo.increment_posts_count(&channel.id).await?;

        match self.registration_repo.find_live_user_ids(&event.id).await {
            Ok(participants) => {
                let mut recipients = Vec::with_capacity(participants.len() + 1);
                recipients.push(event.created_by.clone());
                recipients.extend(participants);
                recipients.retain(|id| id != &actor.id);
                if recipients.len() > MAX_POST_FANOUT {
                    tracing::debug!(
                        channel_id = %channel.id,
                        members = recipients.len(),
                        "Capping post notification fan-out"
                    );
                    recipients.truncate(MAX_POST_FANOUT);
                }

                let notice = NewNotification::new(
                    NotificationKind::NewPost,
                    format!("New post in {}", channel.name),
                    format!("{}: {}", actor.name, preview(&post.content)),
                )
                .actor(&actor.id)
                .event(&event.id)
                .link(format!("/events/{}/channel", event.id));
                self.notification_service
                    .notify_many(&recipients, &notice)
                    .await;
            }
            Err(e) => tracing::warn!(error = %e, post_id = %post.id, "Failed to load channel members"),
        }

        Ok(post)
    }

    /// Delete a post as its author or an admin.
    pub async fn delete_post(&self, actor: &user::Model, post_id: &str) -> AppResult<()> {
        let post = self.post_repo.get_by_id(post_id).await?;
        if post.author_id != actor.id && !actor.is_admin() {
            return Err(AppError::Forbidden(
                "Only the author or an admin can delete this post".to_string(),
            ));
        }

        self.post_repo.delete(&post.id).await?;
        self.channel_repo.decrement_posts_count(&post.channel_id).await?;
        Ok(())
    }

    /// Comments of a post, oldest first.
    pub async fn list_comments(
        &self,
        actor: &user::Model,
        post_id: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<CommentView>, u64)> {
        let post = self.post_repo.get_by_id(post_id).await?;
        self.ensure_post_member(actor, &post).await?;

        let (comments, total) = self.comment_repo.find_by_post(post_id, limit, offset).await?;
        let mut author_ids: Vec<String> = comments.iter().map(|c| c.author_id.clone()).collect();
        author_ids.sort();
        author_ids.dedup();
        let authors = self.users_by_id(&author_ids).await?;

        let views = comments
            .into_iter()
            .map(|comment| CommentView {
                author: authors.get(&comment.author_id).cloned(),
                comment,
            })
            .collect();
        Ok((views, total))
    }

    /// Comment on a post and tell its author.
    pub async fn add_comment(
        &self,
        actor: &user::Model,
        post_id: &str,
        input: CreateCommentInput,
    ) -> AppResult<comment::Model> {
        input.validate()?;
        let content = input.content.trim().to_string();
        if content.is_empty() {
            return Err(AppError::Validation("Comment content is empty".to_string()));
        }

        let post = self.post_repo.get_by_id(post_id).await?;
        let event = self.ensure_post_member(actor, &post).await?;

        let model = comment::ActiveModel {
            id: Set(self.id_gen.generate()),
            post_id: Set(post.id.clone()),
            author_id: Set(actor.id.clone()),
            content: Set(content),
            created_at: Set(Utc::now().into()),
        };
        let comment = self.comment_repo.create(model).await?;
        self.post_repo.adjust_comments_count(&post.id, 1).await?;

        if post.author_id != actor.id {
            let notice = NewNotification::new(
                NotificationKind::NewComment,
                "New comment on your post",
                format!("{}: {}", actor.name, preview(&comment.content)),
            )
            .actor(&actor.id)
            .event(&event.id)
            .link(format!("/events/{}/channel", event.id));
            self.notification_service.notify(&post.author_id, &notice).await;
        }

        Ok(comment)
    }

    /// Delete a comment as its author, the post's author, or an admin.
    pub async fn delete_comment(&self, actor: &user::Model, comment_id: &str) -> AppResult<()> {
        let comment = self.comment_repo.get_by_id(comment_id).await?;
        let post = self.post_repo.get_by_id(&comment.post_id).await?;

        let allowed =
            comment.author_id == actor.id || post.author_id == actor.id || actor.is_admin();
        if !allowed {
            return Err(AppError::Forbidden(
                "You cannot delete this comment".to_string(),
            ));
        }

        self.comment_repo.delete(&comment.id).await?;
        self.post_repo.adjust_comments_count(&post.id, -1).await?;
        Ok(())
    }

    /// React to a post, replacing any earlier reaction by the caller.
    pub async fn react(
        &self,
        actor: &user::Model,
        post_id: &str,
        kind: ReactionKind,
    ) -> AppResult<reaction::Model> {
        let post = self.post_repo.get_by_id(post_id).await?;
        let event = self.ensure_post_member(actor, &post).await?;

        if let Some(existing) = self
            .reaction_repo
            .find_by_user_and_post(&actor.id, post_id)
            .await?
        {
            if existing.kind == kind {
                return Ok(existing);
            }
            let mut active: reaction::ActiveModel = existing.into();
            active.kind = Set(kind);
            return self.reaction_repo.update(active).await;
        }

        let model = reaction::ActiveModel {
            id: Set(self.id_gen.generate()),
            post_id: Set(post.id.clone()),
            user_id: Set(actor.id.clone()),
            kind: Set(kind),
            created_at: Set(Utc::now().into()),
        };
        let reaction = self.reaction_repo.create(model).await?;
        self.post_repo.adjust_reactions_count(&post.id, 1).await?;

        if post.author_id != actor.id {
            let notice = NewNotification::new(
                NotificationKind::NewReaction,
                "New reaction on your post",
                format!("{} reacted to your post", actor.name),
            )
            .actor(&actor.id)
            .event(&event.id)
            .link(format!("/events/{}/channel", event.id));
            self.notification_service.notify(&post.author_id, &notice).await;
        }

        Ok(reaction)
    }

    /// Remove the caller's reaction, if any.
    pub async fn unreact(&self, actor: &user::Model, post_id: &str) -> AppResult<()> {
        let post = self.post_repo.get_by_id(post_id).await?;
        if self
            .reaction_repo
            .delete_by_user_and_post(&actor.id, &post.id)
            .await?
        {
            self.post_repo.adjust_reactions_count(&post.id, -1).await?;
        }
        Ok(())
    }

    /// Check channel membership for an event and return it.
    async fn ensure_member(&self, actor: &user::Model, event: &event::Model) -> AppResult<()> {
        if actor.is_admin() || event.created_by == actor.id {
            return Ok(());
        }
        if self
            .registration_repo
            .is_live_participant(&actor.id, &event.id)
            .await?
        {
            return Ok(());
        }
        Err(AppError::Forbidden(
            "Only event participants can use this channel".to_string(),
        ))
    }

    async fn ensure_channel_member(
        &self,
        actor: &user::Model,
        channel: &channel::Model,
    ) -> AppResult<event::Model> {
        let event = self.event_repo.get_by_id(&channel.event_id).await?;
        self.ensure_member(actor, &event).await?;
        Ok(event)
    }

    async fn ensure_post_member(
        &self,
        actor: &user::Model,
        post: &post::Model,
    ) -> AppResult<event::Model> {
        let channel = self.channel_repo.get_by_id(&post.channel_id).await?;
        self.ensure_channel_member(actor, &channel).await
    }

    async fn users_by_id(&self, ids: &[String]) -> AppResult<HashMap<String, user::Model>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .user_repo
            .find_by_ids(ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect())
    }
}

fn validate_image_urls(urls: Vec<String>) -> AppResult<Vec<String>> {
    if urls.len() > MAX_POST_IMAGES {
        return Err(AppError::Validation(format!(
            "A post can have at most {MAX_POST_IMAGES} images"
        )));
    }
    urls.into_iter()
        .map(|u| {
            let u = u.trim().to_string();
            match url::Url::parse(&u) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(u),
                _ => Err(AppError::Validation(format!("Invalid image URL: {u}"))),
            }
        })
        .collect()
}

/// First 100 characters of a text, for notification bodies.
fn preview(text: &str) -> String {
    const LIMIT: usize = 100;
    if text.chars().count() <= LIMIT {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(LIMIT).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;
    use volunteer_db::entities::event::EventStatus;
    use volunteer_db::entities::registration::RegistrationStatus;
    use volunteer_db::entities::user::Role;
    use volunteer_db::repositories::NotificationRepository;

    fn service(db: MockDatabase) -> SocialService {
        let db = Arc::new(db.into_connection());
        SocialService::new(
            EventRepository::new(db.clone()),
            RegistrationRepository::new(db.clone()),
            ChannelRepository::new(db.clone()),
            PostRepository::new(db.clone()),
            CommentRepository::new(db.clone()),
            ReactionRepository::new(db.clone()),
            UserRepository::new(db.clone()),
            NotificationService::new(NotificationRepository::new(db)),
        )
    }

    fn channel(id: &str, event_id: &str) -> channel::Model {
        channel::Model {
            id: id.to_string(),
            event_id: event_id.to_string(),
            name: "Beach cleanup".to_string(),
            description: None,
            posts_count: 0,
            last_posted_at: None,
            created_at: Utc::now().into(),
        }
    }

    fn post(id: &str, channel_id: &str, author_id: &str) -> post::Model {
        post::Model {
            id: id.to_string(),
            channel_id: channel_id.to_string(),
            author_id: author_id.to_string(),
            content: "See you at 9".to_string(),
            image_urls: serde_json::json!([]),
            comments_count: 0,
            reactions_count: 0,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn exec(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    #[test]
    fn test_new_channel_named_after_event() {
        let event = fixtures::event("e1", "m1", EventStatus::Approved);
        let model = new_channel("c1".to_string(), &event);
        assert_eq!(model.event_id.unwrap(), "e1");
        assert_eq!(model.name.unwrap(), "Beach cleanup");
        assert_eq!(model.posts_count.unwrap(), 0);
    }

    #[test]
    fn test_image_url_rules() {
        assert!(validate_image_urls(vec!["https://cdn.example.com/a.png".to_string()]).is_ok());
        assert!(validate_image_urls(vec!["javascript:alert(1)".to_string()]).is_err());
        let five = vec!["https://cdn.example.com/a.png".to_string(); 5];
        assert!(validate_image_urls(five).is_err());
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(150);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), 101);
        assert!(cut.ends_with('…'));
    }

    #[tokio::test]
    async fn test_non_member_cannot_read_posts() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[channel("c1", "e1")]])
            .append_query_results([[fixtures::event("e1", "m1", EventStatus::Approved)]])
            .append_query_results([Vec::<volunteer_db::entities::registration::Model>::new()]);
        let service = service(db);
        let outsider = fixtures::user("v9", Role::Volunteer);

        let result = service.list_posts(&outsider, "c1", 20, 0).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_cancelled_participant_is_not_a_member() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[channel("c1", "e1")]])
            .append_query_results([[fixtures::event("e1", "m1", EventStatus::Approved)]])
            .append_query_results([[fixtures::registration(
                "r1",
                "v1",
                "e1",
                RegistrationStatus::Cancelled,
            )]]);
        let service = service(db);
        let volunteer = fixtures::user("v1", Role::Volunteer);

        let result = service
            .create_post(
                &volunteer,
                "c1",
                CreatePostInput {
                    content: "Hello".to_string(),
                    image_urls: Vec::new(),
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_creator_posts_and_counter_moves() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[channel("c1", "e1")]])
            .append_query_results([[fixtures::event("e1", "m1", EventStatus::Approved)]])
            .append_query_results([[post("p1", "c1", "m1")]])
            .append_exec_results([exec(1)]);
        let service = service(db);
        let manager = fixtures::user("m1", Role::Manager);

        let created = service
            .create_post(
                &manager,
                "c1",
                CreatePostInput {
                    content: "  See you at 9  ".to_string(),
                    image_urls: Vec::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(created.id, "p1");
    }

    #[tokio::test]
    async fn test_only_author_or_admin_deletes_post() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[post("p1", "c1", "v1")]]);
        let service = service(db);
        let other = fixtures::user("v2", Role::Volunteer);

        let result = service.delete_post(&other, "p1").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_post_author_may_delete_comment() {
        let comment = comment::Model {
            id: "cm1".to_string(),
            post_id: "p1".to_string(),
            author_id: "v2".to_string(),
            content: "Spam".to_string(),
            created_at: Utc::now().into(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[comment]])
            .append_query_results([[post("p1", "c1", "v1")]])
            .append_exec_results([exec(1), exec(1)]);
        let service = service(db);
        let post_author = fixtures::user("v1", Role::Volunteer);

        assert!(service.delete_comment(&post_author, "cm1").await.is_ok());
    }

    #[tokio::test]
    async fn test_unreact_without_reaction_is_noop() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[post("p1", "c1", "v1")]])
            .append_exec_results([exec(0)]);
        let service = service(db);
        let volunteer = fixtures::user("v2", Role::Volunteer);

        assert!(service.unreact(&volunteer, "p1").await.is_ok());
    }
}
