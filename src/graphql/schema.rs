/*
 * Responsibility
 * - Query / Mutation / Subscription roots over users and posts
 * - Resolvers read RequestContext for identity and db; never the raw request
 */
use async_graphql::{
    ComplexObject, Context, ErrorExtensions, ID, Object, Result, Schema, SimpleObject,
    Subscription,
};
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::graphql::{context::RequestContext, credentials::CredentialCheck, feed::PostFeed};
use crate::repos::{
    error::RepoError,
    post_repo::{self, PostRow},
    user_repo::{self, UserRow},
};
use crate::services::auth::AuthError;

pub type AppSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

pub fn build_schema(feed: PostFeed) -> AppSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(feed)
        .extension(CredentialCheck)
        .finish()
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct User {
    pub id: Uuid,
    pub user_name: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            user_name: row.user_name,
            image_url: row.image_url,
            created_at: row.created_at,
        }
    }
}

#[ComplexObject]
impl User {
    async fn posts(&self, ctx: &Context<'_>) -> Result<Vec<Post>> {
        let req = ctx.data::<RequestContext>()?;
        let rows = post_repo::list_by_author(&req.db, self.id)
            .await
            .map_err(repo_error)?;
        Ok(rows.into_iter().map(Post::from).collect())
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct Post {
    pub id: ID,
    pub title: String,
    pub content: String,
    #[graphql(skip)]
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Self {
            id: ID(row.post_id.to_string()),
            title: row.title,
            content: row.content,
            author_id: row.author_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[ComplexObject]
impl Post {
    async fn author(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        let req = ctx.data::<RequestContext>()?;
        let row = user_repo::get(&req.db, self.author_id)
            .await
            .map_err(repo_error)?;
        Ok(row.map(User::from))
    }
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// The caller, resolved from the bearer token.
    async fn me(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        let req = ctx.data::<RequestContext>()?;
        let user_id = subject_as_user_id(req)?;
        let row = user_repo::get(&req.db, user_id).await.map_err(repo_error)?;
        Ok(row.map(User::from))
    }

    async fn users(&self, ctx: &Context<'_>) -> Result<Vec<User>> {
        let req = ctx.data::<RequestContext>()?;
        let rows = user_repo::list(&req.db).await.map_err(repo_error)?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn user(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<User>> {
        let req = ctx.data::<RequestContext>()?;
        let row = user_repo::get(&req.db, id).await.map_err(repo_error)?;
        Ok(row.map(User::from))
    }

    async fn posts(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 20)] limit: i32,
        #[graphql(default = 0)] offset: i32,
    ) -> Result<Vec<Post>> {
        let req = ctx.data::<RequestContext>()?;
        let (limit, offset) = page_bounds(limit, offset);
        let rows = post_repo::list(&req.db, limit, offset)
            .await
            .map_err(repo_error)?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn post(&self, ctx: &Context<'_>, id: ID) -> Result<Option<Post>> {
        let req = ctx.data::<RequestContext>()?;
        let post_id: i64 = id.parse().map_err(|_| "invalid post id")?;
        let row = post_repo::get(&req.db, post_id).await.map_err(repo_error)?;
        Ok(row.map(Post::from))
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn create_post(&self, ctx: &Context<'_>, title: String, content: String) -> Result<Post> {
        let req = ctx.data::<RequestContext>()?;
        let author_id = subject_as_user_id(req)?;

        if title.trim().is_empty() {
            return Err("title is required".into());
        }

        let row = post_repo::create(&req.db, &title, &content, author_id)
            .await
            .map_err(repo_error)?;
        let post = Post::from(row);

        ctx.data::<PostFeed>()?.publish(post.clone());
        tracing::info!(post_id = %post.id.as_str(), author_id = %author_id, "post created");

        Ok(post)
    }
}

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    async fn post_created(&self, ctx: &Context<'_>) -> Result<impl Stream<Item = Post>> {
        Ok(ctx.data::<PostFeed>()?.subscribe())
    }
}

// Subjects in this schema are user UUIDs
fn subject_as_user_id(req: &RequestContext) -> Result<Uuid> {
    let identity = req.require_identity().map_err(|e| e.extend())?;
    Uuid::parse_str(identity.as_str()).map_err(|_| AuthError::MalformedPayload.extend())
}

fn page_bounds(limit: i32, offset: i32) -> (i64, i64) {
    let limit = match i64::from(limit) {
        l if l <= 0 => DEFAULT_PAGE_SIZE,
        l => l.min(MAX_PAGE_SIZE),
    };
    (limit, i64::from(offset.max(0)))
}

fn repo_error(err: RepoError) -> async_graphql::Error {
    tracing::error!(error = ?err, "repository call failed");
    async_graphql::Error::new("internal error")
}
