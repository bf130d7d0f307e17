//! In-memory repositories backing `AppState::fake()`.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{
    Comment, CommentRepository, FeedItem, FeedQuery, FollowerRepository, NewComment, NewPost,
    NewUser, Post, PostChanges, PostRepository, Role, RoleRepository, SortOrder, Storage,
    StoreError, StoreResult, User, UserRepository,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    roles: Vec<Role>,
    users: HashMap<i64, User>,
    invitations: HashMap<String, (i64, OffsetDateTime)>,
    posts: HashMap<i64, Post>,
    comments: Vec<Comment>,
    // (followed, follower)
    followers: HashSet<(i64, i64)>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn role(&self, name: &str) -> Option<Role> {
        self.roles.iter().find(|r| r.name == name).cloned()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    user_reads: AtomicUsize,
    fail_deletes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let store = Self::default();
        {
            let mut t = store.tables.lock().unwrap();
            for (name, level) in [("admin", 1), ("moderator", 2), ("user", 3)] {
                let id = t.next_id();
                t.roles.push(Role {
                    id,
                    name: name.into(),
                    level,
                    description: String::new(),
                });
            }
        }
        Arc::new(store)
    }

    pub fn storage(self: &Arc<Self>) -> Storage {
        Storage {
            users: self.clone(),
            posts: self.clone(),
            comments: self.clone(),
            followers: self.clone(),
            roles: self.clone(),
        }
    }

    /// Number of `get_by_id` calls served so far.
    pub fn user_reads(&self) -> usize {
        self.user_reads.load(Ordering::SeqCst)
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Inserts an already activated user with the given role.
    pub fn seed_user(&self, username: &str, role: &str) -> User {
        let mut t = self.tables.lock().unwrap();
        let id = t.next_id();
        let user = User {
            id,
            username: username.into(),
            email: format!("{username}@example.com"),
            password_hash: String::new(),
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
            role: t.role(role).expect("seeded role"),
        };
        t.users.insert(id, user.clone());
        user
    }

    pub fn expire_invitations(&self) {
        let mut t = self.tables.lock().unwrap();
        let past = OffsetDateTime::now_utc() - time::Duration::minutes(1);
        for (_, expiry) in t.invitations.values_mut() {
            *expiry = past;
        }
    }

    pub fn invitation_count(&self) -> usize {
        self.tables.lock().unwrap().invitations.len()
    }

    pub fn invitation_hashes(&self) -> Vec<String> {
        self.tables.lock().unwrap().invitations.keys().cloned().collect()
    }

    pub fn peek_user(&self, id: i64) -> Option<User> {
        self.tables.lock().unwrap().users.get(&id).cloned()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_and_invite(
        &self,
        user: NewUser,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<User> {
        let mut t = self.tables.lock().unwrap();
        if t.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        if t.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::DuplicateUsername);
        }
        let role = t.role(super::users::DEFAULT_ROLE).ok_or(StoreError::NotFound)?;
        let id = t.next_id();
        let created = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            is_active: false,
            created_at: OffsetDateTime::now_utc(),
            role,
        };
        t.users.insert(id, created.clone());
        t.invitations.insert(token_hash.to_string(), (id, expires_at));
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<User> {
        self.user_reads.fetch_add(1, Ordering::SeqCst);
        self.peek_user(id).ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<User> {
        let t = self.tables.lock().unwrap();
        t.users
            .values()
            .find(|u| u.email == email && u.is_active)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn activate(&self, token_hash: &str) -> StoreResult<()> {
        let mut t = self.tables.lock().unwrap();
        let now = OffsetDateTime::now_utc();
        let user_id = match t.invitations.get(token_hash) {
            Some((user_id, expiry)) if *expiry > now => *user_id,
            _ => return Err(StoreError::NotFound),
        };
        let user = t.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.is_active = true;
        t.invitations.retain(|_, (uid, _)| *uid != user_id);
        Ok(())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout);
        }
        let mut t = self.tables.lock().unwrap();
        t.invitations.retain(|_, (uid, _)| *uid != id);
        t.users.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn create(&self, post: NewPost) -> StoreResult<Post> {
        let mut t = self.tables.lock().unwrap();
        let id = t.next_id();
        let now = OffsetDateTime::now_utc();
        let created = Post {
            id,
            user_id: post.user_id,
            title: post.title,
            content: post.content,
            tags: post.tags,
            created_at: now,
            updated_at: now,
            comments: Vec::new(),
        };
        t.posts.insert(id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Post> {
        let t = self.tables.lock().unwrap();
        t.posts.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update(&self, id: i64, changes: PostChanges) -> StoreResult<Post> {
        let mut t = self.tables.lock().unwrap();
        let post = t.posts.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(title) = changes.title {
            post.title = title;
        }
        if let Some(content) = changes.content {
            post.content = content;
        }
        post.updated_at = OffsetDateTime::now_utc();
        Ok(post.clone())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let mut t = self.tables.lock().unwrap();
        t.comments.retain(|c| c.post_id != id);
        t.posts.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn user_feed(&self, user_id: i64, query: &FeedQuery) -> StoreResult<Vec<FeedItem>> {
        let t = self.tables.lock().unwrap();
        let visible = |author: i64| author == user_id || t.followers.contains(&(author, user_id));
        let search = query.search.as_deref().map(str::to_lowercase);

        let mut items: Vec<FeedItem> = t
            .posts
            .values()
            .filter(|p| visible(p.user_id))
            .filter(|p| match &search {
                Some(s) => {
                    p.title.to_lowercase().contains(s) || p.content.to_lowercase().contains(s)
                }
                None => true,
            })
            .filter(|p| query.tags.iter().all(|tag| p.tags.contains(tag)))
            .map(|p| FeedItem {
                id: p.id,
                user_id: p.user_id,
                username: t
                    .users
                    .get(&p.user_id)
                    .map(|u| u.username.clone())
                    .unwrap_or_default(),
                title: p.title.clone(),
                content: p.content.clone(),
                tags: p.tags.clone(),
                created_at: p.created_at,
                updated_at: p.updated_at,
                comments_count: t.comments.iter().filter(|c| c.post_id == p.id).count() as i64,
            })
            .collect();

        items.sort_by_key(|i| (i.created_at, i.id));
        if query.sort == SortOrder::Desc {
            items.reverse();
        }
        Ok(items
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect())
    }
}

#[async_trait]
impl CommentRepository for MemoryStore {
    async fn create(&self, comment: NewComment) -> StoreResult<Comment> {
        let mut t = self.tables.lock().unwrap();
        if !t.posts.contains_key(&comment.post_id) {
            return Err(StoreError::NotFound);
        }
        let username = t
            .users
            .get(&comment.user_id)
            .map(|u| u.username.clone())
            .ok_or(StoreError::NotFound)?;
        let id = t.next_id();
        let created = Comment {
            id,
            post_id: comment.post_id,
            user_id: comment.user_id,
            username,
            content: comment.content,
            created_at: OffsetDateTime::now_utc(),
        };
        t.comments.push(created.clone());
        Ok(created)
    }

    async fn list_by_post(&self, post_id: i64) -> StoreResult<Vec<Comment>> {
        let t = self.tables.lock().unwrap();
        let mut out: Vec<Comment> = t
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| std::cmp::Reverse((c.created_at, c.id)));
        Ok(out)
    }
}

#[async_trait]
impl FollowerRepository for MemoryStore {
    async fn follow(&self, follower_id: i64, followed_id: i64) -> StoreResult<()> {
        let mut t = self.tables.lock().unwrap();
        if !t.users.contains_key(&followed_id) {
            return Err(StoreError::NotFound);
        }
        if !t.followers.insert((followed_id, follower_id)) {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> StoreResult<()> {
        self.tables
            .lock()
            .unwrap()
            .followers
            .remove(&(followed_id, follower_id));
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn get_by_name(&self, name: &str) -> StoreResult<Role> {
        self.tables
            .lock()
            .unwrap()
            .role(name)
            .ok_or(StoreError::NotFound)
    }
}
