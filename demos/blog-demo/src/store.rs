use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: u64,
    pub title: String,
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// 内存中的文章存储
#[derive(Debug, Default)]
pub struct PostStore {
    posts: RwLock<BTreeMap<u64, Post>>,
}

impl PostStore {
    pub fn with_samples() -> Self {
        let store = Self::default();
        store.create("Hello Bex", "Controllers by convention.");
        store.create("Result handlers", "Return a description, let the handler write it.");
        store
    }

    pub fn list(&self) -> Vec<Post> {
        self.posts.read().values().cloned().collect()
    }

    pub fn get(&self, id: u64) -> Option<Post> {
        self.posts.read().get(&id).cloned()
    }

    pub fn create(&self, title: &str, body: &str) -> Post {
        let mut posts = self.posts.write();
        let id = posts.keys().next_back().map_or(1, |last| last + 1);
        let post = Post {
            id,
            title: title.to_string(),
            body: body.to_string(),
            published_at: None,
        };
        posts.insert(id, post.clone());
        post
    }

    pub fn update(&self, id: u64, title: Option<&str>, body: Option<&str>) -> Option<Post> {
        let mut posts = self.posts.write();
        let post = posts.get_mut(&id)?;
        if let Some(title) = title {
            post.title = title.to_string();
        }
        if let Some(body) = body {
            post.body = body.to_string();
        }
        Some(post.clone())
    }

    pub fn remove(&self, id: u64) -> Option<Post> {
        self.posts.write().remove(&id)
    }

    pub fn publish(&self, id: u64) -> Option<Post> {
        let mut posts = self.posts.write();
        let post = posts.get_mut(&id)?;
        post.published_at.get_or_insert_with(Utc::now);
        Some(post.clone())
    }
}
