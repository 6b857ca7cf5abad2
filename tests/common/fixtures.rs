//! Users, a small social graph and engine wiring shared by the test suites.

use chrono::Utc;
use social_portal::{
    config::ErasureConfig,
    erasure::{EntityFamily, ErasureEngine, ErasureStoreState},
    models::User,
};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

use super::memory::MemoryStore;

pub fn user_with_role(role: &str) -> User {
    let id = Uuid::new_v4();
    User {
        id,
        email: format!("{}@example.com", id.simple()),
        username: format!("user_{}", id.simple()),
        role: role.to_string(),
        is_active: true,
        is_banned: false,
        ban_reason: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn member() -> User {
    user_with_role("user")
}

/// Engine settings for tests: production batch size, no pause between batches.
pub fn test_config() -> ErasureConfig {
    ErasureConfig {
        batch_delay: Duration::ZERO,
        ..ErasureConfig::default()
    }
}

pub fn engine(store: &MemoryStore, config: ErasureConfig) -> ErasureEngine {
    ErasureEngine::new(Arc::new(store.clone()) as ErasureStoreState, config)
}

/// Ids of rows that must survive when `alice` is erased.
pub struct SocialGraph {
    pub alice: Uuid,
    pub bob: Uuid,
    pub carol: Uuid,
    pub survivors: Vec<(EntityFamily, Uuid)>,
}

/// seed_social_graph
///
/// Alice owns content that Bob interacted with, and interacted with Bob's
/// content herself. Bob and Carol also have rows that have nothing to do with
/// Alice. Every family of the cascade gets at least one of Alice's rows.
pub fn seed_social_graph(store: &MemoryStore) -> SocialGraph {
    use EntityFamily::*;

    let alice = store.insert_user(member());
    let bob = store.insert_user(member());
    let carol = store.insert_user(member());

    // Alice's post and everything Bob hung off it.
    let alice_post = store.insert(Posts, &[alice], &[]);
    let bob_reply = store.insert(Comments, &[bob], &[(Posts, alice_post)]);
    store.insert(CommentLikes, &[bob], &[(Comments, bob_reply)]);
    store.insert(CommentAuthorInfo, &[bob], &[(Comments, bob_reply)]);
    store.insert(Likes, &[bob], &[(Posts, alice_post)]);
    store.insert(SavedPosts, &[bob], &[(Posts, alice_post)]);
    store.insert(PostTags, &[], &[(Posts, alice_post)]);
    store.insert(Notifications, &[bob, alice], &[(Posts, alice_post)]);
    store.insert(Notifications, &[alice, bob], &[(Comments, bob_reply)]);

    // Alice's story.
    let alice_story = store.insert(Stories, &[alice], &[]);
    store.insert(StoryViews, &[bob], &[(Stories, alice_story)]);
    store.insert(StoryLikes, &[bob], &[(Stories, alice_story)]);
    store.insert(StoryHighlights, &[alice], &[(Stories, alice_story)]);

    // Bob's post: Alice's interactions go, Bob's own rows stay.
    let bob_post = store.insert(Posts, &[bob], &[]);
    let bob_comment = store.insert(Comments, &[bob], &[(Posts, bob_post)]);
    store.insert(Comments, &[alice], &[(Posts, bob_post)]);
    store.insert(CommentLikes, &[alice], &[(Comments, bob_comment)]);
    store.insert(Likes, &[alice], &[(Posts, bob_post)]);
    store.insert(Notifications, &[bob, alice], &[(Posts, bob_post)]);
    let bob_notification = store.insert(Notifications, &[bob], &[(Posts, bob_post)]);
    let bob_story = store.insert(Stories, &[bob], &[]);

    // Messaging.
    let alice_bob = store.insert(Conversations, &[alice, bob], &[]);
    store.insert(Messages, &[bob], &[(Conversations, alice_bob)]);
    store.insert(Messages, &[alice], &[(Conversations, alice_bob)]);
    let bob_carol = store.insert(Conversations, &[bob, carol], &[]);
    let bob_message = store.insert(Messages, &[bob], &[(Conversations, bob_carol)]);

    // Social graph.
    store.insert(Follows, &[alice, bob], &[]);
    store.insert(Follows, &[bob, alice], &[]);
    let bob_follows_carol = store.insert(Follows, &[bob, carol], &[]);
    store.insert(FollowRequests, &[carol, alice], &[]);

    // Account, session and audit.
    store.insert(Reports, &[bob, alice], &[]);
    store.insert(Reports, &[alice, carol], &[]);
    for family in [
        UserSettings,
        UserRoles,
        VerificationTokens,
        Sessions,
        UserMedia,
        UserActivityLogs,
    ] {
        store.insert(family, &[alice], &[]);
    }
    let bob_session = store.insert(Sessions, &[bob], &[]);

    SocialGraph {
        alice,
        bob,
        carol,
        survivors: vec![
            (Posts, bob_post),
            (Comments, bob_comment),
            (Notifications, bob_notification),
            (Stories, bob_story),
            (Conversations, bob_carol),
            (Messages, bob_message),
            (Follows, bob_follows_carol),
            (Sessions, bob_session),
        ],
    }
}
