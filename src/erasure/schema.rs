use serde::Serialize;

/// EntityFamily
///
/// Every table that holds rows owned, directly or transitively, by a user.
/// The set is closed: adding a table to the schema means adding a variant here,
/// and the exhaustive matches below refuse to compile until the new family has
/// a table name, an ownership filter and a place in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityFamily {
    // Ephemeral content
    StoryViews,
    StoryLikes,
    StoryHighlights,
    Stories,
    // Notifications point at posts and comments, so they go before both.
    Notifications,
    // Content
    CommentLikes,
    CommentAuthorInfo,
    Comments,
    Likes,
    SavedPosts,
    PostTags,
    Posts,
    // Messaging
    Messages,
    Conversations,
    // Social graph
    FollowRequests,
    Follows,
    // Account, session and audit
    Reports,
    UserSettings,
    UserRoles,
    VerificationTokens,
    Sessions,
    UserMedia,
    UserActivityLogs,
}

/// CASCADE_ORDER
///
/// The purge order, leaves first. A family appears only after every family
/// that can hold a foreign key into it. The `users` row itself is removed
/// after the last entry.
pub const CASCADE_ORDER: [EntityFamily; 23] = [
    EntityFamily::StoryViews,
    EntityFamily::StoryLikes,
    EntityFamily::StoryHighlights,
    EntityFamily::Stories,
    EntityFamily::Notifications,
    EntityFamily::CommentLikes,
    EntityFamily::CommentAuthorInfo,
    EntityFamily::Comments,
    EntityFamily::Likes,
    EntityFamily::SavedPosts,
    EntityFamily::PostTags,
    EntityFamily::Posts,
    EntityFamily::Messages,
    EntityFamily::Conversations,
    EntityFamily::FollowRequests,
    EntityFamily::Follows,
    EntityFamily::Reports,
    EntityFamily::UserSettings,
    EntityFamily::UserRoles,
    EntityFamily::VerificationTokens,
    EntityFamily::Sessions,
    EntityFamily::UserMedia,
    EntityFamily::UserActivityLogs,
];

/// Key used for the user row in per-family counts.
pub const USER_FAMILY: &str = "users";

// Sub-selects shared by several ownership filters. `$1` is always the user id.
const OWN_STORIES: &str = "SELECT id FROM stories WHERE user_id = $1";
const OWN_POSTS: &str = "SELECT id FROM posts WHERE user_id = $1";
const DOOMED_COMMENTS: &str =
    "SELECT id FROM comments WHERE user_id = $1 OR post_id IN (SELECT id FROM posts WHERE user_id = $1)";
const OWN_CONVERSATIONS: &str =
    "SELECT id FROM conversations WHERE participant_one_id = $1 OR participant_two_id = $1";

impl EntityFamily {
    /// Stable snake_case name used in counts, logs and error context.
    pub fn name(self) -> &'static str {
        match self {
            Self::StoryViews => "story_views",
            Self::StoryLikes => "story_likes",
            Self::StoryHighlights => "story_highlights",
            Self::Stories => "stories",
            Self::Notifications => "notifications",
            Self::CommentLikes => "comment_likes",
            Self::CommentAuthorInfo => "comment_author_info",
            Self::Comments => "comments",
            Self::Likes => "likes",
            Self::SavedPosts => "saved_posts",
            Self::PostTags => "post_tags",
            Self::Posts => "posts",
            Self::Messages => "messages",
            Self::Conversations => "conversations",
            Self::FollowRequests => "follow_requests",
            Self::Follows => "follows",
            Self::Reports => "reports",
            Self::UserSettings => "user_settings",
            Self::UserRoles => "user_roles",
            Self::VerificationTokens => "verification_tokens",
            Self::Sessions => "sessions",
            Self::UserMedia => "user_media",
            Self::UserActivityLogs => "user_activity_logs",
        }
    }

    /// Physical table name. Identical to `name()` today, kept separate so a
    /// table rename does not change the reported family keys.
    pub fn table(self) -> &'static str {
        self.name()
    }

    /// key_columns
    ///
    /// Primary key of the family's table. Batches are picked by key so a row
    /// updated by a concurrent transaction is still matched once its lock is
    /// released.
    pub fn key_columns(self) -> &'static str {
        match self {
            Self::PostTags => "post_id, tag_id",
            Self::Follows => "follower_id, following_id",
            Self::UserSettings => "user_id",
            Self::StoryViews
            | Self::StoryLikes
            | Self::StoryHighlights
            | Self::Stories
            | Self::Notifications
            | Self::CommentLikes
            | Self::CommentAuthorInfo
            | Self::Comments
            | Self::Likes
            | Self::SavedPosts
            | Self::Posts
            | Self::Messages
            | Self::Conversations
            | Self::FollowRequests
            | Self::Reports
            | Self::UserRoles
            | Self::VerificationTokens
            | Self::Sessions
            | Self::UserMedia
            | Self::UserActivityLogs => "id",
        }
    }

    /// owner_filter
    ///
    /// SQL predicate selecting every row of this family that must disappear
    /// with the user bound to `$1`. Doubly linked families (follows,
    /// conversations, messages) match when the user is either endpoint; rows
    /// hanging off a doomed parent match through a sub-select on that parent.
    pub fn owner_filter(self) -> String {
        match self {
            Self::StoryViews => format!("viewer_id = $1 OR story_id IN ({OWN_STORIES})"),
            Self::StoryLikes | Self::StoryHighlights => {
                format!("user_id = $1 OR story_id IN ({OWN_STORIES})")
            }
            Self::Notifications => format!(
                "user_id = $1 OR actor_id = $1 OR post_id IN ({OWN_POSTS}) OR comment_id IN ({DOOMED_COMMENTS})"
            ),
            Self::CommentLikes | Self::CommentAuthorInfo => {
                format!("user_id = $1 OR comment_id IN ({DOOMED_COMMENTS})")
            }
            Self::Comments | Self::Likes | Self::SavedPosts => {
                format!("user_id = $1 OR post_id IN ({OWN_POSTS})")
            }
            Self::PostTags => format!("post_id IN ({OWN_POSTS})"),
            Self::Messages => {
                format!("sender_id = $1 OR conversation_id IN ({OWN_CONVERSATIONS})")
            }
            Self::Conversations => "participant_one_id = $1 OR participant_two_id = $1".to_string(),
            Self::FollowRequests => "requester_id = $1 OR target_id = $1".to_string(),
            Self::Follows => "follower_id = $1 OR following_id = $1".to_string(),
            Self::Reports => "reporter_id = $1 OR reported_user_id = $1".to_string(),
            Self::Stories
            | Self::Posts
            | Self::UserSettings
            | Self::UserRoles
            | Self::VerificationTokens
            | Self::Sessions
            | Self::UserMedia
            | Self::UserActivityLogs => "user_id = $1".to_string(),
        }
    }

    /// dependents
    ///
    /// Families holding a foreign key into this one (besides `users`, which
    /// everything references). This is the schema graph the cascade order is
    /// derived from.
    pub fn dependents(self) -> &'static [EntityFamily] {
        match self {
            Self::Stories => &[Self::StoryViews, Self::StoryLikes, Self::StoryHighlights],
            Self::Comments => &[Self::CommentLikes, Self::CommentAuthorInfo, Self::Notifications],
            Self::Posts => &[
                Self::Comments,
                Self::Likes,
                Self::SavedPosts,
                Self::PostTags,
                Self::Notifications,
            ],
            Self::Conversations => &[Self::Messages],
            Self::StoryViews
            | Self::StoryLikes
            | Self::StoryHighlights
            | Self::Notifications
            | Self::CommentLikes
            | Self::CommentAuthorInfo
            | Self::Likes
            | Self::SavedPosts
            | Self::PostTags
            | Self::Messages
            | Self::FollowRequests
            | Self::Follows
            | Self::Reports
            | Self::UserSettings
            | Self::UserRoles
            | Self::VerificationTokens
            | Self::Sessions
            | Self::UserMedia
            | Self::UserActivityLogs => &[],
        }
    }
}

/// PreviewFamily
///
/// The user-facing subset counted by the erasure preview. Deliberately smaller
/// than the cascade: follow edges are split by direction and internal
/// account/session tables are left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewFamily {
    Posts,
    Comments,
    Likes,
    SavedPosts,
    Followers,
    Following,
    FollowRequests,
    Stories,
    Conversations,
    Messages,
    Notifications,
}

pub const PREVIEW_FAMILIES: [PreviewFamily; 11] = [
    PreviewFamily::Posts,
    PreviewFamily::Comments,
    PreviewFamily::Likes,
    PreviewFamily::SavedPosts,
    PreviewFamily::Followers,
    PreviewFamily::Following,
    PreviewFamily::FollowRequests,
    PreviewFamily::Stories,
    PreviewFamily::Conversations,
    PreviewFamily::Messages,
    PreviewFamily::Notifications,
];

impl PreviewFamily {
    pub fn name(self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Comments => "comments",
            Self::Likes => "likes",
            Self::SavedPosts => "saved_posts",
            Self::Followers => "followers",
            Self::Following => "following",
            Self::FollowRequests => "follow_requests",
            Self::Stories => "stories",
            Self::Conversations => "conversations",
            Self::Messages => "messages",
            Self::Notifications => "notifications",
        }
    }
}
