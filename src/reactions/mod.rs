use serde::{Deserialize, Serialize};
use sqlx::prelude::Type;
use uuid::Uuid;

pub mod handler;

/// Stored reaction kind. Neutral has no row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "reaction_kind", rename_all = "lowercase")]
pub enum ReactionKind {
    Liked,
    Unliked,
}

/// A profile's reaction to a post.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Liked,
    Unliked,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionAction {
    Like,
    Unlike,
}

impl Reaction {
    pub fn from_stored(kind: Option<ReactionKind>) -> Self {
        match kind {
            Some(ReactionKind::Liked) => Reaction::Liked,
            Some(ReactionKind::Unliked) => Reaction::Unliked,
            None => Reaction::Neutral,
        }
    }

    pub fn stored(self) -> Option<ReactionKind> {
        match self {
            Reaction::Liked => Some(ReactionKind::Liked),
            Reaction::Unliked => Some(ReactionKind::Unliked),
            Reaction::Neutral => None,
        }
    }

    /// Repeating an action clears it; the opposite action switches sides.
    pub fn apply(self, action: ReactionAction) -> Self {
        match (self, action) {
            (Reaction::Liked, ReactionAction::Like) => Reaction::Neutral,
            (_, ReactionAction::Like) => Reaction::Liked,
            (Reaction::Unliked, ReactionAction::Unlike) => Reaction::Neutral,
            (_, ReactionAction::Unlike) => Reaction::Unliked,
        }
    }
}

/// Response for a like/unlike that left a reaction in place
#[derive(Debug, Serialize)]
pub struct ReactionResponse {
    pub post_id: Uuid,
    pub reaction: Reaction,
    pub likes: i64,
    pub unlikes: i64,
}
