//! Data models
//!
//! Database entities (`sqlx::FromRow`), their enum columns, and the input
//! types accepted by services. Enum columns are stored as lowercase strings.

/// Declare an enum stored as a lowercase string column.
///
/// Generates `as_str`, `Display`, case-insensitive `FromStr` and the
/// `TryFrom<String>` impl used by `#[sqlx(try_from = "String")]`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $( $text => Ok($name::$variant), )+
                    _ => Err($crate::models::ParseEnumError {
                        kind: stringify!($name),
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::models::ParseEnumError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

mod activity;
mod attachment;
mod chat;
mod comment;
mod event;
mod feature_flag;
mod friendship;
mod group;
mod housing;
mod like;
mod notification;
mod pagination;
mod post;
mod report;
mod session;
mod subscription;
mod user;

pub use activity::{Activity, ActivityNode, CreateActivityInput};
pub use attachment::{Attachment, AttachmentTarget, ChunkStatus, CreateAttachmentInput};
pub use chat::{ChatMessage, ChatMessageView, ChatRoom, ChatRoomMember, ChatRoomSummary, CreateRoomInput};
pub use comment::{Comment, CommentNode, CreateCommentInput};
pub use event::{
    CreateEventInput, Event, EventFilter, EventParticipant, EventRsvp, EventType, RsvpStatus,
    UpdateEventInput,
};
pub use feature_flag::{FeatureFlag, UpsertFeatureFlagInput};
pub use friendship::{FriendshipStatus, Friendship};
pub use group::{CreateGroupInput, Group, GroupMember, GroupMemberRole, GroupType, UpdateGroupInput};
pub use housing::{
    CreateHousingInput, HousingFilter, HousingListing, HousingRequest, HousingRequestInput,
    HousingRequestStatus, ListingStatus, UpdateHousingInput,
};
pub use like::{Like, LikeTarget, LikeToggle};
pub use notification::{NewNotification, Notification, NotificationKind};
pub use pagination::{ListParams, PagedResult};
pub use post::{CreatePostInput, Post, UpdatePostInput, Visibility};
pub use report::{
    CreateReportInput, CreateReportTypeInput, Report, ReportStatus, ReportTargetType, ReportType,
    ReportTypeNode,
};
pub use session::Session;
pub use subscription::{Plan, PlanInfo, Subscription, SubscriptionStatus};
pub use user::{
    PublicProfile, RegisterInput, TangoRole, UpdateProfileInput, User, UserRole, UserStatus,
};

/// Error returned when a stored or submitted enum value is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}
