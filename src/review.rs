use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::normalization;
use crate::timestamps;

/// A single review in the database.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// The ID of the review.
    pub id: Uuid,

    /// The title provided.
    pub title: String,

    /// The free-text body of the review.
    pub content: String,

    /// The ID of the owning user.
    pub user_id: Uuid,

    /// The catalog ID of the reviewed album.
    pub album_id: String,

    /// The date and time it was created.
    #[serde(with = "timestamps")]
    pub created_at: OffsetDateTime,
}

/// The fields accepted when creating a review.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    /// The catalog ID of the album under review.
    pub album_id: String,

    /// The title provided.
    #[serde(deserialize_with = "normalization::deserialize")]
    pub title: String,

    /// The free-text body of the review.
    pub content: String,
}

/// The fields accepted when updating a review. Omitted fields are left
/// unchanged.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewUpdate {
    #[serde(default)]
    #[serde(deserialize_with = "normalization::deserialize_option")]
    pub title: Option<String>,

    #[serde(default)]
    pub content: Option<String>,
}
