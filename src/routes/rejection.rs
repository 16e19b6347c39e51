use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            context: self.context.clone(),
            message: format!("{}", self.error),
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,
}

/// Identifies the operation a request was performing when it failed.
/// Variants without parameters stay struct-like so the flattened error
/// body always serializes as a map.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Context {
    Authenticate {},
    CatalogAlbums {},
    CatalogAlbum { id: String },
    ReviewedAlbums {},
    CreateReview { album_id: String },
    MyReviews {},
    AlbumReviews { album_id: String },
    LatestReviews {},
    UpdateReview { id: String },
    DeleteReview { id: String },
    VerifySession { subject: String },
    Profile { subject: String },
    UpdateProfile { subject: String },
}

impl Context {
    pub fn authenticate() -> Context {
        Context::Authenticate {}
    }

    pub fn catalog_albums() -> Context {
        Context::CatalogAlbums {}
    }

    pub fn catalog_album(id: String) -> Context {
        Context::CatalogAlbum { id }
    }

    pub fn reviewed_albums() -> Context {
        Context::ReviewedAlbums {}
    }

    pub fn create_review(album_id: String) -> Context {
        Context::CreateReview { album_id }
    }

    pub fn my_reviews() -> Context {
        Context::MyReviews {}
    }

    pub fn album_reviews(album_id: String) -> Context {
        Context::AlbumReviews { album_id }
    }

    pub fn latest_reviews() -> Context {
        Context::LatestReviews {}
    }

    pub fn update_review(id: String) -> Context {
        Context::UpdateReview { id }
    }

    pub fn delete_review(id: String) -> Context {
        Context::DeleteReview { id }
    }

    pub fn verify_session(subject: String) -> Context {
        Context::VerifySession { subject }
    }

    pub fn profile(subject: String) -> Context {
        Context::Profile { subject }
    }

    pub fn update_profile(subject: String) -> Context {
        Context::UpdateProfile { subject }
    }
}
