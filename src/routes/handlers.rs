use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use uuid::Uuid;
use warp::{
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::auth::Claims;
use crate::catalog::import;
use crate::db::Db;
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::review::{NewReview, Review, ReviewUpdate};
use crate::routes::rejection::{Context, Rejection};
use crate::user::{NewUser, ProfileUpdate, User};

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        // TODO when `try` blocks are stabilized, we can wrap the body
        // and return the headers even on errors
        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn ping(_environment: Environment) -> RouteResult {
    timed! {
        with_status("pong", StatusCode::OK)
    }
}

pub async fn catalog_albums(environment: Environment) -> RouteResult {
    timed! {
        let Environment {
            logger,
            db,
            catalog,
            ..
        } = environment.clone();

        let error_handler = |e: BackendError| Rejection::new(Context::catalog_albums(), e);

        debug!(logger, "Fetching catalog albums..."; "artist" => catalog.artist());
        let albums = catalog.artist_albums().await.map_err(error_handler)?;

        debug!(logger, "Importing fetched albums..."; "fetched" => albums.len());
        let imported = import::import_albums(&logger, &db, catalog.artist(), &albums).await;
        debug!(logger, "Import finished"; "imported" => imported);

        json(&albums)
    }
}

pub async fn catalog_album(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::catalog_album(id.clone()), e);

        debug!(environment.logger, "Fetching catalog album..."; "id" => &id);
        let album = environment.catalog.album(&id).await.map_err(error_handler)?;

        json(&album)
    }
}

pub async fn reviewed_albums(environment: Environment, claims: Claims) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::reviewed_albums(), e);

        debug!(environment.logger, "Listing reviewed albums..."; "subject" => &claims.subject);
        let albums = environment
            .db
            .reviewed_albums(&claims.subject)
            .await
            .map_err(error_handler)?;

        json(&albums)
    }
}

pub async fn create_review(
    environment: Environment,
    review: NewReview,
    claims: Claims,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::create_review(review.album_id.clone()), e);

        debug!(environment.logger, "Creating review..."; "subject" => &claims.subject, "album_id" => &review.album_id);
        let created = environment
            .db
            .insert_review(&claims.subject, &review)
            .await
            .map_err(error_handler)?;

        with_header(
            with_status(json(&created), StatusCode::CREATED),
            "location",
            environment.urls.review(&created.id).as_str(),
        )
    }
}

pub async fn my_reviews(environment: Environment, claims: Claims) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::my_reviews(), e);

        let reviews = environment
            .db
            .reviews_by_user(&claims.subject)
            .await
            .map_err(error_handler)?;

        json(&reviews)
    }
}

pub async fn album_reviews(environment: Environment, album_id: String) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::album_reviews(album_id.clone()), e);

        let reviews = environment
            .db
            .reviews_by_album(&album_id)
            .await
            .map_err(error_handler)?;

        json(&reviews)
    }
}

pub async fn latest_reviews(environment: Environment) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::latest_reviews(), e);

        let count = environment.config.latest_reviews as i16;
        let reviews = environment
            .db
            .latest_reviews(count)
            .await
            .map_err(&error_handler)?;

        if reviews.is_empty() {
            return Err(error_handler(BackendError::NoReviews).into());
        };

        json(&reviews)
    }
}

pub async fn update_review(
    environment: Environment,
    id: Uuid,
    update: ReviewUpdate,
    claims: Claims,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::update_review(id.to_string()), e);

        debug!(environment.logger, "Updating review..."; "subject" => &claims.subject, "id" => format!("{}", id));
        let _ = ensure_owner(environment.db.clone(), &claims, &id)
            .await
            .map_err(&error_handler)?;

        let review = environment
            .db
            .update_review(&id, &update)
            .await
            .map_err(&error_handler)?;

        json(&review)
    }
}

pub async fn delete_review(environment: Environment, id: Uuid, claims: Claims) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::delete_review(id.to_string()), e);

        debug!(environment.logger, "Deleting review..."; "subject" => &claims.subject, "id" => format!("{}", id));
        let _ = ensure_owner(environment.db.clone(), &claims, &id)
            .await
            .map_err(&error_handler)?;

        environment
            .db
            .delete_review(&id)
            .await
            .map_err(&error_handler)?;

        StatusCode::NO_CONTENT
    }
}

pub async fn verify_session(environment: Environment, claims: Claims) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::verify_session(claims.subject.clone()), e);

        debug!(environment.logger, "Reconciling user..."; "subject" => &claims.subject);
        let user = reconcile_user(environment.db.clone(), &claims)
            .await
            .map_err(error_handler)?;

        json(&user)
    }
}

pub async fn profile(environment: Environment, claims: Claims) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::profile(claims.subject.clone()), e);

        let profile = environment
            .db
            .retrieve_profile(&claims.subject)
            .await
            .map_err(&error_handler)?
            .ok_or_else(|| {
                error_handler(BackendError::UserNotFound {
                    subject: claims.subject.clone(),
                })
            })?;

        json(&profile)
    }
}

pub async fn update_profile(
    environment: Environment,
    update: ProfileUpdate,
    claims: Claims,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::update_profile(claims.subject.clone()), e);

        update.validate().map_err(&error_handler)?;

        debug!(environment.logger, "Updating profile..."; "subject" => &claims.subject);
        let user = environment
            .db
            .update_profile(&claims.subject, &update)
            .await
            .map_err(&error_handler)?
            .ok_or_else(|| {
                error_handler(BackendError::UserNotFound {
                    subject: claims.subject.clone(),
                })
            })?;

        json(&user)
    }
}

/// Returns the user for a verified subject, creating one on first
/// sight. Safe to repeat for the same subject.
async fn reconcile_user(
    db: Arc<dyn Db + Send + Sync>,
    claims: &Claims,
) -> Result<User, BackendError> {
    if let Some(user) = db.lookup_user(&claims.subject).await? {
        return Ok(user);
    }

    db.create_user(&NewUser::from_claims(claims)).await
}

/// Verifies that the actor behind `claims` owns the review before any
/// mutation is allowed to touch it.
async fn ensure_owner(
    db: Arc<dyn Db + Send + Sync>,
    claims: &Claims,
    id: &Uuid,
) -> Result<Review, BackendError> {
    let review = db
        .retrieve_review(id)
        .await?
        .ok_or(BackendError::ReviewNotFound { id: *id })?;

    let user = db
        .lookup_user(&claims.subject)
        .await?
        .ok_or_else(|| BackendError::UserNotFound {
            subject: claims.subject.clone(),
        })?;

    if review.user_id != user.id {
        return Err(BackendError::PermissionDenied { id: *id });
    }

    Ok(review)
}

fn format_server_timing(duration: Duration) -> String {
    format!("handler;dur={}", duration.as_secs_f64() * 1000.0)
}
