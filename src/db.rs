use futures::future::BoxFuture;
use uuid::Uuid;

use crate::album::{Album, NewAlbum};
use crate::errors::BackendError;
use crate::review::{NewReview, Review, ReviewUpdate};
use crate::user::{NewUser, ProfileUpdate, User, UserProfile};

#[cfg(test)]
pub(crate) mod mock;

pub trait Db {
    /// Inserts an imported album unless its ID or title is already
    /// present. Returns whether a row was inserted.
    fn insert_album(&self, album: &NewAlbum) -> BoxFuture<Result<bool, BackendError>>;

    /// Returns the albums a user has reviewed.
    fn reviewed_albums(&self, subject: &str) -> BoxFuture<Result<Vec<Album>, BackendError>>;

    fn lookup_user(&self, subject: &str) -> BoxFuture<Result<Option<User>, BackendError>>;

    /// Creates a user for a subject seen for the first time. Safe to
    /// call concurrently for one subject: the existing row wins.
    fn create_user(&self, user: &NewUser) -> BoxFuture<Result<User, BackendError>>;

    fn retrieve_profile(
        &self,
        subject: &str,
    ) -> BoxFuture<Result<Option<UserProfile>, BackendError>>;

    /// Applies the supplied profile fields and returns the refreshed
    /// record, or `None` when no such user exists.
    fn update_profile(
        &self,
        subject: &str,
        update: &ProfileUpdate,
    ) -> BoxFuture<Result<Option<User>, BackendError>>;

    /// Inserts a review owned by the user behind `subject`.
    fn insert_review(
        &self,
        subject: &str,
        review: &NewReview,
    ) -> BoxFuture<Result<Review, BackendError>>;

    fn retrieve_review(&self, id: &Uuid) -> BoxFuture<Result<Option<Review>, BackendError>>;

    fn reviews_by_user(&self, subject: &str) -> BoxFuture<Result<Vec<Review>, BackendError>>;

    fn reviews_by_album(&self, album_id: &str) -> BoxFuture<Result<Vec<Review>, BackendError>>;

    /// Returns the most recent reviews, newest first.
    fn latest_reviews(&self, count: i16) -> BoxFuture<Result<Vec<Review>, BackendError>>;

    /// Replaces the supplied fields of a review.
    fn update_review(
        &self,
        id: &Uuid,
        update: &ReviewUpdate,
    ) -> BoxFuture<Result<Review, BackendError>>;

    fn delete_review(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>>;
}

pub use self::postgres::*;

mod postgres {
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::postgres::{PgPool, PgRow};
    use time::OffsetDateTime;
    use uuid::Uuid;

    use crate::album::{Album, NewAlbum};
    use crate::errors::BackendError;
    use crate::review::{NewReview, Review, ReviewUpdate};
    use crate::user::{NewUser, ProfileUpdate, User, UserProfile};

    const USERS_AGE_CONSTRAINT: &str = "users_age_positive";
    const REVIEWS_ALBUM_CONSTRAINT: &str = "reviews_album_fk";

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn insert_album(&self, album: &NewAlbum) -> BoxFuture<Result<bool, BackendError>> {
            let album = album.clone();

            async move {
                let query = sqlx::query(include_str!("queries/insert_album.sql"));

                let count = query
                    .bind(&album.id)
                    .bind(&album.title)
                    .bind(&album.artist)
                    .bind(&album.released_on)
                    .bind(album.total_tracks)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                Ok(count > 0)
            }
            .boxed()
        }

        fn reviewed_albums(&self, subject: &str) -> BoxFuture<Result<Vec<Album>, BackendError>> {
            let subject = subject.to_owned();

            async move {
                let query =
                    sqlx::query_as::<_, Album>(include_str!("queries/reviewed_albums.sql"));

                let albums = query
                    .bind(subject)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(albums)
            }
            .boxed()
        }

        fn lookup_user(&self, subject: &str) -> BoxFuture<Result<Option<User>, BackendError>> {
            let subject = subject.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/lookup_user.sql"));

                let user = query
                    .bind(subject)
                    .try_map(|row: PgRow| user_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(user)
            }
            .boxed()
        }

        fn create_user(&self, user: &NewUser) -> BoxFuture<Result<User, BackendError>> {
            let user = user.clone();

            async move {
                let query = sqlx::query(include_str!("queries/create_user.sql"));

                let inserted = query
                    .bind(&user.subject)
                    .bind(&user.email)
                    .bind(&user.name)
                    .try_map(|row: PgRow| user_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                match inserted {
                    Some(created) => Ok(created),
                    // another request created the row first; return it
                    None => {
                        let query = sqlx::query(include_str!("queries/lookup_user.sql"));

                        query
                            .bind(&user.subject)
                            .try_map(|row: PgRow| user_from_row(&row))
                            .fetch_optional(&self.pool)
                            .await
                            .map_err(map_sqlx_error)?
                            .ok_or(BackendError::Sqlx {
                                source: sqlx::Error::RowNotFound,
                            })
                    }
                }
            }
            .boxed()
        }

        fn retrieve_profile(
            &self,
            subject: &str,
        ) -> BoxFuture<Result<Option<UserProfile>, BackendError>> {
            let subject = subject.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/retrieve_profile.sql"));

                let profile = query
                    .bind(subject)
                    .try_map(|row: PgRow| {
                        Ok(UserProfile {
                            email: try_get(&row, "email")?,
                            name: try_get(&row, "display_name")?,
                            age: try_get(&row, "age")?,
                            created_at: try_get(&row, "created_at")?,
                        })
                    })
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(profile)
            }
            .boxed()
        }

        fn update_profile(
            &self,
            subject: &str,
            update: &ProfileUpdate,
        ) -> BoxFuture<Result<Option<User>, BackendError>> {
            let subject = subject.to_owned();
            let update = update.clone();

            async move {
                let query = sqlx::query(include_str!("queries/update_profile.sql"));

                let user = query
                    .bind(subject)
                    .bind(&update.name)
                    .bind(update.age)
                    .try_map(|row: PgRow| user_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| map_profile_update_error(e, update.age))?;

                Ok(user)
            }
            .boxed()
        }

        fn insert_review(
            &self,
            subject: &str,
            review: &NewReview,
        ) -> BoxFuture<Result<Review, BackendError>> {
            let subject = subject.to_owned();
            let review = review.clone();

            async move {
                let query = sqlx::query(include_str!("queries/insert_review.sql"));

                let created = query
                    .bind(&subject)
                    .bind(&review.album_id)
                    .bind(&review.title)
                    .bind(&review.content)
                    .try_map(|row: PgRow| review_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| map_insert_review_error(e, &review.album_id))?;

                // the insert selects from users, so no row means the
                // subject has never been reconciled
                created.ok_or(BackendError::UserNotFound { subject })
            }
            .boxed()
        }

        fn retrieve_review(&self, id: &Uuid) -> BoxFuture<Result<Option<Review>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/retrieve_review.sql"));

                let review = query
                    .bind(id)
                    .try_map(|row: PgRow| review_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(review)
            }
            .boxed()
        }

        fn reviews_by_user(&self, subject: &str) -> BoxFuture<Result<Vec<Review>, BackendError>> {
            let subject = subject.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/reviews_by_user.sql"));

                let reviews = query
                    .bind(subject)
                    .try_map(|row: PgRow| review_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(reviews)
            }
            .boxed()
        }

        fn reviews_by_album(&self, album_id: &str) -> BoxFuture<Result<Vec<Review>, BackendError>> {
            let album_id = album_id.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/reviews_by_album.sql"));

                let reviews = query
                    .bind(album_id)
                    .try_map(|row: PgRow| review_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(reviews)
            }
            .boxed()
        }

        fn latest_reviews(&self, count: i16) -> BoxFuture<Result<Vec<Review>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/latest_reviews.sql"));

                let reviews = query
                    .bind(i64::from(count))
                    .try_map(|row: PgRow| review_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(reviews)
            }
            .boxed()
        }

        fn update_review(
            &self,
            id: &Uuid,
            update: &ReviewUpdate,
        ) -> BoxFuture<Result<Review, BackendError>> {
            let id = *id;
            let update = update.clone();

            async move {
                let query = sqlx::query(include_str!("queries/update_review.sql"));

                let review = query
                    .bind(id)
                    .bind(&update.title)
                    .bind(&update.content)
                    .try_map(|row: PgRow| review_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                review.ok_or(BackendError::ReviewNotFound { id })
            }
            .boxed()
        }

        fn delete_review(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/delete_review.sql"));

                let count = query
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count == 0 {
                    Err(BackendError::ReviewNotFound { id })
                } else {
                    Ok(())
                }
            }
            .boxed()
        }
    }

    fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
        let id: Uuid = try_get(row, "id")?;
        let subject: String = try_get(row, "auth0_subject")?;
        let email: Option<String> = try_get(row, "email")?;
        let name: Option<String> = try_get(row, "display_name")?;
        let age: Option<i32> = try_get(row, "age")?;
        let created_at: OffsetDateTime = try_get(row, "created_at")?;

        Ok(User {
            id,
            subject,
            email,
            name,
            age,
            created_at,
        })
    }

    fn review_from_row(row: &PgRow) -> Result<Review, sqlx::Error> {
        let id: Uuid = try_get(row, "id")?;
        let title: String = try_get(row, "title")?;
        let content: String = try_get(row, "content")?;
        let user_id: Uuid = try_get(row, "user_id")?;
        let album_id: String = try_get(row, "album_id")?;
        let created_at: OffsetDateTime = try_get(row, "created_at")?;

        Ok(Review {
            id,
            title,
            content,
            user_id,
            album_id,
            created_at,
        })
    }

    fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
        row: &'a PgRow,
        column: &str,
    ) -> Result<T, sqlx::Error> {
        use sqlx::prelude::*;

        row.try_get(column)
    }

    fn map_profile_update_error(error: sqlx::Error, age: Option<i32>) -> BackendError {
        match error {
            sqlx::Error::Database(ref e) if e.constraint() == Some(USERS_AGE_CONSTRAINT) => {
                BackendError::InvalidAge(age.unwrap_or_default())
            }
            _ => map_sqlx_error(error),
        }
    }

    fn map_insert_review_error(error: sqlx::Error, album_id: &str) -> BackendError {
        match error {
            sqlx::Error::Database(ref e) if e.constraint() == Some(REVIEWS_ALBUM_CONSTRAINT) => {
                BackendError::AlbumNotFound {
                    id: album_id.to_owned(),
                }
            }
            _ => map_sqlx_error(error),
        }
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        BackendError::Sqlx { source: error }
    }
}
