use std::sync::Arc;

use log::{error, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, WithStatus};

use crate::errors::BackendError;

pub mod admin;
mod handlers;
mod rejection;
mod response;

pub use internal::*;

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status_code_for(e), "message" => %r.error);
        let flattened = r.flatten();

        return Ok(with_status(json(&flattened), status_code_for(e)));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        InvalidAge(..) => StatusCode::BAD_REQUEST,
        MissingAuthorization
        | MalformedAuthorization
        | InvalidToken { .. }
        | MissingSubjectClaim
        | UnknownSigningKey { .. } => StatusCode::UNAUTHORIZED,
        PermissionDenied { .. } => StatusCode::FORBIDDEN,
        AlbumNotFound { .. } | ReviewNotFound { .. } | UserNotFound { .. } | NoReviews => {
            StatusCode::NOT_FOUND
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use uuid::Uuid;
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{delete, get as g, path as p, path::param as par, post, put};

    use super::handlers;
    use super::rejection::{Context, Rejection};
    use crate::auth::{self, Claims};
    use crate::environment::Environment;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    /// Extracts verified bearer-token claims, rejecting the request
    /// before the handler runs when there are none.
    fn authenticated(
        environment: Environment,
    ) -> impl Filter<Extract = (Claims,), Error = warp::reject::Rejection> + Clone {
        warp::header::optional::<String>("authorization").and_then(
            move |header: Option<String>| {
                let verifier = environment.verifier.clone();

                async move {
                    auth::bearer_claims(verifier.as_ref(), header.as_deref()).map_err(|e| {
                        warp::reject::Rejection::from(Rejection::new(Context::authenticate(), e))
                    })
                }
            },
        )
    }

    macro_rules! route_filter {
    ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
    ($route_variable:ident; $first:expr, $($rest:expr),+) => (
        let $route_variable = $route_variable.and($first);
        route_filter!($route_variable; $($rest),+);
    )
}

    macro_rules! route {
    ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
        pub fn $name(environment: Environment) -> Route {
            let prefix = environment.urls.api_path.clone();

            let $route_variable = warp::any()
                .map(move || environment.clone())
                .and(p(prefix));

            route_filter!($route_variable; $($filters),+);

            $route_variable.and_then(handlers::$handler)
                .boxed()
        }
    );
}

    macro_rules! protected_route {
    ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
        pub fn $name(environment: Environment) -> Route {
            let prefix = environment.urls.api_path.clone();
            let claims = authenticated(environment.clone());

            let $route_variable = warp::any()
                .map(move || environment.clone())
                .and(p(prefix));

            route_filter!($route_variable; $($filters),+);

            $route_variable.and(claims)
                .and_then(handlers::$handler)
                .boxed()
        }
    );
}

    pub fn make_ping_route(environment: Environment) -> Route {
        warp::any()
            .map(move || environment.clone())
            .and(p("ping"))
            .and(end())
            .and(g())
            .and_then(handlers::ping)
            .boxed()
    }

    route!(make_catalog_albums_route => catalog_albums, rt; p("albums"), end(), g());
    route!(make_catalog_album_route => catalog_album, rt; p("details"), par::<String>(), end(), g());
    protected_route!(make_reviewed_albums_route => reviewed_albums, rt; p!("albums" / "reviewed"), g());
    protected_route!(make_create_review_route => create_review, rt; p("reviews"), end(), post(), warp::body::json());
    protected_route!(make_my_reviews_route => my_reviews, rt; p!("reviews" / "mine"), g());
    route!(make_album_reviews_route => album_reviews, rt; p!("reviews" / "album" / String), g());
    route!(make_latest_reviews_route => latest_reviews, rt; p!("reviews" / "latest"), g());
    protected_route!(make_update_review_route => update_review, rt; p("reviews"), par::<Uuid>(), end(), put(), warp::body::json());
    protected_route!(make_delete_review_route => delete_review, rt; p("reviews"), par::<Uuid>(), end(), delete());
    protected_route!(make_verify_session_route => verify_session, rt; p!("session" / "verify"), post());
    protected_route!(make_profile_route => profile, rt; p!("users" / "me"), g());
    protected_route!(make_update_profile_route => update_profile, rt; p!("users" / "me"), put(), warp::body::json());

    #[cfg(test)]
    mod test {
        use std::sync::Arc;

        use log::{o, Discard, Logger};
        use serde_json::json;
        use uuid::Uuid;
        use warp::http::StatusCode;
        use warp::Filter;

        use crate::auth::tests::{make_token, make_verifier};
        use crate::catalog::mock::MockCatalog;
        use crate::catalog::CatalogAlbum;
        use crate::db::mock::MockDb;
        use crate::db::Db;
        use crate::environment::{Config, Environment};
        use crate::review::Review;
        use crate::routes::format_rejection;
        use crate::urls::Urls;
        use crate::user::User;

        fn make_environment(db: Arc<MockDb>) -> Environment {
            make_environment_with_catalog(db, vec![])
        }

        fn make_environment_with_catalog(
            db: Arc<MockDb>,
            albums: Vec<CatalogAlbum>,
        ) -> Environment {
            let logger = Arc::new(Logger::root(Discard, o!()));

            Environment::new(
                logger,
                db,
                Arc::new(MockCatalog {
                    artist: "Example Artist".to_owned(),
                    albums,
                }),
                Arc::new(make_verifier()),
                Arc::new(Urls::new("http://localhost:8080/", "api")),
                Config::new(5),
            )
        }

        fn recovered(
            route: super::Route,
            environment: &Environment,
        ) -> impl Filter<Extract = impl warp::Reply + Send, Error = warp::Rejection> + Clone + 'static
        {
            let logger = environment.logger.clone();

            route.recover(move |r| format_rejection(logger.clone(), r))
        }

        fn bearer(subject: &str) -> String {
            format!("Bearer {}", make_token(subject))
        }

        async fn seed_album(db: &Arc<MockDb>) {
            let db: Arc<dyn Db + Send + Sync> = db.clone();

            db.insert_album(&crate::album::NewAlbum {
                id: "A1".to_owned(),
                title: "First Light".to_owned(),
                artist: "Example Artist".to_owned(),
                released_on: "2006-10-24".to_owned(),
                total_tracks: 11,
            })
            .await
            .expect("seed album");
        }

        async fn verify_session_as(environment: &Environment, subject: &str) -> User {
            let filter = recovered(
                super::make_verify_session_route(environment.clone()),
                environment,
            );

            let response = warp::test::request()
                .method("POST")
                .path("/api/session/verify")
                .header("authorization", bearer(subject))
                .reply(&filter)
                .await;

            assert_eq!(response.status(), StatusCode::OK);

            serde_json::from_slice(response.body()).expect("parse user")
        }

        async fn create_review_as(
            environment: &Environment,
            subject: &str,
            album_id: &str,
        ) -> Review {
            let filter = recovered(
                super::make_create_review_route(environment.clone()),
                environment,
            );

            let response = warp::test::request()
                .method("POST")
                .path("/api/reviews")
                .header("authorization", bearer(subject))
                .json(&json!({
                    "albumId": album_id,
                    "title": "A classic",
                    "content": "Still holds up.",
                }))
                .reply(&filter)
                .await;

            assert_eq!(response.status(), StatusCode::CREATED);

            serde_json::from_slice(response.body()).expect("parse review")
        }

        #[tokio::test]
        async fn pinging_works() {
            let environment = make_environment(Arc::new(MockDb::new()));
            let filter = super::make_ping_route(environment);

            let response = warp::test::request().path("/ping").reply(&filter).await;

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(String::from_utf8_lossy(response.body()), "pong");
        }

        #[tokio::test]
        async fn protected_routes_require_a_token() {
            let environment = make_environment(Arc::new(MockDb::new()));
            let filter = recovered(
                super::make_create_review_route(environment.clone()),
                &environment,
            );

            let response = warp::test::request()
                .method("POST")
                .path("/api/reviews")
                .json(&json!({ "albumId": "A1", "title": "T", "content": "C" }))
                .reply(&filter)
                .await;

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        #[tokio::test]
        async fn garbage_tokens_are_rejected() {
            let environment = make_environment(Arc::new(MockDb::new()));
            let filter = recovered(
                super::make_my_reviews_route(environment.clone()),
                &environment,
            );

            let response = warp::test::request()
                .path("/api/reviews/mine")
                .header("authorization", "Bearer not.a.token")
                .reply(&filter)
                .await;

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        #[tokio::test]
        async fn creating_a_review_references_its_owner_and_album() {
            let db = Arc::new(MockDb::new());
            let environment = make_environment(db.clone());
            seed_album(&db).await;

            let user = verify_session_as(&environment, "auth0|abc").await;
            let review = create_review_as(&environment, "auth0|abc", "A1").await;

            assert_eq!(review.user_id, user.id);
            assert_eq!(review.album_id, "A1");
            assert_eq!(review.title, "A classic");
        }

        #[tokio::test]
        async fn creating_a_review_for_a_missing_album_is_not_found() {
            let db = Arc::new(MockDb::new());
            let environment = make_environment(db.clone());

            verify_session_as(&environment, "auth0|abc").await;

            let filter = recovered(
                super::make_create_review_route(environment.clone()),
                &environment,
            );

            let response = warp::test::request()
                .method("POST")
                .path("/api/reviews")
                .header("authorization", bearer("auth0|abc"))
                .json(&json!({ "albumId": "missing", "title": "T", "content": "C" }))
                .reply(&filter)
                .await;

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn only_the_owner_may_update_a_review() {
            let db = Arc::new(MockDb::new());
            let environment = make_environment(db.clone());
            seed_album(&db).await;

            verify_session_as(&environment, "auth0|alice").await;
            verify_session_as(&environment, "auth0|bob").await;
            let review = create_review_as(&environment, "auth0|alice", "A1").await;

            let filter = recovered(
                super::make_update_review_route(environment.clone()),
                &environment,
            );

            let response = warp::test::request()
                .method("PUT")
                .path(&format!("/api/reviews/{}", review.id))
                .header("authorization", bearer("auth0|bob"))
                .json(&json!({ "title": "Hijacked" }))
                .reply(&filter)
                .await;

            assert_eq!(response.status(), StatusCode::FORBIDDEN);

            let response = warp::test::request()
                .method("PUT")
                .path(&format!("/api/reviews/{}", review.id))
                .header("authorization", bearer("auth0|alice"))
                .json(&json!({ "title": "Revised", "content": "Even better." }))
                .reply(&filter)
                .await;

            assert_eq!(response.status(), StatusCode::OK);

            let updated: Review = serde_json::from_slice(response.body()).expect("parse review");
            assert_eq!(updated.title, "Revised");
            assert_eq!(updated.content, "Even better.");
        }

        #[tokio::test]
        async fn updating_a_missing_review_is_not_found() {
            let db = Arc::new(MockDb::new());
            let environment = make_environment(db.clone());

            verify_session_as(&environment, "auth0|alice").await;

            let filter = recovered(
                super::make_update_review_route(environment.clone()),
                &environment,
            );

            let response = warp::test::request()
                .method("PUT")
                .path(&format!("/api/reviews/{}", Uuid::new_v4()))
                .header("authorization", bearer("auth0|alice"))
                .json(&json!({ "title": "T" }))
                .reply(&filter)
                .await;

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn deleting_is_owner_checked_and_not_idempotent() {
            let db = Arc::new(MockDb::new());
            let environment = make_environment(db.clone());
            seed_album(&db).await;

            verify_session_as(&environment, "auth0|alice").await;
            verify_session_as(&environment, "auth0|bob").await;
            let review = create_review_as(&environment, "auth0|alice", "A1").await;

            let filter = recovered(
                super::make_delete_review_route(environment.clone()),
                &environment,
            );

            let response = warp::test::request()
                .method("DELETE")
                .path(&format!("/api/reviews/{}", review.id))
                .header("authorization", bearer("auth0|bob"))
                .reply(&filter)
                .await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);

            let response = warp::test::request()
                .method("DELETE")
                .path(&format!("/api/reviews/{}", review.id))
                .header("authorization", bearer("auth0|alice"))
                .reply(&filter)
                .await;
            assert_eq!(response.status(), StatusCode::NO_CONTENT);

            let response = warp::test::request()
                .method("DELETE")
                .path(&format!("/api/reviews/{}", review.id))
                .header("authorization", bearer("auth0|alice"))
                .reply(&filter)
                .await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn latest_reviews_are_bounded_and_newest_first() {
            let db = Arc::new(MockDb::new());
            let environment = make_environment(db.clone());
            seed_album(&db).await;

            let filter = recovered(
                super::make_latest_reviews_route(environment.clone()),
                &environment,
            );

            // nothing reviewed yet
            let response = warp::test::request()
                .path("/api/reviews/latest")
                .reply(&filter)
                .await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);

            verify_session_as(&environment, "auth0|alice").await;
            for _ in 0..6 {
                create_review_as(&environment, "auth0|alice", "A1").await;
            }

            let response = warp::test::request()
                .path("/api/reviews/latest")
                .reply(&filter)
                .await;
            assert_eq!(response.status(), StatusCode::OK);

            let reviews: Vec<Review> =
                serde_json::from_slice(response.body()).expect("parse reviews");
            assert_eq!(reviews.len(), 5);
            assert!(reviews
                .windows(2)
                .all(|pair| pair[0].created_at >= pair[1].created_at));
        }

        #[tokio::test]
        async fn verifying_a_session_is_idempotent() {
            let environment = make_environment(Arc::new(MockDb::new()));

            let first = verify_session_as(&environment, "auth0|abc").await;
            let second = verify_session_as(&environment, "auth0|abc").await;

            assert_eq!(first.id, second.id);
        }

        #[tokio::test]
        async fn fetching_catalog_albums_imports_them_once() {
            let db = Arc::new(MockDb::new());
            let environment = make_environment_with_catalog(
                db.clone(),
                vec![
                    CatalogAlbum {
                        id: "A1".to_owned(),
                        name: "First Light".to_owned(),
                        release_date: "2006-10-24".to_owned(),
                        total_tracks: 11,
                    },
                    CatalogAlbum {
                        id: "A2".to_owned(),
                        name: "Midnight Parade".to_owned(),
                        release_date: "2022-10-21".to_owned(),
                        total_tracks: 13,
                    },
                ],
            );

            let filter = recovered(
                super::make_catalog_albums_route(environment.clone()),
                &environment,
            );

            for _ in 0..2 {
                let response = warp::test::request().path("/api/albums").reply(&filter).await;
                assert_eq!(response.status(), StatusCode::OK);
            }

            assert_eq!(db.album_count(), 2);
        }

        #[tokio::test]
        async fn profile_updates_validate_age_before_writing() {
            let db = Arc::new(MockDb::new());
            let environment = make_environment(db.clone());

            verify_session_as(&environment, "auth0|abc").await;

            let filter = recovered(
                super::make_update_profile_route(environment.clone()),
                &environment,
            );

            let response = warp::test::request()
                .method("PUT")
                .path("/api/users/me")
                .header("authorization", bearer("auth0|abc"))
                .json(&json!({ "age": 0 }))
                .reply(&filter)
                .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let response = warp::test::request()
                .method("PUT")
                .path("/api/users/me")
                .header("authorization", bearer("auth0|abc"))
                .json(&json!({ "age": 34, "name": "Alex" }))
                .reply(&filter)
                .await;
            assert_eq!(response.status(), StatusCode::OK);

            let user: User = serde_json::from_slice(response.body()).expect("parse user");
            assert_eq!(user.age, Some(34));
            assert_eq!(user.name.as_deref(), Some("Alex"));
        }

        #[tokio::test]
        async fn reading_an_absent_profile_is_not_found() {
            let environment = make_environment(Arc::new(MockDb::new()));

            let filter = recovered(
                super::make_profile_route(environment.clone()),
                &environment,
            );

            let response = warp::test::request()
                .path("/api/users/me")
                .header("authorization", bearer("auth0|ghost"))
                .reply(&filter)
                .await;

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }
}
