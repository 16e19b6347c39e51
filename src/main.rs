use std::error::Error;
use std::sync::Arc;

use warp::Filter;

use backend::auth::JwtVerifier;
use backend::catalog::SpotifyCatalog;
use backend::config::get_variable;
use backend::db::PgDb;
use backend::environment::{Config, Environment};
use backend::routes;
use backend::urls::Urls;
use futures::future::FutureExt;
use log::{info, initialize_logger};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = initialize_logger();

    let main_port: u16 = get_variable("BACKEND_PORT")
        .parse()
        .expect("parse BACKEND_PORT as u16");
    let admin_port: u16 = get_variable("BACKEND_ADMIN_PORT")
        .parse()
        .expect("parse BACKEND_ADMIN_PORT as u16");

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    info!(logger, "Creating database pool...");
    let connection_string = get_variable("BACKEND_DB_CONNECTION_STRING");
    let pool = sqlx::Pool::connect(&connection_string)
        .await
        .expect("create database pool from BACKEND_DB_CONNECTION_STRING");
    let db = Arc::new(PgDb::new(pool));

    info!(logger, "Initializing token verifier...");
    let verifier = Arc::new(
        JwtVerifier::from_env()
            .await
            .expect("initialize token verifier from environment"),
    );

    let catalog =
        Arc::new(SpotifyCatalog::from_env().expect("initialize catalog client from environment"));

    let urls = Arc::new(Urls::new(
        get_variable("BACKEND_BASE_URL"),
        get_variable("BACKEND_API_PATH"),
    ));

    let config = Config::new(
        get_variable("BACKEND_LATEST_REVIEWS")
            .parse()
            .expect("parse BACKEND_LATEST_REVIEWS as u8"),
    );
    let environment = Environment::new(logger.clone(), db, catalog, verifier, urls, config);

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate = Arc::new(move || {
        let termination_sender = termination_sender.clone();

        async move {
            let termination_sender = termination_sender.clone();
            termination_sender.send(()).await.unwrap();
        }
        .boxed()
    });

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            let terminate = terminate.clone();

            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate().await;
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let logger2 = logger.clone();

        let ping_route = routes::make_ping_route(environment.clone());
        let catalog_albums_route = routes::make_catalog_albums_route(environment.clone());
        let catalog_album_route = routes::make_catalog_album_route(environment.clone());
        let reviewed_albums_route = routes::make_reviewed_albums_route(environment.clone());
        let create_review_route = routes::make_create_review_route(environment.clone());
        let my_reviews_route = routes::make_my_reviews_route(environment.clone());
        let album_reviews_route = routes::make_album_reviews_route(environment.clone());
        let latest_reviews_route = routes::make_latest_reviews_route(environment.clone());
        let update_review_route = routes::make_update_review_route(environment.clone());
        let delete_review_route = routes::make_delete_review_route(environment.clone());
        let verify_session_route = routes::make_verify_session_route(environment.clone());
        let profile_route = routes::make_profile_route(environment.clone());
        let update_profile_route = routes::make_update_profile_route(environment.clone());

        let routes = ping_route
            .or(catalog_albums_route)
            .or(reviewed_albums_route)
            .or(catalog_album_route)
            .or(my_reviews_route)
            .or(album_reviews_route)
            .or(latest_reviews_route)
            .or(create_review_route)
            .or(update_review_route)
            .or(delete_review_route)
            .or(verify_session_route)
            .or(profile_route)
            .or(update_profile_route)
            .recover(move |r| routes::format_rejection(logger2.clone(), r));

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), async {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let routes = routes::admin::make_healthz_route(environment.clone()).or(
            routes::admin::make_termination_route(environment.clone(), terminate),
        );

        let (_, admin_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], admin_port), async {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}
