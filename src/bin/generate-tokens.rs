//! A helper program to mint HS256 development tokens for exercising
//! protected routes by hand. Only meaningful when the server runs with
//! `BACKEND_AUTH_SHARED_SECRET` set.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;
use structopt::StructOpt;

use backend::config::get_variable;

#[derive(StructOpt)]
#[structopt(name = "generate-tokens", about = "Mints HS256 development tokens.")]
struct Options {
    /// The subject to embed in the token.
    #[structopt(long)]
    subject: String,

    /// The email claim, namespaced under the configured audience.
    #[structopt(long)]
    email: Option<String>,

    /// The name claim, namespaced under the configured audience.
    #[structopt(long)]
    name: Option<String>,

    /// Token lifetime in seconds.
    #[structopt(long, default_value = "3600")]
    expires_in: i64,
}

fn main() {
    dotenv::dotenv().ok();

    let options = Options::from_args();

    let audience = get_variable("BACKEND_AUTH_AUDIENCE");
    let issuer = get_variable("BACKEND_AUTH_ISSUER");
    let secret = get_variable("BACKEND_AUTH_SHARED_SECRET");

    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let mut claims = json!({
        "sub": options.subject,
        "aud": audience,
        "iss": issuer,
        "iat": now,
        "exp": now + options.expires_in,
    });

    if let Some(email) = options.email {
        claims[format!("{}/email", audience)] = json!(email);
    }
    if let Some(name) = options.name {
        claims[format!("{}/name", audience)] = json!(name);
    }

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("encode token");

    println!("{}", token);
}
