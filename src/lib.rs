#[macro_use]
extern crate rocket;
#[macro_use]
extern crate serde;
#[macro_use]
extern crate lazy_static;

use std::process::exit;

use bson::doc;
use mongodb::Client;
use rocket::http::Method;
use rocket::{Build, Request, Rocket};
use rocket_cors::{AllowedHeaders, AllowedOrigins};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod data;
pub mod error;
pub mod middleware;
pub mod resp;
pub mod role;
pub mod route;
pub mod security;
pub mod util;

use crate::config::Config;
use crate::data::store::Store;
use crate::error::{BackendError, ConfigurationError};
use crate::resp::error::ApiError;
use crate::route::mount_api;
use crate::security::Security;

lazy_static! {
    /// Server-wide salt and token signing secrets, loaded once at startup.
    pub static ref SECURITY: Security = Security::load();
}

#[catch(default)]
fn default_catcher(status: rocket::http::Status, _: &Request) -> ApiError {
    ApiError::new(status, status.reason_lossy())
}

pub async fn create(log_level: Option<Level>) -> Result<Rocket<Build>, BackendError> {
    if let Some(level) = log_level {
        let subscriber = FmtSubscriber::builder().with_max_level(level).finish();

        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Unable to set global logger: {}", err);
        };
    }

    tracing::info!("Reading .env file...");
    if dotenv::dotenv().is_err() {
        tracing::warn!("Unable to load .env file.");
    }

    tracing::info!("Loading configuration...");
    let c = match Config::load() {
        Ok(c) => {
            tracing::info!("Configuration loaded.");
            c
        }
        Err(ConfigurationError::NotFound(_)) => {
            let c = Config::default();
            if c.save().is_err() {
                tracing::warn!("Unable to save generated configuration.");
            }
            c
        }
        Err(other) => {
            tracing::error!("Configuration error: {}", other);
            return Err(other.into());
        }
    };

    tracing::info!("Loading security material...");
    lazy_static::initialize(&SECURITY);

    tracing::info!("Connecting to MongoDB: {}", c.mongodb_uri);
    let client = Client::with_uri_str(c.mongodb_uri.as_str())
        .await
        .expect("Unable to init MongoDB client! Is URI valid?");

    tracing::info!("Using MongoDB database: {}", c.mongodb_db);
    let store = Store::new(client, c.mongodb_db.as_str());

    if store
        .database()
        .run_command(doc! { "ping": 1 }, None)
        .await
        .is_err()
    {
        tracing::error!("Unable to connect to MongoDB.");
        exit(1)
    }

    if let Err(e) = store.ensure_indexes().await {
        tracing::error!("Unable to create indexes: {}", e);
        exit(1)
    }

    tracing::info!("Starting HTTP server...");
    let mut r = rocket::build().manage(c).manage(store);

    tracing::info!("Setting up CORS...");
    let allowed_origins = AllowedOrigins::All;

    // You can also deserialize this
    let cors = rocket_cors::CorsOptions {
        allowed_origins,
        allowed_methods: vec![
            Method::Get,
            Method::Put,
            Method::Post,
            Method::Patch,
            Method::Delete,
        ]
        .into_iter()
        .map(From::from)
        .collect(),
        allowed_headers: AllowedHeaders::All,
        allow_credentials: true,
        ..Default::default()
    }
    .to_cors()
    .expect("Unable to configure CORS.");

    r = r.attach(cors);
    r = r.register("/", catchers![default_catcher]);
    r = mount_api(r);

    Ok(r)
}
