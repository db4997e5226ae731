use actix_web::middleware::{Logger, NormalizePath};
use actix_web::{web, App, HttpServer};
use diesel::r2d2::ConnectionManager;
use diesel::PgConnection;
use dotenvy::dotenv;
use env_logger::Env;
use r2d2::Pool;

use crate::errors::ApiError;
use crate::mail::Mailer;
use crate::settings::Settings;

mod auth;
mod catalog;
mod db;
mod errors;
mod mail;
mod model;
mod permissions;
mod reviews;
mod schema;
mod settings;
mod titles;
mod users;
mod validators;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let settings = Settings::load().expect("Failed to load settings.");
    let manager = ConnectionManager::<PgConnection>::new(settings.database.url.clone());
    let pool = Pool::builder()
        .max_size(settings.database.pool_size)
        .build(manager)
        .expect("Failed to create pool.");

    {
        let mut conn = pool.get().expect("Couldn't get db connection from pool.");
        db::run_migrations(&mut conn).expect("Failed to run database migrations.");
        if let Some(superuser) = &settings.superuser {
            let user = db::users::ensure_superuser(&mut conn, &superuser.username, &superuser.email)
                .expect("Failed to bootstrap superuser.");
            log::info!("Superuser {} is ready", user.username);
        }
    }

    let mailer = web::Data::new(Mailer::from_settings(&settings.mail).expect("Invalid mail settings."));
    let bind = (settings.server.host.clone(), settings.server.port);
    let settings = web::Data::new(settings);
    let pool = web::Data::new(pool);

    log::info!("Starting server on {}:{}", bind.0, bind.1);
    HttpServer::new(move || {
        App::new()
            .wrap(NormalizePath::trim())
            .wrap(Logger::default())
            .app_data(pool.clone())
            .app_data(settings.clone())
            .app_data(mailer.clone())
            .configure(configure_api)
    })
    .bind(bind)?
    .run()
    .await
}

pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::MalformedRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::MalformedRequest(err.to_string()).into()),
    )
    .app_data(web::PathConfig::default().error_handler(|_err, _req| ApiError::NotFound("Object").into()))
    .service(
        web::scope("/api/v1")
            .configure(users::config)
            .configure(catalog::config)
            .configure(titles::config)
            .configure(reviews::config),
    );
}
