use actix_web::{middleware::Logger, web, App, HttpServer};
use clap::Parser;
use log::info;
use mylist::api::{self, DefaultUser};
use mylist::config::Settings;
use mylist::{database, seed};
use std::io;

fn to_io<E>(err: E) -> io::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    io::Error::new(io::ErrorKind::Other, err)
}

#[actix_rt::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("mylist=debug,actix_web=info"),
    )
    .init();

    let settings = Settings::parse();
    let db = database::open(settings.db_path.as_deref()).map_err(to_io)?;
    if settings.seed_demo {
        let count = seed::seed_demo_catalog(&db).map_err(to_io)?;
        info!("Seeded {} catalog items", count);
    }

    let db_data = web::Data::new(db.clone());
    let default_user = web::Data::new(DefaultUser(settings.default_user.clone()));
    info!("Listening on {}", settings.bind);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(db_data.clone())
            .app_data(default_user.clone())
            .configure(api::configure)
    })
    .bind(&settings.bind)?
    .run()
    .await?;

    db.flush().map_err(to_io)?;
    Ok(())
}
