use crate::error::Error;
use crate::model::ContentType;
use crate::service;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

type Db = web::Data<sled::Db>;

pub const USER_HEADER: &str = "x-user-id";

/// Identity assumed for requests that don't name a user.
#[derive(Debug, Clone)]
pub struct DefaultUser(pub String);

fn user_id(req: &HttpRequest, default_user: &DefaultUser) -> String {
    req.headers()
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| default_user.0.clone())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddItemParams {
    content_id: Option<String>,
    content_type: Option<String>,
}

async fn add_item(
    req: HttpRequest,
    params: web::Json<AddItemParams>,
    db: Db,
    default_user: web::Data<DefaultUser>,
) -> Result<HttpResponse, Error> {
    let (content_id, content_type) = match (&params.content_id, &params.content_type) {
        (Some(id), Some(ty)) if !id.is_empty() && !ty.is_empty() => (id, ty),
        _ => {
            return Err(Error::BadRequest(
                "contentId and contentType are required".to_owned(),
            ))
        }
    };
    let content_type = content_type
        .parse::<ContentType>()
        .map_err(Error::BadRequest)?;
    let record = service::add_item(
        db.get_ref(),
        &user_id(&req, &default_user),
        content_id,
        content_type,
    )?;
    Ok(HttpResponse::Created().json(record))
}

async fn remove_item(
    req: HttpRequest,
    content_id: web::Path<String>,
    db: Db,
    default_user: web::Data<DefaultUser>,
) -> Result<HttpResponse, Error> {
    service::remove_item(db.get_ref(), &user_id(&req, &default_user), &content_id)?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Deserialize)]
struct ListParams {
    page: Option<String>,
    #[serde(rename = "pageSize")]
    page_size: Option<String>,
}

fn parse_number(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

async fn list_items(
    req: HttpRequest,
    params: web::Query<ListParams>,
    db: Db,
    default_user: web::Data<DefaultUser>,
) -> Result<HttpResponse, Error> {
    let page = service::list_items(
        db.get_ref(),
        &user_id(&req, &default_user),
        parse_number(params.page.as_deref()),
        parse_number(params.page_size.as_deref()),
    )?;
    Ok(HttpResponse::Ok().json(page))
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| Error::BadRequest(err.to_string()).into()),
    )
    .route("/health", web::get().to(health))
    .route("/items", web::get().to(list_items))
    .route("/items", web::post().to(add_item))
    .route("/items/{content_id}", web::delete().to(remove_item));
}
