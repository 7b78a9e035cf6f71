use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use tracing::{instrument, warn};

use super::{
    dto::{GoodDetails, GoodView, UpdateGoodRequest},
    photos::photo_extension,
    services::NewGood,
};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/goods", get(list_goods))
        .route("/goods/mine", get(my_goods))
        .route("/goods/:id", get(get_good))
        .route("/goods/:id/photo", get(get_photo))
}

pub fn write_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/goods", post(create_good))
        .route("/goods/:id", put(update_good).delete(delete_good))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

#[instrument(skip(state))]
pub async fn list_goods(State(state): State<AppState>) -> AppResult<Json<Vec<GoodView>>> {
    let goods = state.goods.list_all().await?;
    Ok(Json(goods.into_iter().map(GoodView::from).collect()))
}

#[instrument(skip(state))]
pub async fn my_goods(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<GoodView>>> {
    let goods = state.goods.list_by_owner(user_id).await?;
    Ok(Json(goods.into_iter().map(GoodView::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_good(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<GoodDetails>> {
    let good = state.goods.get_details(id).await?;
    Ok(Json(good.into()))
}

#[instrument(skip(state))]
pub async fn get_photo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let (body, content_type) = state.goods.photo(id).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], body))
}

/// POST /goods (multipart)
/// Fields: `name`, `price`, `photo` (file).
#[instrument(skip(state, mp))]
pub async fn create_good(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> AppResult<(StatusCode, HeaderMap, Json<GoodView>)> {
    let mut name: Option<String> = None;
    let mut price: Option<String> = None;
    let mut photo: Option<(Bytes, String, String)> = None;
    let max_mb = state.config.max_upload_mb;
    let bad_multipart = move |e: MultipartError| multipart_error(e, max_mb);

    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("name") => name = Some(field.text().await.map_err(bad_multipart)?),
            Some("price") => price = Some(field.text().await.map_err(bad_multipart)?),
            Some("photo") => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let ext = photo_extension(field.file_name(), &content_type);
                let data = field.bytes().await.map_err(bad_multipart)?;
                photo = Some((data, ext, content_type));
            }
            other => warn!(field = ?other, "ignoring unknown multipart field"),
        }
    }

    let name = name.ok_or_else(|| AppError::validation("name is required"))?;
    let price = parse_price(price.as_deref())?;
    let (photo, extension, content_type) =
        photo.ok_or_else(|| AppError::validation("photo is required"))?;

    let good = state
        .goods
        .create(
            user_id,
            NewGood {
                name,
                price,
                photo,
                extension,
                content_type,
            },
        )
        .await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/v1/goods/{}", good.id)) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(good.into())))
}

#[instrument(skip(state, body))]
pub async fn update_good(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateGoodRequest>,
) -> AppResult<Json<GoodView>> {
    let good = state
        .goods
        .update(id, user_id, &body.name, body.price)
        .await?;
    Ok(Json(good.into()))
}

#[instrument(skip(state))]
pub async fn delete_good(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.goods.delete(id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_price(raw: Option<&str>) -> AppResult<f64> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("price is required"))?;
    raw.parse::<f64>()
        .map_err(|_| AppError::validation("price must be a number"))
}

fn multipart_error(e: MultipartError, max_mb: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(max_mb, "upload over size limit");
        return AppError::PayloadTooLarge(max_mb);
    }
    AppError::validation(e.body_text())
}
