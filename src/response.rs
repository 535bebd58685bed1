use std::collections::BTreeMap;

use actix_web::{error::JsonPayloadError, HttpRequest, HttpResponse, ResponseError};
use serde::Serialize;

use crate::error::AppError;

#[derive(Serialize)]
pub struct ResponseDto<T: Serialize> {
    pub data: Option<T>,
    pub code: i32,
    pub msg: String,
    /// Field-level messages for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

impl<T: Serialize> ResponseDto<T> {
    pub fn success(data: Option<T>) -> Self {
        Self {
            data,
            code: 0,
            msg: "".to_string(),
            errors: None,
        }
    }
}

/// A page of rows plus the totals the client needs for paging links.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDto<T: Serialize> {
    pub total: u64,
    pub total_page: u64,
    pub page: u64,
    pub list: Vec<T>,
}

impl<T: Serialize> PageDto<T> {
    pub fn new(list: Vec<T>, total: u64, page: u64, size: u64) -> Self {
        let size = size.max(1);
        let total_page = if total % size == 0 { total / size } else { total / size + 1 };
        Self { total, total_page, page, list }
    }
}

pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(ResponseDto::success(Some(data)))
}

pub fn ok_empty() -> HttpResponse {
    HttpResponse::Ok().json(ResponseDto::<()>::success(None))
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let app_err = match err {
        JsonPayloadError::ContentType => AppError::param_error("body", "content type must be application/json"),
        JsonPayloadError::Deserialize(e) => AppError::param_error("body", e.to_string()),
        _ => AppError::param_error("body", "invalid request body"),
    };
    app_err.into()
}

pub fn response_from_error(err: &AppError) -> HttpResponse {
    let errors = err.field().map(|field| {
        let mut map = BTreeMap::new();
        map.insert(field.to_string(), err.msg());
        map
    });
    HttpResponse::build(err.status_code()).json(ResponseDto::<()> {
        data: None,
        code: err.code(),
        msg: err.msg(),
        errors,
    })
}
