use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    http::header::{HeaderMap, HeaderName, HeaderValue},
    http::Method,
    middleware::Next,
    web, Error, HttpResponse,
};
use log::warn;

use crate::config::AppConfig;

/// Answers preflight requests itself and stamps CORS headers on everything else.
pub async fn cors_handler<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error>
where
    B: MessageBody,
{
    let (origin, token_header) = match req.app_data::<web::Data<AppConfig>>() {
        Some(config) => (config.cors_allow_origin.clone(), config.token_header.to_ascii_lowercase()),
        None => ("*".to_string(), "token".to_string()),
    };

    let mut res = if req.method() == Method::OPTIONS {
        let res = HttpResponse::NoContent().finish().map_into_right_body();
        req.into_response(res)
    } else {
        next.call(req).await?.map_into_left_body()
    };

    apply_headers(res.headers_mut(), &origin, &token_header);
    Ok(res)
}

fn apply_headers(headers: &mut HeaderMap, origin: &str, token_header: &str) {
    let origin = HeaderValue::from_str(origin).unwrap_or_else(|_| {
        warn!("invalid CORS_ALLOW_ORIGIN {:?}, falling back to *", origin);
        HeaderValue::from_static("*")
    });
    headers.insert(HeaderName::from_static("access-control-allow-origin"), origin);
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-max-age"),
        HeaderValue::from_static("86400"),
    );
    let allowed = format!("Origin, X-Requested-With, Content-Type, Accept, Authorization, {}", token_header);
    if let Ok(value) = HeaderValue::from_str(&allowed) {
        headers.insert(HeaderName::from_static("access-control-allow-headers"), value);
    }
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );
}
