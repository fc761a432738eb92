use axum::http::HeaderValue;

pub const DEFAULT_SERVER_PORT: u16 = 3000;
pub const DEFAULT_STATIC_DIR: &str = "client/dist";
pub const DEFAULT_MAX_PHOTOS_PER_VISIT: usize = 20;

pub fn server_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_SERVER_PORT)
}

pub fn static_dir() -> String {
    std::env::var("STATIC_DIR")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_STATIC_DIR.to_owned())
}

pub fn max_photos_per_visit() -> usize {
    std::env::var("MAX_PHOTOS_PER_VISIT")
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_PHOTOS_PER_VISIT)
}

/// Origin allowed to call the API cross-site. Unset disables the CORS layer.
pub fn cors_allow_origin() -> Option<HeaderValue> {
    std::env::var("CORS_ALLOW_ORIGIN")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .and_then(|value| HeaderValue::from_str(&value).ok())
}
