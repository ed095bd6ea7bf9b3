use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{error::ApiError, routes::AppState};

pub const API_KEY_HEADER: &str = "x-api-key";

/// 校验共享密钥，失败时请求不会进入处理器
pub async fn api_key_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let matched = req
        .headers()
        .get(API_KEY_HEADER)
        .filter(|key| !key.is_empty())
        .map(|key| keys_match(key.as_bytes(), state.api_key.as_bytes()));

    match matched {
        Some(true) => Ok(next.run(req).await),
        Some(false) => {
            warn!(path = %req.uri().path(), "API密钥无效");
            Err(ApiError::InvalidApiKey)
        }
        None => {
            warn!(path = %req.uri().path(), "请求缺少API密钥");
            Err(ApiError::MissingApiKey)
        }
    }
}

/// 逐字节比较，耗时与首个不同字节的位置无关
fn keys_match(provided: &[u8], expected: &[u8]) -> bool {
    provided.len() == expected.len()
        && provided
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

#[cfg(test)]
mod tests {
    use super::keys_match;

    #[test]
    fn test_keys_match() {
        assert!(keys_match(b"secret", b"secret"));
        assert!(!keys_match(b"secret", b"secreT"));
        assert!(!keys_match(b"secret", b"secret-longer"));
        assert!(!keys_match(b"", b"secret"));
    }
}
