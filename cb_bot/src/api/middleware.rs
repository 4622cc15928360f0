//! Admin token middleware.
//!
//! Requests carry the token in `Authorization: Bearer <token>`. Only the hex
//! SHA-256 digest of the token is configured; the digest of the presented
//! token is compared to it in constant time.

use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use chat_blackjack::db::GameStore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::AppState;
use crate::logging;

/// Hex SHA-256 digest of a token
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn token_matches(token: &str, expected_digest: &str) -> bool {
    token_digest(token)
        .as_bytes()
        .ct_eq(expected_digest.as_bytes())
        .into()
}

/// Rejects requests without a valid admin token.
///
/// # Behavior
///
/// - **No digest configured**: Returns `401 Unauthorized`
/// - **Missing header or wrong format**: Returns `401 Unauthorized`
/// - **Wrong token**: Returns `401 Unauthorized`
pub async fn admin_auth<S: GameStore>(
    State(state): State<AppState<S>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let path = request.uri().path().to_string();

    let Some(expected) = state.admin_token_sha256.as_deref() else {
        logging::log_admin_rejected(&path, "admin API disabled");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if token_matches(token, expected) => Ok(next.run(request).await),
        Some(_) => {
            logging::log_admin_rejected(&path, "wrong token");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            logging::log_admin_rejected(&path, "missing token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_digest_is_lowercase_hex() {
        // sha256("abc")
        assert_eq!(
            token_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_token_matches() {
        let digest = token_digest("secret");
        assert!(token_matches("secret", &digest));
        assert!(!token_matches("Secret", &digest));
        assert!(!token_matches("secret", &digest[..32]));
    }
}
