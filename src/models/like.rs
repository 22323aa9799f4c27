use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Longest fingerprint kept after sanitizing.
const FINGERPRINT_MAX_LEN: usize = 50;

/// Who is liking a post.
///
/// Anonymous visitors are told apart by a client-derived fingerprint. It only
/// reduces duplicate likes and is never treated as authentication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LikeIdentity {
    User(i64),
    Fingerprint(String),
}

impl LikeIdentity {
    /// Signed-in users are identified by id; everyone else needs a usable fingerprint.
    pub fn resolve(user_id: Option<i64>, fingerprint: Option<&str>) -> Result<Self, AppError> {
        if let Some(id) = user_id {
            return Ok(LikeIdentity::User(id));
        }

        let cleaned = fingerprint.map(sanitize_fingerprint).unwrap_or_default();
        if cleaned.is_empty() {
            return Err(AppError::BadRequest(
                "A fingerprint is required for anonymous likes".to_string(),
            ));
        }
        Ok(LikeIdentity::Fingerprint(cleaned))
    }
}

/// Keeps ASCII alphanumerics only and truncates to the stored length.
pub fn sanitize_fingerprint(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .take(FINGERPRINT_MAX_LEN)
        .collect()
}

/// Result of a like attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Added { likes: i64 },
    AlreadyLiked { likes: i64 },
}

/// Optional body of a like request. Ignored for signed-in users.
#[derive(Debug, Default, Deserialize)]
pub struct LikeRequest {
    pub fingerprint: Option<String>,
}

/// Query of a like status request.
#[derive(Debug, Deserialize)]
pub struct LikeStatusParams {
    pub fingerprint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub liked: bool,
    pub likes: i64,
}
