//! Shape and length checks on the inbound JSON payload.

use serde_json::Value;

use crate::prompt::PromptOptions;
use crate::util::utf16_len;

/// Upper bound on post length, in UTF-16 code units.
pub const MAX_POST_LENGTH: usize = 100_000;
/// Lower bound on post length, in UTF-16 code units.
pub const MIN_POST_LENGTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid request body")]
    InvalidBody,
    #[error("Post content is required and must be a string")]
    MissingPost,
    #[error("Post content must not exceed 100000 characters")]
    TooLong,
    #[error("Post content is too short")]
    TooShort,
}

/// A payload that passed validation. Borrows the raw post from the parsed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest<'a> {
    pub post: &'a str,
    pub options: PromptOptions,
}

/// Run the checks in order and stop at the first failure.
pub fn validate_request(body: &Value) -> Result<ValidatedRequest<'_>, ValidationError> {
    // Arrays count as structured objects here; they fail on the missing field.
    if !(body.is_object() || body.is_array()) {
        return Err(ValidationError::InvalidBody);
    }
    let post = body
        .get("post")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .ok_or(ValidationError::MissingPost)?;

    let len = utf16_len(post);
    if len > MAX_POST_LENGTH {
        return Err(ValidationError::TooLong);
    }
    if len < MIN_POST_LENGTH {
        return Err(ValidationError::TooShort);
    }

    let humanized = body
        .get("isHumanized")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(ValidatedRequest {
        post,
        options: PromptOptions { humanized },
    })
}

/// Re-check the minimum length once the post has been sanitized.
pub fn ensure_min_length(sanitized: &str) -> Result<(), ValidationError> {
    if utf16_len(sanitized) < MIN_POST_LENGTH {
        return Err(ValidationError::TooShort);
    }
    Ok(())
}
