use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::dtos::ErrorResponse;

/// JSON extractor that runs `validator` checks before the handler sees
/// the payload.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            let err = ErrorResponse {
                error: format!("Json parse error: {}", e),
                details: None,
            };
            (StatusCode::BAD_REQUEST, Json(err)).into_response()
        })?;

        value.validate().map_err(|e| {
            let details: Vec<String> = e
                .field_errors()
                .into_iter()
                .flat_map(|(field, errors)| {
                    errors.iter().map(move |err| match &err.message {
                        Some(msg) => format!("{}: {}", field, msg),
                        None => format!("{}: invalid value", field),
                    })
                })
                .collect();
            let err = ErrorResponse {
                error: "Validation failed".to_string(),
                details: Some(details),
            };
            (StatusCode::UNPROCESSABLE_ENTITY, Json(err)).into_response()
        })?;

        Ok(ValidatedJson(value))
    }
}
