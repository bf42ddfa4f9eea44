//! Custom extractors that return JSON errors instead of plain text.
//!
//! These wrap Axum's built-in extractors so every rejection renders through
//! `AppError`, plus the bearer-token `AuthUser` extractor.

use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::db::AppState;
use crate::error::AppError;

/// JSON extractor that returns `AppError` on failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let result = axum::Json::<T>::from_request(req, state).await?;
        Ok(Json(result.0))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// Wraps a parts extractor so its rejection renders as `AppError`.
macro_rules! parts_extractor {
    ($(#[$meta:meta])* $name:ident => $inner:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name<T>(pub T);

        impl<S, T> FromRequestParts<S> for $name<T>
        where
            S: Send + Sync,
            T: DeserializeOwned + Send,
        {
            type Rejection = AppError;

            async fn from_request_parts(
                parts: &mut Parts,
                state: &S,
            ) -> Result<Self, Self::Rejection> {
                let extracted = <$inner>::from_request_parts(parts, state).await?;
                Ok($name(extracted.0))
            }
        }
    };
}

parts_extractor!(
    /// `?limit=&offset=` style query strings.
    Query => axum::extract::Query<T>
);
parts_extractor!(
    /// Route parameters such as `{app_id}`.
    Path => axum::extract::Path<T>
);

/// The storefront user behind `Authorization: Bearer <access token>`.
///
/// Missing, malformed, expired or foreign tokens are all `401`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized)?;

        let session = state.sessions.verify(bearer.token())?;
        Ok(AuthUser {
            user_id: session.user_id,
            email: session.email,
        })
    }
}
