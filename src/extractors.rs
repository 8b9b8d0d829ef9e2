use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::db::models::User;
use crate::db::users;
use crate::error::AppError;
use crate::state::AppState;

/// The account behind a valid `Authorization: Bearer` token.
/// Rejects with 401 when the header is missing, the token does not verify,
/// or its subject no longer resolves to a user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;
        let claims = state.tokens.verify(token)?;

        let conn = state.db.get()?;
        let user = users::find_by_email(&conn, &claims.sub)?.ok_or(AppError::Unauthorized)?;
        Ok(CurrentUser(user))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/auth/me");
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_token_parses_scheme_case_insensitively() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("bearer abc"))), Some("abc"));
    }

    #[test]
    fn bearer_token_rejects_other_shapes() {
        assert_eq!(bearer_token(&parts_with(None)), None);
        assert_eq!(bearer_token(&parts_with(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts_with(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts_with(Some("abc"))), None);
    }
}
