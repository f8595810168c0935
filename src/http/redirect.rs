use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

/// `303 See Other` to the page a successful mutation lands on. The JSON body
/// repeats the target for clients that do not follow redirects.
#[derive(Debug)]
pub struct SeeOther<T> {
    location: String,
    body: T,
}

#[derive(Debug, Serialize)]
pub struct RedirectBody {
    pub redirect_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

impl SeeOther<RedirectBody> {
    pub fn to(location: impl Into<String>, message: Option<&'static str>) -> Self {
        let location = location.into();
        Self {
            body: RedirectBody {
                redirect_to: location.clone(),
                message,
                id: None,
            },
            location,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.body.id = Some(id);
        self
    }
}

impl<T> SeeOther<T> {
    pub fn with_body(location: impl Into<String>, body: T) -> Self {
        Self {
            location: location.into(),
            body,
        }
    }
}

impl<T: Serialize> IntoResponse for SeeOther<T> {
    fn into_response(self) -> Response {
        (
            StatusCode::SEE_OTHER,
            [(header::LOCATION, self.location)],
            Json(self.body),
        )
            .into_response()
    }
}

pub fn post_path(post_id: Uuid) -> String {
    format!("/posts/{}", post_id)
}

pub const POST_LIST_PATH: &str = "/posts";
