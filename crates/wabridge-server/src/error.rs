use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use wabridge_media::MediaError;
use wabridge_proto::transport::TransportError;
use wabridge_store::StoreError;

/// Stable machine-readable error kinds surfaced to HTTP callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidRequest,
    InvalidRecipient,
    SchemaMissing,
    SessionUnavailable,
    NotConnected,
    NotAuthenticated,
    NotFound,
    NoMedia,
    DecryptFailed,
    UploadFailed,
    SendFailed,
    TooLarge,
    VoiceConversionUnavailable,
    Timeout,
    IOFailed,
    LibraryError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::InvalidRecipient => "InvalidRecipient",
            ErrorKind::SchemaMissing => "SchemaMissing",
            ErrorKind::SessionUnavailable => "SessionUnavailable",
            ErrorKind::NotConnected => "NotConnected",
            ErrorKind::NotAuthenticated => "NotAuthenticated",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::NoMedia => "NoMedia",
            ErrorKind::DecryptFailed => "DecryptFailed",
            ErrorKind::UploadFailed => "UploadFailed",
            ErrorKind::SendFailed => "SendFailed",
            ErrorKind::TooLarge => "TooLarge",
            ErrorKind::VoiceConversionUnavailable => "VoiceConversionUnavailable",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::IOFailed => "IOFailed",
            ErrorKind::LibraryError => "LibraryError",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ErrorKind::InvalidRequest | ErrorKind::InvalidRecipient | ErrorKind::TooLarge => {
                StatusCode::BAD_REQUEST
            }
            ErrorKind::NotFound | ErrorKind::NoMedia => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
#[error("{}: {}", kind.as_str(), detail.as_deref().unwrap_or("-"))]
pub struct ApiError {
    pub kind: ErrorKind,
    pub detail: Option<String>,
    // Overrides the kind's default status (extractor rejections keep theirs).
    status: Option<StatusCode>,
}

impl ApiError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            detail: None,
            status: None,
        }
    }

    pub fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
            status: None,
        }
    }

    fn with_status(kind: ErrorKind, status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
            status: Some(status),
        }
    }
}

/// `axum::Json` with rejections rendered in the documented error envelope.
///
/// A non-JSON content type still answers 415 and malformed bodies still
/// answer their usual status, but the body is always
/// `{success:false, error, detail}` instead of axum's plain-text rejection.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::with_status(
                ErrorKind::InvalidRequest,
                rejection.status(),
                rejection.body_text(),
            )),
        }
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        let kind = match &err {
            TransportError::NotConnected => ErrorKind::NotConnected,
            TransportError::NotAuthenticated => ErrorKind::NotAuthenticated,
            TransportError::Timeout => ErrorKind::Timeout,
            TransportError::Decrypt(_) => ErrorKind::DecryptFailed,
            TransportError::Upload(_) => ErrorKind::UploadFailed,
            TransportError::Send(_) => ErrorKind::SendFailed,
            TransportError::Protocol(_) => ErrorKind::LibraryError,
        };
        Self::with_detail(kind, err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let kind = match &err {
            StoreError::NotFound => ErrorKind::NotFound,
            StoreError::NoMedia => ErrorKind::NoMedia,
            StoreError::SchemaMissing(_) => ErrorKind::SchemaMissing,
            StoreError::Io(_) => ErrorKind::IOFailed,
            _ => ErrorKind::LibraryError,
        };
        Self::with_detail(kind, err.to_string())
    }
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        let kind = match &err {
            MediaError::VoiceConversionUnavailable => ErrorKind::VoiceConversionUnavailable,
            MediaError::Timeout => ErrorKind::Timeout,
            MediaError::TooLarge { .. } => ErrorKind::TooLarge,
            MediaError::Io(_) => ErrorKind::IOFailed,
            MediaError::Ffmpeg(_) | MediaError::InvalidAudio(_) => {
                ErrorKind::VoiceConversionUnavailable
            }
        };
        Self::with_detail(kind, err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status.unwrap_or_else(|| self.kind.status());
        let body = ErrorBody {
            success: false,
            error: self.kind.as_str(),
            detail: self.detail,
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_have_stable_strings() {
        assert_eq!(ErrorKind::IOFailed.as_str(), "IOFailed");
        assert_eq!(
            ErrorKind::VoiceConversionUnavailable.as_str(),
            "VoiceConversionUnavailable"
        );
    }

    #[test]
    fn transport_errors_map_to_kinds() {
        let err: ApiError = TransportError::Timeout.into();
        assert_eq!(err.kind, ErrorKind::Timeout);

        let err: ApiError = TransportError::Decrypt("bad mac".into()).into();
        assert_eq!(err.kind, ErrorKind::DecryptFailed);
    }

    #[test]
    fn status_override_survives_into_response() {
        let err = ApiError::with_status(
            ErrorKind::InvalidRequest,
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "expected application/json",
        );
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn store_errors_map_to_kinds() {
        let err: ApiError = StoreError::NotFound.into();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.kind.status(), StatusCode::NOT_FOUND);

        let err: ApiError = StoreError::NoMedia.into();
        assert_eq!(err.kind, ErrorKind::NoMedia);
    }
}
