//! Mapping of kube-rs errors into the engine's error taxonomy

use kube::error::ErrorResponse;
use routecheck_common::Error;
use routecheck_engine::ObjectRef;

/// Whether the failed call read or wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// get / list / logs / exec
    Read,
    /// create / patch / delete
    Write,
}

/// Classify a kube error raised while operating on `target`.
///
/// - 404 → `NotFound`
/// - 400, 403, 409, 422 on writes → `Admission`, server message verbatim
/// - 429, 5xx, connection and timeout failures → `Transient`
/// - anything else → `Operation`
pub fn classify(err: kube::Error, access: Access, context: &str, target: &ObjectRef) -> Error {
    match err {
        kube::Error::Api(response) => classify_response(response, access, context, target),
        kube::Error::HyperError(e) => Error::transient(context, e.to_string()),
        kube::Error::Service(e) => Error::transient(context, e.to_string()),
        kube::Error::ReadEvents(e) => Error::transient(context, e.to_string()),
        kube::Error::UpgradeConnection(e) => Error::transient(context, e.to_string()),
        kube::Error::SerdeError(e) => Error::serialization(format!("{context}: {e}")),
        other => Error::operation(context, other.to_string()),
    }
}

fn classify_response(
    response: ErrorResponse,
    access: Access,
    context: &str,
    target: &ObjectRef,
) -> Error {
    match (response.code, access) {
        (404, _) => target.not_found(),
        (400 | 403 | 409 | 422, Access::Write) => {
            Error::admission(&target.kind, &target.name, response.message)
        }
        (429, _) | (500..=599, _) => Error::transient(
            context,
            format!("{} ({}): {}", response.code, response.reason, response.message),
        ),
        (code, _) => Error::operation(
            context,
            format!("{code} ({}): {}", response.reason, response.message),
        ),
    }
}
