//! A central place to register App routes.
use actix_service::ServiceFactory;
use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    guard, web, App, Error,
};

use super::endpoint::{docs, endpoint};
use super::state::AppState;

/// Register the documentation route and the catch-all endpoint handler.
///
/// `/docs` only answers `GET`. Other methods on `/docs` fall through to the
/// configured endpoints like any other path.
#[must_use]
pub fn register_app<
    U: MessageBody,
    V: ServiceFactory<
        ServiceRequest,
        Response = ServiceResponse<U>,
        Config = (),
        InitError = (),
        Error = Error,
    >,
>(
    app: App<V>,
    state: &AppState,
) -> App<V> {
    app.app_data(web::Data::new(state.clone()))
        .service(web::resource("/docs").guard(guard::Get()).to(docs))
        .default_service(web::to(endpoint))
}
