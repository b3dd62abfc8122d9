//! Envoy `ext_authz` gRPC endpoint
//!
//! A thin adapter between the wire protocol and the pipeline: resolve the
//! host, build the per-request context, run the pipeline under the
//! configured deadline, and translate the outcome into a `CheckResponse`.
//! Deny responses carry only the short reason tag, never backend detail.

use std::sync::Arc;
use std::time::Duration;

use envoy_types::ext_authz::v3::pb::{
    Authorization, CheckRequest, CheckResponse, DeniedHttpResponse, HttpResponse, OkHttpResponse,
};
use envoy_types::pb::envoy::config::core::v3::{HeaderValue, HeaderValueOption};
use envoy_types::pb::envoy::r#type::v3::{HttpStatus, StatusCode as HttpStatusCode};
use envoy_types::pb::google::rpc;
use pipeline_core::{pipeline, AuthContext, AuthError, Catalog, CheckInput};
use tokio_util::sync::CancellationToken;
use tonic::{Code, Request, Response, Status};
use tracing::{debug, info};

pub struct AuthService {
    catalog: Catalog,
    request_timeout: Duration,
}

impl AuthService {
    pub fn new(catalog: Catalog, request_timeout: Duration) -> Self {
        Self {
            catalog,
            request_timeout,
        }
    }

    async fn do_check(&self, check: CheckRequest) -> CheckResponse {
        let input = CheckInput::from_check_request(&check);
        let host = input.host().to_string();

        let Some(api) = self.catalog.resolve(&host) else {
            debug!(host, "check for unconfigured host");
            return deny_response(&AuthError::HostNotConfigured(host));
        };

        let cancel = CancellationToken::new();
        let ctx = Arc::new(AuthContext::new(cancel.clone(), input, api.clone()));

        let outcome = tokio::select! {
            outcome = pipeline::evaluate(&ctx) => outcome,
            _ = tokio::time::sleep(self.request_timeout) => {
                cancel.cancel();
                Err(AuthError::Aborted)
            }
        };

        match outcome {
            Ok(()) => {
                info!(
                    api = %api.name,
                    host = %ctx.request().host(),
                    path = %ctx.request().path(),
                    "request allowed"
                );
                allow_response()
            }
            Err(error) => {
                info!(
                    api = %api.name,
                    host = %ctx.request().host(),
                    path = %ctx.request().path(),
                    reason = %error.reason(),
                    "request denied"
                );
                deny_response(&error)
            }
        }
    }
}

#[tonic::async_trait]
impl Authorization for AuthService {
    async fn check(
        &self,
        request: Request<CheckRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        Ok(Response::new(self.do_check(request.into_inner()).await))
    }
}

fn header(key: &str, value: &str) -> HeaderValueOption {
    HeaderValueOption {
        header: Some(HeaderValue {
            key: key.to_string(),
            value: value.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn allow_response() -> CheckResponse {
    CheckResponse {
        status: Some(rpc::Status {
            code: Code::Ok as i32,
            ..Default::default()
        }),
        http_response: Some(HttpResponse::OkResponse(OkHttpResponse {
            headers: vec![header("x-ext-auth-reason", "authorized")],
            ..Default::default()
        })),
        ..Default::default()
    }
}

fn deny_response(error: &AuthError) -> CheckResponse {
    let (code, http_status) = match error {
        AuthError::HostNotConfigured(_) => (Code::NotFound, HttpStatusCode::NotFound),
        AuthError::NoIdentitySource | AuthError::AuthenticationFailed(_) => {
            (Code::Unauthenticated, HttpStatusCode::Unauthorized)
        }
        AuthError::AuthorizationDenied(_) => (Code::PermissionDenied, HttpStatusCode::Forbidden),
        AuthError::Aborted => (Code::Aborted, HttpStatusCode::GatewayTimeout),
    };
    let reason = error.reason();
    CheckResponse {
        status: Some(rpc::Status {
            code: code as i32,
            message: reason.clone(),
            ..Default::default()
        }),
        http_response: Some(HttpResponse::DeniedResponse(DeniedHttpResponse {
            status: Some(HttpStatus {
                code: http_status as i32,
            }),
            headers: vec![header("x-ext-auth-reason", &reason)],
            body: String::new(),
        })),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use pipeline_core::EvalError;

    use super::*;

    fn denied_status(response: &CheckResponse) -> (i32, i32) {
        let grpc = response.status.as_ref().unwrap().code;
        let http = match response.http_response.as_ref().unwrap() {
            HttpResponse::DeniedResponse(denied) => denied.status.as_ref().unwrap().code,
            HttpResponse::OkResponse(_) => panic!("expected a denied response"),
        };
        (grpc, http)
    }

    #[test]
    fn allow_is_ok_with_reason_header() {
        let response = allow_response();
        assert_eq!(response.status.as_ref().unwrap().code, Code::Ok as i32);
        match response.http_response.unwrap() {
            HttpResponse::OkResponse(ok) => {
                assert_eq!(ok.headers[0].header.as_ref().unwrap().key, "x-ext-auth-reason");
            }
            HttpResponse::DeniedResponse(_) => panic!("expected an ok response"),
        }
    }

    #[test]
    fn deny_codes_follow_the_error_kind() {
        let auth = deny_response(&AuthError::AuthenticationFailed(
            EvalError::MalformedCredential,
        ));
        assert_eq!(
            denied_status(&auth),
            (Code::Unauthenticated as i32, HttpStatusCode::Unauthorized as i32)
        );

        let denied = deny_response(&AuthError::AuthorizationDenied(EvalError::Denied(
            "policy".into(),
        )));
        assert_eq!(
            denied_status(&denied),
            (Code::PermissionDenied as i32, HttpStatusCode::Forbidden as i32)
        );

        let missing = deny_response(&AuthError::HostNotConfigured("x".into()));
        assert_eq!(
            denied_status(&missing),
            (Code::NotFound as i32, HttpStatusCode::NotFound as i32)
        );

        let aborted = deny_response(&AuthError::Aborted);
        assert_eq!(
            denied_status(&aborted),
            (Code::Aborted as i32, HttpStatusCode::GatewayTimeout as i32)
        );
    }

    #[test]
    fn deny_reason_is_opaque() {
        let response = deny_response(&AuthError::AuthenticationFailed(EvalError::Upstream(
            "https://keycloak.internal refused".into(),
        )));
        let message = &response.status.as_ref().unwrap().message;
        assert_eq!(message, "authentication_failed:upstream_error");
    }

    #[tokio::test]
    async fn unconfigured_host_is_denied_not_found() {
        let service = AuthService::new(Catalog::new(), Duration::from_secs(1));
        let response = service.do_check(CheckRequest::default()).await;
        assert_eq!(response.status.as_ref().unwrap().code, Code::NotFound as i32);
    }
}
