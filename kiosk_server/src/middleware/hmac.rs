//! Signature checks for payment gateway callbacks.
//!
//! The payment gateway signs every callback with the shared `KIOSK_WEBHOOK_SECRET`, using the raw request body as the
//! data to sign. The base64-encoded HMAC-SHA256 is sent in the `X-Kiosk-Signature` header.
//!
//! Wrap the webhook resource with [`HmacMiddlewareFactory`] so that unsigned or tampered callbacks never reach the
//! handler.
use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    web::Bytes,
    Error,
};
use futures::future::LocalBoxFuture;
use kiosk_common::Secret;
use log::*;

use crate::{
    errors::{AuthError, ServerError},
    helpers::verify_hmac,
};

pub const SIGNATURE_HEADER: &str = "X-Kiosk-Signature";

#[derive(Clone)]
struct SignatureCheck {
    header: String,
    key: Secret<String>,
}

impl SignatureCheck {
    /// Reads the whole body and checks it against the signature header. The body is put back so the handler can
    /// still read it.
    async fn verify(&self, req: &mut ServiceRequest) -> Result<(), ServerError> {
        if self.key.reveal().is_empty() {
            warn!("🔐️ No webhook secret is configured, so no signature can be trusted. Denying access.");
            return Err(AuthError::InvalidSignature.into());
        }
        let body = req.extract::<Bytes>().await.map_err(|e| {
            warn!("🔐️ Could not read the body of a signed request. {e}");
            ServerError::InvalidRequestBody("The request body could not be read".into())
        })?;
        let signature = req.headers().get(&self.header).and_then(|v| v.to_str().ok()).ok_or_else(|| {
            warn!("🔐️ No {} header in the request. Denying access.", self.header);
            AuthError::InvalidSignature
        })?;
        if !verify_hmac(self.key.reveal(), &body, signature) {
            warn!("🔐️ The request signature does not match its body. Denying access.");
            return Err(AuthError::InvalidSignature.into());
        }
        trace!("🔐️ Signature check passed ✅️");
        req.set_payload(into_payload(body));
        Ok(())
    }
}

/// Checks the request signature before passing the request on. When `enabled` is false every request is passed
/// through unchecked, which is only meant for local testing against a gateway sandbox.
pub struct HmacMiddlewareFactory {
    check: Option<SignatureCheck>,
}

impl HmacMiddlewareFactory {
    pub fn new(header: &str, key: Secret<String>, enabled: bool) -> Self {
        let check = enabled.then(|| SignatureCheck { header: header.to_string(), key });
        Self { check }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        match &self.check {
            None => warn!("🔐️ Webhook signature checks are DISABLED"),
            Some(check) if check.key.reveal().is_empty() => {
                error!("🔐️ The webhook secret is empty. Every payment gateway callback will be rejected.")
            },
            Some(_) => {},
        }
        ready(Ok(HmacMiddlewareService { check: self.check.clone().map(Rc::new), service: Rc::new(service) }))
    }
}

pub struct HmacMiddlewareService<S> {
    check: Option<Rc<SignatureCheck>>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let Some(check) = self.check.clone() else {
            return Box::pin(self.service.call(req));
        };
        let service = Rc::clone(&self.service);
        Box::pin(async move {
            check.verify(&mut req).await?;
            service.call(req).await
        })
    }
}

fn into_payload(body: Bytes) -> Payload {
    let (_, mut payload) = h1::Payload::create(true);
    payload.unread_data(body);
    Payload::from(payload)
}
