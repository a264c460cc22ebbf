mod hmac;

pub use hmac::{HmacMiddlewareFactory, HmacMiddlewareService, SIGNATURE_HEADER};
