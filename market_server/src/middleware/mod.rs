mod hmac;

pub use hmac::SignatureMiddlewareFactory;
