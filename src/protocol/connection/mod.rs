pub mod auth;
mod handshake;
mod ssl_request;

pub use handshake::parse_auth_switch;
pub use handshake::parse_greeting;
pub use handshake::write_handshake_response;
pub use handshake::Greeting;
pub use handshake::HandshakeResponse;
pub use ssl_request::SslRequest;
