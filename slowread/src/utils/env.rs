/// Value used for the `Server` header of the mock stream server.
pub const fn server_identifier() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
}
