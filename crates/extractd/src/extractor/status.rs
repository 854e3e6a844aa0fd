//! Request-level status codes returned by the extractor.

pub const OK: u16 = 200;

/// The origin reported no change and the cached copy answered the request.
pub const NOT_MODIFIED: u16 = 304;

/// The client went away while the body was streaming. Never cached.
pub const CLIENT_GONE: u16 = 499;
