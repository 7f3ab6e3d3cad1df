mod http_transport;

pub use http_transport::{into_body_stream, next_chunk, HttpTransport, UpstreamBody};
