mod error;
mod request;
mod server;
mod streaming;
mod upstream;

pub use error::ProxyError;
pub use request::{GenerationRequest, GenerationResponse, ModelStatus, ModelTag, TagsResponse};
pub use server::{AppState, REQUEST_ID_HEADER, RelayServer, RequestId, create_router, relay_generation};
pub use streaming::{OutcomeHandle, RelayEnd, RelayOutcome, RelayResult, RelayStream, StreamRelay};
pub use upstream::{HOP_BY_HOP_HEADERS, UpstreamClient, filter_hop_by_hop};
