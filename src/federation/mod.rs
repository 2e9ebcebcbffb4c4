//! Federation
//!
//! Everything that speaks to other nodes: identifiers, HTTP signatures,
//! remote key resolution, the inbound ingest pipeline and outbound delivery.

pub mod delivery;
pub mod ident;
pub mod ingest;
pub mod key_resolver;
pub mod signature;

pub use delivery::ActivityDelivery;
pub use ident::IdentifierProvider;
pub use ingest::{ActivityIngest, InboundRequest};
pub use signature::{generate_digest, sign_request, verify_signature};
