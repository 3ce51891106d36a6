//! Retransmission of encoded events to protocol-speaking clients

use async_trait::async_trait;
use std::sync::Arc;

/// Something that can push an encoded CoT document to connected stream
/// clients. The socket listener implements this.
#[async_trait]
pub trait CotOutbound: Send + Sync {
    /// Push one XML document. Returns how many clients it reached.
    async fn push(&self, xml: Arc<str>) -> usize;
}
