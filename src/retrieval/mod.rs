pub mod query;
pub mod universe;

pub use query::build_query;
pub use universe::Universe;

#[cfg(test)]
use mockall::automock;

use std::sync::Arc;

use crate::{config::RetrievalConfig, models::Passage};
use async_trait::async_trait;

/// Looks up passages relevant to a query. Failures degrade to an empty
/// result; retrieval never aborts a chat turn.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait Retriever {
    async fn retrieve(&self, query: String, reach: usize) -> Vec<Passage>;
}

pub type ArcRetriever = Arc<dyn Retriever + Send + Sync>;

/// Used when no retrieval service is configured.
pub struct NoRetrieval;

#[async_trait]
impl Retriever for NoRetrieval {
    async fn retrieve(&self, _query: String, _reach: usize) -> Vec<Passage> {
        vec![]
    }
}

pub fn new_retriever(config: &RetrievalConfig) -> ArcRetriever {
    if !config.enabled() {
        log::info!("Retrieval service is not configured, answering without external context");
        return Arc::new(NoRetrieval);
    }
    Arc::new(Universe::from(config))
}
