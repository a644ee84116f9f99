mod pipeline;

use std::sync::Arc;

use async_graphql::{EmptySubscription, MergedObject, Object, Schema, SimpleObject};
use platform_api::ApiResult;
use products_crm::PipelineRepository;
use serde::Serialize;
use tracing::instrument;

pub use pipeline::{PipelineMutation, PipelineQuery};

pub type SchemaType = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Request-independent data shared by every resolver.
#[derive(Clone)]
pub struct GraphqlData {
    pub repo: Arc<dyn PipelineRepository>,
}

pub fn build_schema(repo: Arc<dyn PipelineRepository>) -> SchemaType {
    Schema::build(QueryRoot::default(), MutationRoot::default(), EmptySubscription)
        .data(GraphqlData { repo })
        .finish()
}

#[derive(MergedObject, Default)]
pub struct QueryRoot(BaseQuery, PipelineQuery);

#[derive(MergedObject, Default)]
pub struct MutationRoot(PipelineMutation);

#[derive(Default)]
pub struct BaseQuery;

#[Object]
impl BaseQuery {
    #[instrument(name = "graphql.health", skip_all)]
    async fn health(&self) -> ApiResult<HealthPayload> {
        Ok(HealthPayload { ok: true })
    }

    #[instrument(name = "graphql.version", skip_all)]
    async fn version(&self) -> ApiResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }
}

#[derive(Clone, Debug, SimpleObject, Serialize)]
pub struct HealthPayload {
    pub ok: bool,
}
