//! `AppState`: the composition root every axum handler reads from.

use std::sync::Arc;

use computor_auth::principal::{PrincipalBuilder, PrincipalCache};
use computor_auth::session::SessionStore;
use computor_cache::ViewCache;
use computor_core::ComputorConfig;
use computor_deployment::DeploymentEngine;
use computor_messages::MessageService;
use computor_permissions::handlers::{
    ApiTokenHandler, CourseMemberHandler, CourseScopedHandler, ExampleHandler, MessageHandler, ResultHandler,
    StudentProfileHandler, COURSE_CONTENT_THRESHOLDS, COURSE_LEVEL_THRESHOLDS, COURSE_MEMBER_THRESHOLDS,
};
use computor_permissions::{HandlerRegistry, ResourceKind};
use computor_realtime::RealtimeHub;
use computor_submissions::{GradingService, SubmissionService};
use computor_testing::TestScheduler;

use crate::blob::MinioBlobStore;
use crate::db::PgRepositories;
use crate::executor::HttpTaskExecutor;
use crate::realtime::{spawn_redis_bridge, AxumConnectionSender, BridgeSender, PermissionChannelAuthorizer, RedisPresence};

pub type Hub = RealtimeHub<PermissionChannelAuthorizer, AxumConnectionSender, RedisPresence>;

#[derive(Clone)]
pub struct AppState {
    pub repositories: PgRepositories,
    pub sessions: Arc<SessionStore<PgRepositories>>,
    pub principals: Arc<PrincipalBuilder<PgRepositories>>,
    pub principal_cache: Arc<PrincipalCache>,
    pub permissions: Arc<HandlerRegistry>,
    pub view_cache: Arc<ViewCache<serde_json::Value>>,
    pub submissions: Arc<SubmissionService<PgRepositories, MinioBlobStore>>,
    pub grading: Arc<GradingService<PgRepositories>>,
    pub deployments: Arc<DeploymentEngine<PgRepositories>>,
    pub tests: Arc<TestScheduler<PgRepositories, HttpTaskExecutor>>,
    pub messages: Arc<MessageService<PgRepositories>>,
    pub realtime: Arc<Hub>,
    pub connection_sender: AxumConnectionSender,
    pub bridge: BridgeSender,
    pub redis: redis::Client,
}

impl AppState {
    pub fn new(config: &ComputorConfig, pool: sqlx::PgPool, redis: redis::Client) -> Self {
        let repositories = PgRepositories::new(pool);

        let sessions = SessionStore::new(
            redis.clone(),
            repositories.clone(),
            chrono::Duration::minutes(15),
            chrono::Duration::days(30),
        );

        let principals = PrincipalBuilder::new(repositories.clone());
        let principal_cache = PrincipalCache::new(config.auth_cache_ttl);

        let permissions = build_handler_registry(repositories.clone());

        let view_cache = Arc::new(ViewCache::new());

        let blob_store = MinioBlobStore::new(config);
        let submissions = SubmissionService::new(repositories.clone(), blob_store, view_cache.clone());

        let grading = GradingService::new(repositories.clone(), view_cache.clone());

        let deployments = DeploymentEngine::new(repositories.clone(), view_cache.clone());

        let executor = HttpTaskExecutor::new(config);
        let tests = TestScheduler::new(repositories.clone(), executor);

        let messages = MessageService::new(repositories.clone());

        let authorizer = PermissionChannelAuthorizer::new(repositories.clone());
        let presence = RedisPresence::new(redis.clone());
        let connection_sender = AxumConnectionSender::new();
        let realtime = Arc::new(RealtimeHub::new(
            config.ws_max_total_connections,
            config.ws_max_connections_per_user,
            config.ws_presence_ttl,
            config.ws_send_timeout,
            authorizer,
            connection_sender.clone(),
            presence,
        ));

        let (bridge, _bridge_handle) = spawn_redis_bridge(redis.clone(), realtime.clone());

        Self {
            repositories,
            sessions: Arc::new(sessions),
            principals: Arc::new(principals),
            principal_cache: Arc::new(principal_cache),
            permissions: Arc::new(permissions),
            view_cache,
            submissions: Arc::new(submissions),
            grading: Arc::new(grading),
            deployments: Arc::new(deployments),
            tests: Arc::new(tests),
            messages: Arc::new(messages),
            realtime,
            connection_sender,
            bridge,
            redis,
        }
    }
}

/// Wires every resource kind's handler against the Postgres-backed
/// [`ResourceResolver`](computor_permissions::handlers::ResourceResolver)
/// impl.
fn build_handler_registry(repositories: PgRepositories) -> HandlerRegistry {
    let resolver = Arc::new(repositories);
    let mut registry = HandlerRegistry::new();

    registry.register(Box::new(CourseScopedHandler::new(
        ResourceKind::Course,
        COURSE_LEVEL_THRESHOLDS,
        resolver.clone(),
    )));
    registry.register(Box::new(CourseScopedHandler::new(
        ResourceKind::CourseContent,
        COURSE_CONTENT_THRESHOLDS,
        resolver.clone(),
    )));
    registry.register(Box::new(CourseScopedHandler::new(
        ResourceKind::CourseContentType,
        COURSE_CONTENT_THRESHOLDS,
        resolver.clone(),
    )));
    registry.register(Box::new(CourseMemberHandler::new(
        COURSE_MEMBER_THRESHOLDS,
        resolver.clone(),
    )));
    registry.register(Box::new(ResultHandler::new(resolver.clone())));
    registry.register(Box::new(MessageHandler::new(resolver.clone())));
    registry.register(Box::new(ApiTokenHandler::new(resolver)));
    registry.register(Box::new(StudentProfileHandler));
    registry.register(Box::new(ExampleHandler));

    registry
}
