use crate::campaign::CampaignEngine;
use crate::config::Config;
use crate::event::{create_event_sender, EventSender};
use crate::gateway::{CallGateway, HttpGateway};
use crate::handler;
use crate::llm::{LlmClient, OpenAiClientBuilder};
use crate::session::SessionManager;
use crate::store::{self, Store};
use crate::sync::SyncService;
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub sessions: Arc<SessionManager>,
    pub campaigns: Arc<CampaignEngine>,
    pub sync: Arc<SyncService>,
    pub event_sender: EventSender,
    pub token: CancellationToken,
}

#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<Config>,
    store: Option<Arc<dyn Store>>,
    gateway: Option<Arc<dyn CallGateway>>,
    llm: Option<Arc<dyn LlmClient>>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn CallGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn build(self) -> Result<AppState> {
        let config = Arc::new(self.config.unwrap_or_default());
        let store = match self.store {
            Some(store) => store,
            None => store::build(&config.store)?,
        };
        let gateway = self
            .gateway
            .unwrap_or_else(|| Arc::new(HttpGateway::new(config.gateway.clone())));
        let llm: Arc<dyn LlmClient> = match self.llm {
            Some(llm) => llm,
            None => {
                let mut builder = OpenAiClientBuilder::from_env();
                if let Some(llm_config) = &config.llm {
                    builder = builder.with_config(llm_config);
                }
                Arc::new(builder.build())
            }
        };

        let event_sender = create_event_sender();
        let token = CancellationToken::new();
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            gateway.clone(),
            llm,
            event_sender.clone(),
        ));
        let campaigns = Arc::new(CampaignEngine::new(
            store.clone(),
            sessions.clone(),
            event_sender.clone(),
            config.campaign.clone(),
            token.clone(),
        ));
        let sync = Arc::new(SyncService::new(
            store.clone(),
            gateway,
            event_sender.clone(),
            config.sync.clone(),
            token.clone(),
        ));

        Ok(Arc::new(AppStateInner {
            config,
            store,
            sessions,
            campaigns,
            sync,
            event_sender,
            token,
        }))
    }
}

/// Bind the HTTP listener and run until the shutdown token fires.
/// Campaigns left running by a previous process are resumed first.
pub async fn serve(state: AppState) -> Result<()> {
    let resumed = state.campaigns.resume_running().await?;
    if resumed > 0 {
        info!(resumed, "resumed running campaigns");
    }

    let router = handler::router()
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&state.config.http_addr).await?;
    info!(addr = state.config.http_addr, "listening");
    let token = state.token.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    Ok(())
}
