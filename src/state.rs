use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    services::{
        comments::CommentService,
        revalidate::{self, Revalidator},
    },
    store::{CallPolicy, Store},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub revalidator: Arc<dyn Revalidator>,
}

impl AppState {
    /// State with the revalidator chosen from `config`.
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let revalidator = revalidate::from_config(&config);
        Self {
            store,
            config,
            revalidator,
        }
    }

    pub fn calls(&self) -> CallPolicy {
        CallPolicy::from_config(&self.config)
    }

    pub fn comments(&self) -> CommentService<'_> {
        CommentService::new(self.store.as_ref(), self.calls(), self.config.max_reply_depth)
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
