use std::sync::Arc;
use std::time::Instant;

use crate::changefeed::ChangeEventDispatcher;
use crate::config::Settings;
use crate::search::SearchService;
use crate::store::ContentStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn ContentStore>,
    pub search: Arc<SearchService>,
    pub dispatcher: Arc<ChangeEventDispatcher>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        store: Arc<dyn ContentStore>,
        dispatcher: Arc<ChangeEventDispatcher>,
    ) -> Self {
        let search = Arc::new(SearchService::new(store.clone(), &settings.search));

        Self {
            settings: Arc::new(settings),
            store,
            search,
            dispatcher,
            start_time: Instant::now(),
        }
    }
}
