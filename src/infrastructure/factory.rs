use crate::application::forecasting::model_store::ModelStore;
use crate::config::{Config, DataSource};
use crate::domain::ports::PriceHistoryProvider;
use crate::infrastructure::csv_source::CsvPriceHistoryProvider;
use crate::infrastructure::mock::MockPriceHistoryProvider;
use crate::infrastructure::persistence::FileModelStore;
use crate::infrastructure::yahoo::YahooPriceHistoryProvider;
use std::sync::Arc;
use tracing::info;

pub struct ServiceFactory;

impl ServiceFactory {
    pub fn create_provider(config: &Config) -> Arc<dyn PriceHistoryProvider> {
        let ds = &config.data_source;
        let provider: Arc<dyn PriceHistoryProvider> = match ds.source {
            DataSource::Mock => Arc::new(MockPriceHistoryProvider::synthetic(config.forecast.seed)),
            DataSource::Yahoo => Arc::new(YahooPriceHistoryProvider::new(
                ds.yahoo_chart_url.clone(),
                ds.quote_currency.clone(),
                config.fetch_timeout(),
            )),
            DataSource::Csv => Arc::new(CsvPriceHistoryProvider::new(ds.csv_dir.clone())),
        };
        info!("ServiceFactory: Using {} price history", provider.name());
        provider
    }

    pub fn create_store(config: &Config) -> Arc<dyn ModelStore> {
        info!("ServiceFactory: Model artifacts in {:?}", config.store.model_dir);
        Arc::new(FileModelStore::new(config.store.model_dir.clone()))
    }
}
