use harvest_core::{CoreResult, FulfillmentStore};
use harvest_order::{
    DispatchSettings, DriverAvailabilityTracker, OrderLifecycleManager, PickupScheduler,
};
use harvest_sales::{RevenuePolicy, SalesAggregationEngine};
use harvest_store::Config;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct SalesSettings {
    pub policy: RevenuePolicy,
    pub top_products_limit: usize,
}

impl Default for SalesSettings {
    fn default() -> Self {
        Self {
            policy: RevenuePolicy::default(),
            top_products_limit: 5,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orders: OrderLifecycleManager,
    pub pickups: PickupScheduler,
    pub drivers: DriverAvailabilityTracker,
    pub sales: SalesAggregationEngine,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new<S>(store: Arc<S>, auth: AuthConfig, dispatch: DispatchSettings, sales: SalesSettings) -> Self
    where
        S: FulfillmentStore + 'static,
    {
        let pickups = PickupScheduler::new(store.clone(), dispatch);
        Self {
            orders: OrderLifecycleManager::new(store.clone(), pickups.clone()),
            drivers: DriverAvailabilityTracker::new(store.clone()),
            sales: SalesAggregationEngine::new(store, sales.policy, sales.top_products_limit),
            pickups,
            auth,
        }
    }

    pub fn from_config<S>(store: Arc<S>, config: &Config) -> CoreResult<Self>
    where
        S: FulfillmentStore + 'static,
    {
        let sales = SalesSettings {
            policy: config.sales.revenue_policy.parse()?,
            top_products_limit: config.sales.top_products_limit,
        };
        let dispatch = DispatchSettings {
            default_page_size: config.dispatch.default_page_size,
            max_page_size: config.dispatch.max_page_size,
        };
        let auth = AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        };
        Ok(Self::new(store, auth, dispatch, sales))
    }
}
