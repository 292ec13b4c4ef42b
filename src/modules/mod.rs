//! Built-in server modules.
//!
//! # Responsibilities
//! - Define the module contract ([`ServerModule`] and its hooks)
//! - Provide the modules shipped with the server
//!
//! # Built-ins
//! | Module    | Mount     | HTTP                      | Upgrade                 |
//! |-----------|-----------|---------------------------|-------------------------|
//! | `api`     | `/api`    | reverse proxy             | backend socket relay    |
//! | `client`  | `/`       | static files, SPA fallback | none                   |
//! | `config`  | `/config` | client configuration JSON | none                    |
//! | `log`     | `/log`    | 426                       | browser log collector   |
//! | `mockapi` | `/api`    | `GET /test` marker        | owns every upgrade      |

pub mod api;
pub mod client;
pub mod contract;
pub mod log;
pub mod mockapi;
pub mod ui_config;

use std::sync::Arc;

pub use contract::{
    BoundUpgrade, ModuleDescriptor, ModuleError, MountContext, PreUpgrade, ServerModule,
    UpgradeOwner, UpgradeRole, WsHandler,
};

/// Every module the server knows about, in registration order.
pub fn builtin() -> Vec<Arc<dyn ServerModule>> {
    vec![
        Arc::new(api::ApiModule),
        Arc::new(client::ClientModule),
        Arc::new(ui_config::ConfigModule),
        Arc::new(log::LogModule),
        Arc::new(mockapi::MockApiModule),
    ]
}
