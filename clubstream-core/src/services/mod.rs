// File: src/services/mod.rs

pub mod event_router;
pub mod formatter;
pub mod notification_manager;
pub mod subscription_reconciler;
pub mod update_subscriptions;

pub use event_router::{spawn_event_router, EventRouter};
pub use notification_manager::{NotificationManager, NotificationState};
pub use subscription_reconciler::{ReconcileFailure, ReconcileReport, SubscriptionReconciler};
pub use update_subscriptions::UpdateSubscriptions;
