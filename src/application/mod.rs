pub mod bootstrap;
pub mod commands;
pub mod notifier;
pub mod reconcile;
pub mod scheduler;
