//! tasksync - A local-first task list with token-addressed remote backup
//!
//! This library provides the client-side store and sync engine as well as
//! the reconciliation server that merges client snapshots into per-account
//! state. A task list lives locally and is mirrored to a remote account
//! addressed by a short recovery token.
//!
//! # Modules
//!
//! The library is organized into several key modules:
//!
//! * [`store`] - Local task and bucket state with change notification
//! * [`sync`] - Debounced, retrying synchronization client
//! * [`token`] - Recovery token grammar, issuance and expiration
//! * [`transport`] - Client transport abstraction and HTTP implementation
//! * [`server`] - Reconciliation server, rate limiter and retention sweeper
//! * [`config`] - Application configuration management
//! * [`utils`] - Utility functions and helpers

/// Configuration module for managing application settings
pub mod config;

/// Application constants and default values
pub mod constants;

/// SeaORM entity models for server tables
pub mod entities;

/// Logging setup for the binaries
pub mod logger;

/// Records and wire types shared by client and server
pub mod model;

/// Listener registry used for change notification
pub mod notify;

/// Repository layer for database operations
pub mod repositories;

/// HTTP reconciliation server
pub mod server;

/// Key/value persistence shared by every process of a user
pub mod storage;

/// Local state store
pub mod store;

/// Synchronization engine pushing local state to the server
pub mod sync;

/// Recovery tokens and their lifecycle
pub mod token;

/// Transport between the sync client and the server
pub mod transport;

/// Utility functions for date/time handling and other helpers
pub mod utils;

// Re-export the main entry points for convenient access
pub use store::TaskStore;
pub use sync::{SyncClient, SyncState, SyncStatus};
