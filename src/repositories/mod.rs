//! Repository layer for database operations.
//!
//! This module provides repository structs that encapsulate database queries
//! and operations, following the Data Mapper pattern recommended by SeaORM.
//! Every method is generic over [`sea_orm::ConnectionTrait`] so it runs the
//! same against a pooled connection or inside a transaction.

pub mod account;
pub mod priority;
pub mod todo;

pub use account::AccountRepository;
pub use priority::PriorityRepository;
pub use todo::TodoRepository;
