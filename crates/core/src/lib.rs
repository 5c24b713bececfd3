//! `gescom-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the aggregate contract, the error taxonomy and money.

pub mod aggregate;
pub mod context;
pub mod error;
pub mod id;
pub mod money;
pub mod numbering;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use context::RequestContext;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, ClientId, TenantId, UserId};
pub use money::{Money, TaxRate};

pub use rust_decimal::Decimal;
