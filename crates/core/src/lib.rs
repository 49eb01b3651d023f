pub mod audit;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod fixtures;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use catalog::{CatalogError, InMemoryCatalog, ProductCatalog};
pub use domain::answer::{FinalAnswer, ResolvedAnswer, SpecialDeal};
pub use domain::deal::DealOffer;
pub use domain::product::{AttributeBundle, Product, ProductId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
