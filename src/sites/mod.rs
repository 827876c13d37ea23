//! Vendor directory adapters.

pub mod salesforce;
pub mod shopify;

pub use salesforce::SalesforceDirectory;
pub use shopify::ShopifyDirectory;
