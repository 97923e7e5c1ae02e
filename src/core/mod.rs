// Core algorithm exports
pub mod dispatcher;
pub mod filters;

pub use dispatcher::{DispatchError, DispatchOptions, Dispatcher};
pub use filters::{
    matches, matches_criteria, matches_location, matches_property_kind, matches_seller_origin,
};
