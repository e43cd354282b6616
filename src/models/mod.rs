//! Data models for the influencer CRM.
//!
//! Plain records mirroring the backend tables, plus their create/update request bodies.

mod brand;
mod campaign;
mod datastore;
mod influencer;
mod user_role;
mod video;

pub use brand::*;
pub use campaign::*;
pub use datastore::*;
pub use influencer::*;
pub use user_role::*;
pub use video::*;
