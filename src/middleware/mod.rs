pub mod auth;

pub use auth::RequireAdminKey;
