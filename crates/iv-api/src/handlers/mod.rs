pub mod admin;
pub mod applications;
pub mod candidate;
pub mod health;
pub mod media;
pub mod pagination;
pub mod settings;
