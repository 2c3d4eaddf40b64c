// Services module - business logic layer

pub mod anilist;
pub mod anime;
pub mod auth;
pub mod library;
pub mod lists;
pub mod users;
