pub mod events;
pub mod routes;
