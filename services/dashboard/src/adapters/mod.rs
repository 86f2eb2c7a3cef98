pub mod rest_api;

pub use rest_api::RestApi;
