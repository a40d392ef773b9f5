// src/api/http/mod.rs

pub mod health;
pub mod ingress;

pub use health::healthz;
pub use ingress::create_ingress_router;
