pub mod auth;
pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod grpc;
pub mod logging;
pub mod models;
pub mod registry;
pub mod repos;
pub mod services;
pub mod state;

// gRPC types generated from proto/messenger.proto
pub mod pb {
    tonic::include_proto!("messenger");
}
