/// Generated gRPC protocol definitions for the product service.
///
/// This crate provides the protocol buffer messages and the client stub
/// used by other services to reach `pb.product_service.ProductService`.
pub mod pb {
    pub mod product_service {
        tonic::include_proto!("pb.product_service");
    }
}

// Re-export commonly used types for convenience
pub use pb::product_service::*;
