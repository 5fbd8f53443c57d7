pub mod domain_rewrite;

pub use domain_rewrite::domain_rewrite_middleware;
pub use imgshift_infra::{
    get_request_id, request_id_middleware, security_headers_middleware, RequestId,
};
