/// Prefix carried by every wrapper function this crate synthesizes.
pub const WRAPPER_PREFIX: &str = "interceptor_";

/// Name of the interceptor parameter added to root registration functions.
pub const INTERCEPTOR_PARAM: &str = "interceptor";

/// Name of the root registration function parameter that holds the service
/// implementation.
pub const SERVER_PARAM: &str = "server";

/// `Register<Service>HandlerServer`
pub fn root_function_name(service: &str) -> String {
    format!("Register{service}HandlerServer")
}

/// `local_request_<Service>_<Method>_0`
pub fn method_call_name(service: &str, method: &str) -> String {
    format!("local_request_{service}_{method}_0")
}

/// `interceptor_<originalCallName>`
pub fn wrapper_name(call_name: &str) -> String {
    format!("{WRAPPER_PREFIX}{call_name}")
}

/// Inverse of [`wrapper_name`]: the original call name a wrapper stands in for.
pub fn wrapped_call_name(wrapper: &str) -> Option<&str> {
    wrapper.strip_prefix(WRAPPER_PREFIX)
}
