pub mod config;
pub mod event;
pub mod loadbalancer;
pub mod network;
pub mod service;

/// Join a fully-qualified name into its `a:b:c` string form.
pub fn fq_name_string(fq_name: &[String]) -> String {
    fq_name.join(":")
}
