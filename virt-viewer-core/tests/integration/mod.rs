mod domain_tests;
mod remote_tests;
mod tunnel_tests;
