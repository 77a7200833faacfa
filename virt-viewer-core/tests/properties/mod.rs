mod display_tests;
mod reconnect_tests;
mod session_tests;
mod target_tests;
